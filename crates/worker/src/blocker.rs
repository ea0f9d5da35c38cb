/// A condition a thread may wait on, cooperatively or by parking.
///
/// Both methods must observe the same completion condition: once
/// [`is_releasable`](Self::is_releasable) has returned true, [`block`](Self::block)
/// must return without waiting.
pub trait Blocker {
	/// Parks the calling thread until the condition holds.
	///
	/// Returns whether the condition holds on return.
	fn block(&self) -> bool;

	/// Checks the condition without waiting.
	fn is_releasable(&self) -> bool;
}

/// Waits for `blocker`, polling it `spins` times before parking.
///
/// Short waits complete without a condition-variable round trip; long ones
/// park the thread in [`Blocker::block`].
pub fn managed_block<B>(blocker: &B, spins: usize)
where
	B: Blocker + ?Sized,
{
	for _ in 0..spins {
		if blocker.is_releasable() {
			return;
		}
		std::thread::yield_now();
	}
	tracing::trace!(spins, "worker.managed_block.park");
	while !blocker.block() {}
}
