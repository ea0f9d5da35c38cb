//! The task envelope: registration, hand-off and completion of one task.

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use pgas_place::PlaceId;
use smallvec::SmallVec;

use crate::{Error, Finish, FinishToken, Place, Result, TaskFailure};

/// Body of a task. Errors and panics are reported to the governing finish.
pub type TaskBody = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

type Finishes = SmallVec<[Arc<Finish>; 1]>;

thread_local! {
	static CURRENT: RefCell<Option<Activity>> = const { RefCell::new(None) };
}

/// The task or scope body running on this thread.
#[derive(Clone)]
pub(crate) struct Activity {
	pub place: Arc<Place>,
	pub finish: Arc<Finish>,
}

/// Restores the previous activity when dropped.
pub(crate) struct ActivityGuard {
	previous: Option<Activity>,
}

impl ActivityGuard {
	pub fn enter(place: &Arc<Place>, finish: &Arc<Finish>) -> Self {
		let activity = Activity {
			place: Arc::clone(place),
			finish: Arc::clone(finish),
		};
		Self {
			previous: CURRENT.with(|current| current.replace(Some(activity))),
		}
	}
}

impl Drop for ActivityGuard {
	fn drop(&mut self) {
		let previous = self.previous.take();
		CURRENT.with(|current| *current.borrow_mut() = previous);
	}
}

pub(crate) fn current() -> Result<Activity> {
	CURRENT.with(|current| current.borrow().clone()).ok_or(Error::NoActivity)
}

/// Runs `body` as the activity of `finish`, capturing its error or panic.
pub(crate) fn run_body<F>(place: &Arc<Place>, finish: &Arc<Finish>, body: F) -> Option<TaskFailure>
where
	F: FnOnce() -> anyhow::Result<()>,
{
	let outcome = {
		let _guard = ActivityGuard::enter(place, finish);
		catch_unwind(AssertUnwindSafe(body))
	};
	match outcome {
		Ok(Ok(())) => None,
		Ok(Err(err)) => Some(TaskFailure::from_error(&err, place.here())),
		Err(payload) => Some(TaskFailure::from_panic(&*payload, place.here())),
	}
}

/// A task registered with one or more finishes.
///
/// The first finish governs the task and receives its failure; every
/// finish is told when the task completes.
pub struct Task {
	finishes: Finishes,
	body: TaskBody,
	origin: PlaceId,
}

impl Task {
	/// Creates a task governed by `finish`, spawned from `origin`.
	pub fn new(finish: Arc<Finish>, origin: PlaceId, body: TaskBody) -> Self {
		Self {
			finishes: smallvec::smallvec![finish],
			body,
			origin,
		}
	}

	/// Creates a task registered with every finish in `finishes`.
	///
	/// Fails with [`Error::NoFinish`] when `finishes` is empty.
	pub fn with_finishes(finishes: impl IntoIterator<Item = Arc<Finish>>, origin: PlaceId, body: TaskBody) -> Result<Self> {
		let finishes: Finishes = finishes.into_iter().collect();
		if finishes.is_empty() {
			return Err(Error::NoFinish);
		}
		Ok(Self { finishes, body, origin })
	}

	/// Place the task was spawned from.
	pub fn origin(&self) -> PlaceId {
		self.origin
	}

	/// Spawns the task on `place` itself.
	pub fn spawn_here(self, place: &Arc<Place>) {
		let here = place.here();
		for finish in &self.finishes {
			finish.spawn(here);
		}
		self.accept(place);
	}

	/// Spawns the task from `place` to run at `target`.
	///
	/// When the hand-off fails every registration is retracted and the
	/// transport error is returned.
	///
	/// A task whose finish cannot be resolved at `target` is dropped there.
	/// The finishes admitted before the failure are told; the unresolved
	/// scope never releases.
	pub fn spawn_at(self, place: &Arc<Place>, target: PlaceId) -> Result<()> {
		if target == place.here() {
			self.spawn_here(place);
			return Ok(());
		}

		let Task { finishes, body, origin } = self;
		let tokens = finishes
			.iter()
			.map(Finish::prepare_transfer)
			.collect::<std::result::Result<SmallVec<[FinishToken; 1]>, _>>()?;
		for finish in &finishes {
			finish.spawn(target);
		}
		let sent = place.send(
			target,
			Box::new(move |dest: &Arc<Place>| {
				let mut admitted = Finishes::new();
				for token in &tokens {
					match Finish::admit(*token, dest) {
						Ok(finish) => admitted.push(finish),
						Err(err) => {
							tracing::error!(place = %dest.here(), origin = %origin, finish = %token.id(), %err, "task.resolve");
							for finish in &admitted {
								finish.tell();
							}
							return;
						}
					}
				}
				Task {
					finishes: admitted,
					body,
					origin,
				}
				.start(dest);
			}),
		);
		if let Err(err) = sent {
			tracing::warn!(place = %place.here(), target = %target, %err, "task.unsent");
			for finish in &finishes {
				finish.unspawn(target);
			}
			return Err(err.into());
		}
		Ok(())
	}

	fn accept(self, place: &Arc<Place>) {
		let here = place.here();
		// Every finish here has counted the spawn, so none is idle and unbound.
		for finish in &self.finishes {
			finish.submit(here);
		}
		self.start(place);
	}

	fn start(self, place: &Arc<Place>) {
		tracing::trace!(place = %place.here(), origin = %self.origin, "task.accept");
		let runner = Arc::clone(place);
		place.execute(Box::new(move || self.run(&runner)));
	}

	fn run(self, place: &Arc<Place>) {
		let Task { finishes, body, origin } = self;
		if let Some(governing) = finishes.first()
			&& let Some(failure) = run_body(place, governing, body)
		{
			tracing::debug!(place = %place.here(), origin = %origin, %failure, "task.failed");
			governing.add_suppressed(failure);
		}
		for finish in &finishes {
			finish.tell();
		}
	}
}

#[cfg(test)]
mod tests {
	use pgas_place::RegistryValue;

	use super::*;
	use crate::FinishKind;
	use crate::testing::Sim;

	#[test]
	fn unresolvable_finish_drops_task_and_retires_the_others() {
		let sim = Sim::new(2);
		let resolvable = Finish::new(sim.place(0), FinishKind::Default);
		let broken = Finish::new(sim.place(0), FinishKind::Default);
		let id = broken.prepare_transfer().unwrap().id();
		sim.place(1).identities().put_here(id, Arc::new(7u32) as RegistryValue);

		let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let flag = Arc::clone(&ran);
		let body: TaskBody = Box::new(move || {
			flag.store(true, std::sync::atomic::Ordering::SeqCst);
			Ok(())
		});
		Task::with_finishes([Arc::clone(&resolvable), Arc::clone(&broken)], PlaceId(0), body)
			.unwrap()
			.spawn_at(sim.place(0), PlaceId(1))
			.unwrap();
		sim.run_until_quiet();

		assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
		resolvable.tell();
		assert!(resolvable.is_releasable(), "the admitted finish was retired");
		broken.tell();
		assert!(!broken.is_releasable());
	}
}
