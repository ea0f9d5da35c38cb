use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing the work one place has executed.
#[derive(Debug, Default)]
pub struct ExecutorStats {
	activities_started: AtomicU64,
	activities_completed: AtomicU64,
	messages_delivered: AtomicU64,
}

/// Point-in-time copy of [`ExecutorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorSnapshot {
	/// Task bodies handed to the worker pool.
	pub activities_started: u64,
	/// Task bodies that returned (successfully or not).
	pub activities_completed: u64,
	/// Inbox messages applied at this place.
	pub messages_delivered: u64,
}

impl ExecutorSnapshot {
	/// Task bodies started but not yet completed.
	pub fn activities_pending(&self) -> u64 {
		self.activities_started.saturating_sub(self.activities_completed)
	}
}

impl ExecutorStats {
	/// Creates zeroed counters.
	pub fn new() -> Self {
		Self::default()
	}

	/// Records one task body handed to the pool.
	pub fn activity_started(&self) {
		self.activities_started.fetch_add(1, Ordering::Relaxed);
	}

	/// Records one task body returning.
	pub fn activity_completed(&self) {
		self.activities_completed.fetch_add(1, Ordering::Relaxed);
	}

	/// Records one applied inbox message.
	pub fn message_delivered(&self) {
		self.messages_delivered.fetch_add(1, Ordering::Relaxed);
	}

	/// Returns a snapshot of the counters.
	pub fn snapshot(&self) -> ExecutorSnapshot {
		ExecutorSnapshot {
			activities_started: self.activities_started.load(Ordering::Relaxed),
			activities_completed: self.activities_completed.load(Ordering::Relaxed),
			messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn snapshot_tracks_pending_activities() {
		let stats = ExecutorStats::new();
		stats.activity_started();
		stats.activity_started();
		stats.activity_completed();
		stats.message_delivered();

		let snap = stats.snapshot();
		assert_eq!(snap.activities_pending(), 1);
		assert_eq!(snap.messages_delivered, 1);
	}
}
