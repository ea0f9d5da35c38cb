//! Task-facing constructs, resolved through the activity running on the
//! calling thread.

use std::sync::Arc;

use parking_lot::Mutex;
use pgas_place::PlaceId;

use crate::task::{self, run_body};
use crate::{Error, Finish, FinishKind, MultipleFailures, Place, Result, Task};

impl Place {
	/// Opens a finish scope on this place and runs `body` on the calling thread.
	///
	/// Returns once every task spawned inside the scope, on any place, has
	/// terminated. Fails with [`Error::Multiple`] when any of them, or the
	/// body itself, failed.
	pub fn finish<F>(self: &Arc<Self>, body: F) -> Result<()>
	where
		F: FnOnce() -> anyhow::Result<()>,
	{
		self.finish_with(self.finish_kind(), body)
	}

	/// Like [`Place::finish`] with an explicit retention policy.
	pub fn finish_with<F>(self: &Arc<Self>, kind: FinishKind, body: F) -> Result<()>
	where
		F: FnOnce() -> anyhow::Result<()>,
	{
		let scope = Finish::new(self, kind);
		if let Some(failure) = run_body(self, &scope, body) {
			scope.add_suppressed(failure);
		}
		scope.tell();
		pgas_worker::managed_block(&*scope, self.spin_before_block());
		scope.release_identity();

		let failures = scope.take_exceptions();
		tracing::debug!(place = %self.here(), serial = scope.serial(), failures = failures.len(), "finish.exit");
		if failures.is_empty() {
			Ok(())
		} else {
			Err(MultipleFailures::new(failures).into())
		}
	}
}

/// The finish governing the running task.
pub fn current_finish() -> Result<Arc<Finish>> {
	Ok(task::current()?.finish)
}

/// The place the running task executes on.
pub fn here() -> Result<PlaceId> {
	Ok(task::current()?.place.here())
}

/// Opens a nested finish scope from inside a running task.
pub fn finish<F>(body: F) -> Result<()>
where
	F: FnOnce() -> anyhow::Result<()>,
{
	task::current()?.place.finish(body)
}

/// Spawns `job` on the current place under the current finish.
pub fn async_task<F>(job: F) -> Result<()>
where
	F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
	let activity = task::current()?;
	Task::new(activity.finish, activity.place.here(), Box::new(job)).spawn_here(&activity.place);
	Ok(())
}

/// Spawns `job` at `target` under the current finish.
///
/// Fails when `target` cannot be reached; the spawn is retracted first.
pub fn async_at<F>(target: PlaceId, job: F) -> Result<()>
where
	F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
	let activity = task::current()?;
	Task::new(activity.finish, activity.place.here(), Box::new(job)).spawn_at(&activity.place, target)
}

/// Evaluates `f` at `target` and returns its value.
///
/// Runs inside its own finish scope, so tasks spawned by `f` complete before
/// this returns and a failure of `f` surfaces as [`Error::Multiple`].
pub fn at<T, F>(target: PlaceId, f: F) -> Result<T>
where
	T: Send + 'static,
	F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
	let slot = Arc::new(Mutex::new(None));
	let sink = Arc::clone(&slot);
	finish(move || {
		async_at(target, move || {
			*sink.lock() = Some(f()?);
			Ok(())
		})?;
		Ok(())
	})?;
	slot.lock().take().ok_or(Error::MissingValue(target))
}

/// Spawns `job` at `target`, registered with the current finish and every
/// finish in `co`.
///
/// The current finish governs the task; the others only wait for it.
pub fn async_at_with_co_finish<F>(target: PlaceId, job: F, co: &[Arc<Finish>]) -> Result<()>
where
	F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
	let activity = task::current()?;
	let finishes = std::iter::once(activity.finish).chain(co.iter().cloned());
	Task::with_finishes(finishes, activity.place.here(), Box::new(job))?.spawn_at(&activity.place, target)
}

/// Spawns `job` on `finish`'s place, governed by `finish` instead of the
/// current one.
///
/// The caller must itself keep `finish` open, by being governed by or
/// registered with it, until this returns.
pub fn async_different_finish<F>(finish: &Arc<Finish>, job: F)
where
	F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
	let place = finish.place();
	Task::new(Arc::clone(finish), place.here(), Box::new(job)).spawn_here(place);
}

/// Spawns `job` at `target`, registered only with `finishes`.
///
/// The first finish governs the task. Fails with [`Error::NoFinish`] when
/// `finishes` is empty.
pub fn async_arbitrary_finish<F>(target: PlaceId, job: F, finishes: &[Arc<Finish>]) -> Result<()>
where
	F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
	let place = Arc::clone(finishes.first().ok_or(Error::NoFinish)?.place());
	Task::with_finishes(finishes.iter().cloned(), place.here(), Box::new(job))?.spawn_at(&place, target)
}
