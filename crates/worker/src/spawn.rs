use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::TaskClass;

/// Spawns an async task on `handle`, tagged with its class.
pub fn spawn_on<F>(handle: &Handle, class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	handle.spawn(fut)
}

/// Runs `f` on the blocking pool of `handle`, tagged with its class.
pub fn spawn_blocking_on<F, R>(handle: &Handle, class: TaskClass, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn_blocking");
	handle.spawn_blocking(f)
}
