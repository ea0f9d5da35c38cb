use std::sync::Arc;

use pgas_finish::{DiagnosticEntry, Executor, Place, Transport};
use pgas_place::{PlaceError, PlaceId};
use pgas_worker::{ExecutorSnapshot, ExecutorStats, TaskClass};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, RuntimeConfig};
use crate::transport::{LocalTransport, PoolExecutor, pump};

/// Failure to start a cluster.
#[derive(Debug, Error)]
pub enum StartError {
	/// The configuration is invalid.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The runtime could not be built.
	#[error("failed to build cluster runtime: {0}")]
	Runtime(#[from] std::io::Error),
}

/// A set of places sharing one process.
///
/// Every place has its own inbox, applied in arrival order by a pump task,
/// and runs task bodies on the shared blocking pool.
pub struct Cluster {
	config: RuntimeConfig,
	runtime: Option<Runtime>,
	transport: Arc<LocalTransport>,
	places: Vec<Arc<Place>>,
	stats: Vec<Arc<ExecutorStats>>,
	shutdown: CancellationToken,
}

impl Cluster {
	/// Starts a cluster described by `config`.
	pub fn start(config: RuntimeConfig) -> Result<Self, StartError> {
		config.validate()?;
		let runtime = tokio::runtime::Builder::new_multi_thread()
			.thread_name("pgas-place")
			.max_blocking_threads(config.max_blocking_threads)
			.build()?;
		let handle = runtime.handle().clone();

		let (transport, inboxes) = LocalTransport::new(config.places);
		let transport = Arc::new(transport);
		let shutdown = CancellationToken::new();
		let mut places = Vec::with_capacity(config.places);
		let mut stats = Vec::with_capacity(config.places);

		for (index, inbox) in inboxes.into_iter().enumerate() {
			let here = PlaceId::from_index(index);
			let counters = Arc::new(ExecutorStats::new());
			let executor: Arc<dyn Executor> = Arc::new(PoolExecutor::new(handle.clone(), Arc::clone(&counters)));
			let place = Arc::new(
				Place::new(here, Arc::clone(&transport) as Arc<dyn Transport>, executor)
					.with_finish_kind(config.finish)
					.with_spin_before_block(config.spin_before_block),
			);
			let _pump = pgas_worker::spawn_on(
				&handle,
				TaskClass::Delivery,
				pump(Arc::clone(&place), inbox, Arc::clone(&counters), shutdown.child_token()),
			);
			places.push(place);
			stats.push(counters);
		}

		tracing::debug!(places = config.places, finish = %config.finish, "cluster.start");
		Ok(Self {
			config,
			runtime: Some(runtime),
			transport,
			places,
			stats,
			shutdown,
		})
	}

	/// Configuration the cluster was started with.
	pub fn config(&self) -> &RuntimeConfig {
		&self.config
	}

	/// Context of place `id`.
	pub fn place(&self, id: PlaceId) -> Result<&Arc<Place>, PlaceError> {
		self.places.get(id.index()).ok_or(PlaceError::BadPlace {
			place: id,
			places: self.places.len(),
		})
	}

	/// Contexts of every place, in id order.
	pub fn places(&self) -> &[Arc<Place>] {
		&self.places
	}

	/// Opens a finish scope at place 0 and runs `body` on the calling thread.
	pub fn finish<F>(&self, body: F) -> pgas_finish::Result<()>
	where
		F: FnOnce() -> anyhow::Result<()>,
	{
		self.place(PlaceId(0))?.finish(body)
	}

	/// Makes `place` unreachable: later sends to it fail with [`PlaceError::Dead`].
	pub fn kill(&self, place: PlaceId) -> Result<(), PlaceError> {
		self.transport.kill(place)
	}

	/// Returns true once `place` has been killed.
	pub fn is_dead(&self, place: PlaceId) -> bool {
		self.transport.is_dead(place)
	}

	/// Removes and returns every failure retained by debug scopes, on every place.
	pub fn dump_suppressed(&self) -> Vec<(PlaceId, DiagnosticEntry)> {
		self.places
			.iter()
			.flat_map(|place| place.diagnostics().dump().into_iter().map(|entry| (place.here(), entry)))
			.collect()
	}

	/// Returns true when some place retains undumped failures.
	pub fn suppressed_present(&self) -> bool {
		self.places.iter().any(|place| !place.diagnostics().is_empty())
	}

	/// Executor counters of every place, in id order.
	pub fn stats(&self) -> Vec<ExecutorSnapshot> {
		self.stats.iter().map(|stats| stats.snapshot()).collect()
	}

	/// Stops every place. Task bodies still running are abandoned.
	pub fn shutdown(mut self) {
		self.stop();
	}

	fn stop(&mut self) {
		let Some(runtime) = self.runtime.take() else {
			return;
		};
		self.shutdown.cancel();
		self.transport.close_all();
		runtime.shutdown_background();
		tracing::debug!(places = self.places.len(), "cluster.shutdown");
	}
}

impl Drop for Cluster {
	fn drop(&mut self) {
		self.stop();
	}
}

impl std::fmt::Debug for Cluster {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Cluster")
			.field("config", &self.config)
			.field("running", &self.runtime.is_some())
			.finish_non_exhaustive()
	}
}
