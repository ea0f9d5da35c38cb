//! Per-place context handed to finish engines and tasks.

use std::fmt;
use std::sync::Arc;

use pgas_place::{IdentityRegistry, PlaceId};

use crate::{DiagnosticRegistry, FinishKind};

/// A closure applied at its destination place.
pub type PlaceMessage = Box<dyn FnOnce(&Arc<Place>) + Send>;

/// A task body handed to a place's worker pool.
pub type Job = Box<dyn FnOnce() + Send>;

/// Delivers messages between places.
///
/// Messages sent from one place to one destination are applied in send
/// order. A send to an unknown or dead place fails synchronously and the
/// message is dropped.
pub trait Transport: Send + Sync + 'static {
	/// Number of places currently known. Place ids are below this bound.
	fn max_place(&self) -> usize;

	/// Sends `msg` from `from` to `to`.
	fn send(&self, from: PlaceId, to: PlaceId, msg: PlaceMessage) -> pgas_place::Result<()>;
}

/// Runs task bodies on a place's worker pool.
pub trait Executor: Send + Sync + 'static {
	/// Hands `job` to the pool. The job may block its thread.
	fn execute(&self, job: Job);
}

/// Everything a finish engine needs from the place it lives on.
pub struct Place {
	here: PlaceId,
	transport: Arc<dyn Transport>,
	executor: Arc<dyn Executor>,
	identities: IdentityRegistry,
	diagnostics: Arc<DiagnosticRegistry>,
	finish_kind: FinishKind,
	spin_before_block: usize,
}

impl Place {
	/// Creates the context of place `here`.
	pub fn new(here: PlaceId, transport: Arc<dyn Transport>, executor: Arc<dyn Executor>) -> Self {
		Self {
			here,
			transport,
			executor,
			identities: IdentityRegistry::new(here),
			diagnostics: Arc::new(DiagnosticRegistry::new(here)),
			finish_kind: FinishKind::Default,
			spin_before_block: 64,
		}
	}

	/// Sets the kind of scopes opened through [`Place::finish`].
	pub fn with_finish_kind(mut self, kind: FinishKind) -> Self {
		self.finish_kind = kind;
		self
	}

	/// Sets how many times a scope owner polls before parking.
	pub fn with_spin_before_block(mut self, spins: usize) -> Self {
		self.spin_before_block = spins;
		self
	}

	/// Id of this place.
	pub fn here(&self) -> PlaceId {
		self.here
	}

	/// Number of places currently known.
	pub fn max_place(&self) -> usize {
		self.transport.max_place()
	}

	/// Sends `msg` from this place to `to`.
	pub fn send(&self, to: PlaceId, msg: PlaceMessage) -> pgas_place::Result<()> {
		self.transport.send(self.here, to, msg)
	}

	/// Hands `job` to this place's worker pool.
	pub fn execute(&self, job: Job) {
		self.executor.execute(job);
	}

	/// Identity registry of this place.
	pub fn identities(&self) -> &IdentityRegistry {
		&self.identities
	}

	/// Diagnostic registry of this place.
	pub fn diagnostics(&self) -> &Arc<DiagnosticRegistry> {
		&self.diagnostics
	}

	/// Kind of scopes opened through [`Place::finish`].
	pub fn finish_kind(&self) -> FinishKind {
		self.finish_kind
	}

	/// Polls performed by a scope owner before parking.
	pub fn spin_before_block(&self) -> usize {
		self.spin_before_block
	}
}

impl fmt::Debug for Place {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Place")
			.field("here", &self.here)
			.field("finish_kind", &self.finish_kind)
			.field("identities", &self.identities)
			.finish_non_exhaustive()
	}
}
