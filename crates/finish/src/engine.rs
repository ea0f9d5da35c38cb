//! The termination and exception engine behind one finish scope.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};
use pgas_place::{GlobalId, PlaceId, RegistryValue};
use pgas_worker::Blocker;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::counters::Counters;
use crate::retention::Retention;
use crate::{FinishKind, Place, TaskFailure, TransferError};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Role of one engine instance, derived from its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
	/// No task has left the opening place; the engine is a plain counter.
	Local,
	/// The instance at the home place of a distributed scope.
	Root,
	/// The instance materialized at another place.
	Remote,
}

/// What travels with a task to let the destination find its instance.
///
/// Produced by [`Finish::prepare_transfer`] and consumed by
/// [`Finish::resolve`] on the destination place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishToken {
	id: GlobalId,
	kind: FinishKind,
}

impl FinishToken {
	/// Identity of the scope.
	pub fn id(&self) -> GlobalId {
		self.id
	}

	/// Retention policy of the scope.
	pub fn kind(&self) -> FinishKind {
		self.kind
	}
}

struct FinishState {
	id: Option<GlobalId>,
	counters: Counters,
	/// Failures of the whole scope at the root. A remote instance only keeps
	/// failures it could not forward.
	exceptions: Vec<TaskFailure>,
	/// Whether a remote instance is the one bound to its identity at its place.
	bound: bool,
}

impl FinishState {
	fn role(&self, here: PlaceId) -> Role {
		match self.id {
			None => Role::Local,
			Some(id) if id.is_home(here) => Role::Root,
			Some(_) => Role::Remote,
		}
	}

	/// Identity of a remote instance.
	fn remote_id(&self, here: PlaceId) -> Option<GlobalId> {
		self.id.filter(|id| !id.is_home(here))
	}
}

/// One place's instance of a finish scope.
///
/// Every operation takes the instance lock for its whole duration. Messages
/// to the home place are sent while the lock is held, so the snapshots one
/// instance reports leave in the order they were taken.
pub struct Finish {
	place: Arc<Place>,
	serial: u64,
	retention: Retention,
	state: Mutex<FinishState>,
	released: Condvar,
	released_async: Notify,
}

impl Finish {
	fn with_state(place: &Arc<Place>, kind: FinishKind, id: Option<GlobalId>, counters: Counters) -> Self {
		Self {
			place: Arc::clone(place),
			serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
			retention: Retention::new(kind, place.diagnostics()),
			state: Mutex::new(FinishState {
				id,
				counters,
				exceptions: Vec::new(),
				bound: true,
			}),
			released: Condvar::new(),
			released_async: Notify::new(),
		}
	}

	/// Opens a scope at `place`. The scope body counts as one outstanding task.
	pub fn new(place: &Arc<Place>, kind: FinishKind) -> Arc<Self> {
		let here = place.here();
		let mut counters = Counters::new();
		counters.spawn_rooted(here, here, place.max_place());
		let finish = Arc::new(Self::with_state(place, kind, None, counters));
		tracing::trace!(place = %here, serial = finish.serial, kind = %kind, "finish.open");
		finish
	}

	fn materialized(place: &Arc<Place>, id: GlobalId, kind: FinishKind) -> Self {
		let mut counters = Counters::new();
		counters.materialize_remote(place.max_place());
		Self::with_state(place, kind, Some(id), counters)
	}

	/// Place this instance lives on.
	pub fn place(&self) -> &Arc<Place> {
		&self.place
	}

	/// Process-unique serial of this instance.
	pub fn serial(&self) -> u64 {
		self.serial
	}

	/// Retention policy of this instance.
	pub fn kind(&self) -> FinishKind {
		self.retention.kind()
	}

	/// Global identity, once the scope has crossed a place boundary.
	pub fn id(&self) -> Option<GlobalId> {
		self.state.lock().id
	}

	/// Current role of this instance.
	pub fn role(&self) -> Role {
		self.state.lock().role(self.place.here())
	}

	/// Diagnostic label: `local finish@<serial>` or `global finish gid(N)`.
	pub fn label(&self) -> String {
		Self::label_of(self.serial, self.state.lock().id)
	}

	fn label_of(serial: u64, id: Option<GlobalId>) -> String {
		match id {
			Some(id) => format!("global finish {id}"),
			None => format!("local finish@{serial}"),
		}
	}

	/// Registers one task about to be handed off towards `target`.
	pub fn spawn(&self, target: PlaceId) {
		let here = self.place.here();
		let max_place = self.place.max_place();
		let mut state = self.state.lock();
		match state.role(here) {
			Role::Remote => state.counters.spawn_remote(target, max_place),
			Role::Local | Role::Root => state.counters.spawn_rooted(here, target, max_place),
		}
		tracing::trace!(place = %here, serial = self.serial, target = %target, count = state.counters.count(), "finish.spawn");
	}

	/// Accepts a task for execution at this place.
	///
	/// Only a remote instance counts accepted tasks; local and root instances
	/// accounted for the task when it was spawned.
	///
	/// A remote instance that went idle and unbound itself rebinds here.
	/// Returns false when another instance has taken its identity in the
	/// meantime; nothing is counted and the caller must resolve again.
	pub fn submit(self: &Arc<Self>, target: PlaceId) -> bool {
		let here = self.place.here();
		let mut state = self.state.lock();
		let Some(id) = state.remote_id(here) else {
			return true;
		};
		if !state.bound {
			if self.place.identities().put_here_if_absent(id, Arc::clone(self) as RegistryValue).is_some() {
				tracing::trace!(place = %here, finish = %id, serial = self.serial, "finish.submit.superseded");
				return false;
			}
			state.bound = true;
			tracing::trace!(place = %here, finish = %id, serial = self.serial, "finish.rebind");
		}
		state.counters.submit_remote();
		tracing::trace!(place = %here, serial = self.serial, target = %target, count = state.counters.count(), "finish.submit");
		true
	}

	/// Resolves `token` at `place` and accepts one task under the instance
	/// found there.
	pub fn admit(token: FinishToken, place: &Arc<Place>) -> Result<Arc<Self>, TransferError> {
		loop {
			let finish = Self::resolve(token, place)?;
			if finish.submit(place.here()) {
				return Ok(finish);
			}
		}
	}

	/// Retires one task that ran at this place.
	pub fn tell(&self) {
		let here = self.place.here();
		let max_place = self.place.max_place();
		let mut state = self.state.lock();

		if let Some(id) = state.remote_id(here) {
			let Some(deltas) = state.counters.tell_remote(here, max_place) else {
				tracing::trace!(place = %here, finish = %id, count = state.counters.count(), "finish.tell");
				return;
			};
			tracing::debug!(place = %here, finish = %id, ?deltas, "finish.report");
			self.send_update(id, deltas);
			// An idle remote instance is equivalent to a fresh one.
			state.bound = false;
			self.deregister(id);
			return;
		}

		let retire = state.counters.tell_rooted(here, max_place);
		if retire.compensated {
			tracing::warn!(place = %here, serial = self.serial, "finish.tell.reordered");
		}
		tracing::trace!(place = %here, serial = self.serial, count = state.counters.count(), "finish.tell");
		if retire.released {
			drop(state);
			self.wake();
		}
	}

	/// Retracts a spawn towards `target` whose task never ran.
	pub fn unspawn(&self, target: PlaceId) {
		let here = self.place.here();
		let max_place = self.place.max_place();
		let mut state = self.state.lock();
		if state.role(here) == Role::Remote {
			state.counters.unspawn_remote(target, max_place);
			tracing::trace!(place = %here, serial = self.serial, target = %target, "finish.unspawn");
			return;
		}

		let retire = state.counters.unspawn_rooted(target, max_place);
		if retire.compensated {
			tracing::warn!(place = %here, serial = self.serial, target = %target, "finish.unspawn.reordered");
		}
		tracing::trace!(place = %here, serial = self.serial, target = %target, count = state.counters.count(), "finish.unspawn");
		if retire.released {
			drop(state);
			self.wake();
		}
	}

	/// Merges per-place deltas reported by a remote instance into this root.
	pub fn update(&self, deltas: &[i32]) {
		let here = self.place.here();
		let max_place = self.place.max_place();
		let mut state = self.state.lock();
		let released = state.counters.update(here, deltas, max_place);
		tracing::trace!(
			place = %here,
			serial = self.serial,
			?deltas,
			slots = ?state.counters.per_place(),
			count = state.counters.count(),
			"finish.update"
		);
		if released {
			drop(state);
			self.wake();
		}
	}

	fn wake(&self) {
		tracing::debug!(place = %self.place.here(), serial = self.serial, "finish.released");
		self.released.notify_all();
		self.released_async.notify_waiters();
	}

	fn send_update(&self, id: GlobalId, deltas: Vec<i32>) {
		let sent = self.place.send(
			id.home,
			Box::new(move |home: &Arc<Place>| match Self::lookup_root(home, id) {
				Ok(root) => root.update(&deltas),
				Err(err) => tracing::error!(place = %home.here(), finish = %id, %err, "finish.update.unresolved"),
			}),
		);
		if let Err(err) = sent {
			tracing::warn!(place = %self.place.here(), finish = %id, %err, "finish.update.unsent");
		}
	}

	/// Parks the calling thread until this instance has no outstanding work.
	///
	/// Returns whether the instance is released, which is always the case on
	/// return.
	pub fn block(&self) -> bool {
		let mut state = self.state.lock();
		while !state.counters.is_released() {
			self.released.wait(&mut state);
		}
		true
	}

	/// Returns true when this instance has no outstanding work.
	pub fn is_releasable(&self) -> bool {
		self.state.lock().counters.is_released()
	}

	/// Waits asynchronously until this instance has no outstanding work.
	pub async fn released(&self) {
		loop {
			let notified = self.released_async.notified();
			let mut notified = std::pin::pin!(notified);
			notified.as_mut().enable();
			if self.is_releasable() {
				return;
			}
			notified.await;
		}
	}

	/// Records a failure raised by a task governed by this instance.
	///
	/// A remote instance forwards the failure to the root and keeps the
	/// scope open until it has been delivered there.
	pub fn add_suppressed(&self, failure: TaskFailure) {
		let here = self.place.here();
		let max_place = self.place.max_place();
		let mut state = self.state.lock();
		if let Retention::Retain(registry) = &self.retention {
			registry.record(self.serial, Self::label_of(self.serial, state.id), failure.clone());
		}

		let Some(id) = state.remote_id(here) else {
			tracing::debug!(place = %here, serial = self.serial, %failure, "finish.failure");
			state.exceptions.push(failure);
			return;
		};

		state.counters.spawn_remote(id.home, max_place);
		let payload = failure.encode().unwrap_or_else(|err| {
			tracing::warn!(place = %here, finish = %id, %err, "finish.failure.encode");
			TaskFailure::codec(&err, here).encode().unwrap_or_default()
		});
		let sent = self.place.send(
			id.home,
			Box::new(move |home: &Arc<Place>| Self::deliver_failure(home, id, &payload)),
		);
		match sent {
			Ok(()) => tracing::debug!(place = %here, finish = %id, %failure, "finish.failure.forward"),
			Err(err) => {
				state.counters.unspawn_remote(id.home, max_place);
				tracing::error!(place = %here, finish = %id, %err, %failure, "finish.failure.unsent");
				state.exceptions.push(failure);
			}
		}
	}

	/// Applies a forwarded failure at the home place, as a task governed by the root.
	fn deliver_failure(home: &Arc<Place>, id: GlobalId, payload: &[u8]) {
		let root = match Self::lookup_root(home, id) {
			Ok(root) => root,
			Err(err) => {
				tracing::error!(place = %home.here(), finish = %id, %err, "finish.failure.unresolved");
				return;
			}
		};
		root.submit(home.here());
		let failure = TaskFailure::decode(payload).unwrap_or_else(|err| TaskFailure::codec(&err, home.here()));
		tracing::debug!(place = %home.here(), finish = %id, %failure, "finish.failure.delivered");
		root.add_suppressed(failure);
		root.tell();
	}

	/// Failures collected so far, in capture order.
	pub fn exceptions(&self) -> Vec<TaskFailure> {
		self.state.lock().exceptions.clone()
	}

	/// Takes the collected failures, leaving none behind.
	pub fn take_exceptions(&self) -> Vec<TaskFailure> {
		std::mem::take(&mut self.state.lock().exceptions)
	}

	/// Prepares this instance for a task crossing a place boundary.
	///
	/// The first call allocates the scope's identity at this place and
	/// registers this instance under it, turning a local instance into the
	/// root. Later calls reuse the identity.
	pub fn prepare_transfer(self: &Arc<Self>) -> Result<FinishToken, TransferError> {
		let mut state = self.state.lock();
		let id = match state.id {
			Some(id) => id,
			None => {
				let identities = self.place.identities();
				let id = identities.allocate()?;
				identities.put_here(id, Arc::clone(self) as RegistryValue);
				state.id = Some(id);
				tracing::debug!(place = %self.place.here(), serial = self.serial, finish = %id, "finish.globalize");
				id
			}
		};
		Ok(FinishToken {
			id,
			kind: self.retention.kind(),
		})
	}

	/// Finds or materializes the instance named by `token` at `place`.
	///
	/// At the home place this is the root, which must still be registered.
	/// Elsewhere, concurrent callers for the same identity all observe one
	/// instance.
	pub fn resolve(token: FinishToken, place: &Arc<Place>) -> Result<Arc<Self>, TransferError> {
		let id = token.id;
		if id.is_home(place.here()) {
			return Self::lookup_root(place, id);
		}

		let identities = place.identities();
		if let Some(bound) = identities.get_here(id) {
			return Self::downcast(bound, id);
		}
		let candidate = Arc::new(Self::materialized(place, id, token.kind));
		match identities.put_here_if_absent(id, Arc::clone(&candidate) as RegistryValue) {
			Some(existing) => Self::downcast(existing, id),
			None => {
				tracing::debug!(place = %place.here(), finish = %id, serial = candidate.serial, "finish.materialize");
				Ok(candidate)
			}
		}
	}

	fn lookup_root(home: &Arc<Place>, id: GlobalId) -> Result<Arc<Self>, TransferError> {
		let bound = home.identities().get_here(id).ok_or(TransferError::UnknownIdentity(id))?;
		Self::downcast(bound, id)
	}

	fn downcast(bound: RegistryValue, id: GlobalId) -> Result<Arc<Self>, TransferError> {
		bound.downcast::<Self>().map_err(|_| TransferError::TypeMismatch(id))
	}

	/// Removes this instance's identity binding at its place, if still bound to it.
	pub fn release_identity(&self) {
		let id = self.state.lock().id;
		if let Some(id) = id {
			self.deregister(id);
		}
	}

	fn deregister(&self, id: GlobalId) {
		let removed = self
			.place
			.identities()
			.remove_here_if(id, |bound| std::ptr::addr_eq(Arc::as_ptr(bound), self as *const Self));
		if removed.is_some() {
			tracing::trace!(place = %self.place.here(), finish = %id, "finish.deregister");
		}
	}
}

impl Blocker for Finish {
	fn block(&self) -> bool {
		Finish::block(self)
	}

	fn is_releasable(&self) -> bool {
		Finish::is_releasable(self)
	}
}

impl fmt::Debug for Finish {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.lock();
		f.debug_struct("Finish")
			.field("place", &self.place.here())
			.field("serial", &self.serial)
			.field("id", &state.id)
			.field("role", &state.role(self.place.here()))
			.field("counters", &state.counters)
			.field("exceptions", &state.exceptions.len())
			.finish()
	}
}
