//! Per-place registry of values named by [`GlobalId`].

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::RwLock;

use crate::{GlobalId, PlaceError, PlaceId, Result};

/// Type-erased value stored under a global id.
pub type RegistryValue = Arc<dyn Any + Send + Sync>;

/// Maps global ids to the value associated with them at one place.
///
/// Each place owns one registry. Ids allocated here are homed here; ids
/// allocated elsewhere can still be bound here, which is how a place keeps
/// its own materialization of a value that lives on many places.
///
/// Thread-safe; share it via `Arc` or by reference from the owning place.
pub struct IdentityRegistry {
	/// The place owning this registry.
	here: PlaceId,
	/// Next local sequence number for [`Self::allocate`].
	next: AtomicU32,
	/// Bound values.
	values: RwLock<HashMap<GlobalId, RegistryValue>>,
}

impl IdentityRegistry {
	/// Creates an empty registry for `here`.
	pub fn new(here: PlaceId) -> Self {
		Self {
			here,
			next: AtomicU32::new(0),
			values: RwLock::new(HashMap::new()),
		}
	}

	/// Returns the place owning this registry.
	pub fn here(&self) -> PlaceId {
		self.here
	}

	/// Allocates a fresh id homed at this place.
	///
	/// Sequence numbers are never reused; once they run out allocation fails
	/// with [`PlaceError::IdsExhausted`].
	pub fn allocate(&self) -> Result<GlobalId> {
		let local = self
			.next
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| next.checked_add(1))
			.map_err(|_| PlaceError::IdsExhausted(self.here))?;
		let id = GlobalId::new(self.here, local);
		tracing::trace!(place = %self.here, id = %id, "identity.allocate");
		Ok(id)
	}

	/// Binds `value` to `id`, returning the previously bound value.
	pub fn put_here(&self, id: GlobalId, value: RegistryValue) -> Option<RegistryValue> {
		self.values.write().insert(id, value)
	}

	/// Binds `value` to `id` unless a value is already bound.
	///
	/// Returns the existing value when one was present, `None` when `value`
	/// won. Concurrent callers racing on the same id observe a single winner.
	pub fn put_here_if_absent(&self, id: GlobalId, value: RegistryValue) -> Option<RegistryValue> {
		match self.values.write().entry(id) {
			Entry::Occupied(existing) => Some(Arc::clone(existing.get())),
			Entry::Vacant(slot) => {
				slot.insert(value);
				None
			}
		}
	}

	/// Returns the value bound to `id`.
	pub fn get_here(&self, id: GlobalId) -> Option<RegistryValue> {
		self.values.read().get(&id).cloned()
	}

	/// Unbinds `id` only when `pred` accepts the bound value.
	///
	/// The check and the removal happen under one write lock, so a value
	/// rebound concurrently is never removed by a stale caller.
	pub fn remove_here_if(&self, id: GlobalId, pred: impl FnOnce(&RegistryValue) -> bool) -> Option<RegistryValue> {
		match self.values.write().entry(id) {
			Entry::Occupied(bound) if pred(bound.get()) => Some(bound.remove()),
			_ => None,
		}
	}

	/// Number of bound ids.
	pub fn len(&self) -> usize {
		self.values.read().len()
	}

	/// Returns true when no id is bound.
	pub fn is_empty(&self) -> bool {
		self.values.read().is_empty()
	}
}

impl std::fmt::Debug for IdentityRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("IdentityRegistry")
			.field("here", &self.here)
			.field("bound", &self.len())
			.finish()
	}
}
