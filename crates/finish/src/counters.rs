//! Task accounting for one finish instance at one place.
//!
//! The same two fields carry different meanings depending on the role of
//! the instance, so that a finish that never leaves its place costs one
//! integer and no allocation.

use pgas_place::PlaceId;

/// Outcome of retiring one unit on a local or root instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Retire {
	/// The instance reached zero outstanding work.
	pub released: bool,
	/// The slot was already at zero and had to be compensated: the matching
	/// spawn announcement has not been applied here yet.
	pub compensated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Counters {
	/// Multi-purpose counter. Counts:
	/// - all tasks of a local finish;
	/// - places with a nonzero slot for a root finish;
	/// - tasks accepted and not yet told for a remote finish.
	count: i32,
	/// Per-place spawned-minus-terminated tallies, `None` until a task is
	/// spawned away from the local place. Never shrinks.
	per_place: Option<Vec<i32>>,
}

fn ensure_slot(slots: &mut Vec<i32>, index: usize, max_place: usize) {
	if index >= slots.len() {
		slots.resize((index + 1).max(max_place), 0);
	}
}

impl Counters {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn count(&self) -> i32 {
		self.count
	}

	pub fn per_place(&self) -> Option<&[i32]> {
		self.per_place.as_deref()
	}

	pub fn is_released(&self) -> bool {
		self.count == 0
	}

	/// Splits into the counter and the per-place slots of a local or root
	/// instance, migrating the local count into slot `here` on first use.
	fn rooted_split(&mut self, here: PlaceId, max_place: usize) -> (&mut i32, &mut Vec<i32>) {
		let count = &mut self.count;
		let slots = self.per_place.get_or_insert_with(|| {
			let mut slots = vec![0; max_place.max(here.index() + 1)];
			slots[here.index()] = *count;
			*count = i32::from(*count != 0);
			slots
		});
		(count, slots)
	}

	fn remote_slots(&mut self, max_place: usize) -> &mut Vec<i32> {
		self.per_place.get_or_insert_with(|| vec![0; max_place])
	}

	/// Allocates the slots of a freshly materialized remote instance.
	pub fn materialize_remote(&mut self, max_place: usize) {
		self.remote_slots(max_place);
	}

	pub fn spawn_rooted(&mut self, here: PlaceId, target: PlaceId, max_place: usize) {
		if self.per_place.is_none() && target == here {
			self.count += 1;
			return;
		}
		let (count, slots) = self.rooted_split(here, max_place);
		ensure_slot(slots, target.index(), max_place);
		let slot = &mut slots[target.index()];
		*slot += 1;
		if *slot == 1 {
			*count += 1;
		}
		// The slot was negative: a completion for `target` arrived before this spawn.
		if *slot == 0 {
			*count -= 1;
		}
	}

	pub fn spawn_remote(&mut self, target: PlaceId, max_place: usize) {
		let slots = self.remote_slots(max_place);
		ensure_slot(slots, target.index(), max_place);
		slots[target.index()] += 1;
	}

	pub fn submit_remote(&mut self) {
		self.count += 1;
	}

	pub fn tell_rooted(&mut self, here: PlaceId, max_place: usize) -> Retire {
		let mut compensated = false;
		if let Some(slots) = self.per_place.as_mut() {
			ensure_slot(slots, here.index(), max_place);
			let slot = &mut slots[here.index()];
			if *slot == 0 {
				self.count += 1;
				compensated = true;
			}
			*slot -= 1;
			if *slot != 0 {
				return Retire {
					released: false,
					compensated,
				};
			}
		}
		self.count -= 1;
		Retire {
			released: self.count == 0,
			compensated,
		}
	}

	/// Retires one task on a remote instance.
	///
	/// Returns the per-place deltas to report home when the instance runs out
	/// of local work; the slots are zeroed in the same step.
	pub fn tell_remote(&mut self, here: PlaceId, max_place: usize) -> Option<Vec<i32>> {
		let count = &mut self.count;
		let slots = self.per_place.get_or_insert_with(|| vec![0; max_place]);
		ensure_slot(slots, here.index(), max_place);
		slots[here.index()] -= 1;
		*count -= 1;
		if *count != 0 {
			return None;
		}
		let len = slots.len();
		Some(std::mem::replace(slots, vec![0; len]))
	}

	pub fn unspawn_rooted(&mut self, target: PlaceId, max_place: usize) -> Retire {
		let Some(slots) = self.per_place.as_mut() else {
			self.count -= 1;
			return Retire {
				released: self.count == 0,
				compensated: false,
			};
		};
		ensure_slot(slots, target.index(), max_place);
		let slot = &mut slots[target.index()];
		let compensated = *slot == 0;
		if compensated {
			self.count += 1;
		}
		*slot -= 1;
		if *slot == 0 {
			self.count -= 1;
		}
		Retire {
			released: self.count == 0,
			compensated,
		}
	}

	pub fn unspawn_remote(&mut self, target: PlaceId, max_place: usize) {
		let slots = self.remote_slots(max_place);
		ensure_slot(slots, target.index(), max_place);
		slots[target.index()] -= 1;
	}

	/// Merges a remote instance's deltas into a root instance.
	///
	/// Returns true when the root reaches zero outstanding places.
	pub fn update(&mut self, here: PlaceId, deltas: &[i32], max_place: usize) -> bool {
		let (count, slots) = self.rooted_split(here, max_place);
		if deltas.len() > slots.len() {
			slots.resize(deltas.len().max(max_place), 0);
		}
		for (slot, delta) in slots.iter_mut().zip(deltas) {
			if *slot != 0 {
				*count -= 1;
			}
			*slot += delta;
			if *slot != 0 {
				*count += 1;
			}
		}
		*count == 0
	}
}
