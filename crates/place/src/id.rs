//! Identifier types for places and globally named values.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Identifier of one place, a small dense integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlaceId(pub u32);

impl PlaceId {
	/// Returns the id as an index into per-place tables.
	pub const fn index(self) -> usize {
		self.0 as usize
	}

	/// Builds a place id from a table index.
	///
	/// # Panics
	///
	/// Panics if `index` does not fit in a `u32`.
	pub fn from_index(index: usize) -> Self {
		Self(u32::try_from(index).expect("place index exceeds u32"))
	}
}

impl fmt::Display for PlaceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "place({})", self.0)
	}
}

/// A globally unique identifier bound to the place that allocated it.
///
/// Two ids are equal when their [`gid`](Self::gid) values are equal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GlobalId {
	/// The allocating place.
	pub home: PlaceId,
	/// Sequence number local to `home`.
	pub local: u32,
}

impl GlobalId {
	/// Creates an id from its parts.
	pub const fn new(home: PlaceId, local: u32) -> Self {
		Self { home, local }
	}

	/// Packs home and local parts into one 64-bit value.
	pub const fn gid(&self) -> u64 {
		((self.home.0 as u64) << 32) + self.local as u64
	}

	/// Returns true when this id was allocated at `place`.
	pub fn is_home(&self, place: PlaceId) -> bool {
		self.home == place
	}
}

impl PartialEq for GlobalId {
	fn eq(&self, other: &Self) -> bool {
		self.gid() == other.gid()
	}
}

impl Eq for GlobalId {}

impl Hash for GlobalId {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.gid().hash(state);
	}
}

impl fmt::Display for GlobalId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "gid({})", self.gid())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn gid_packs_home_in_high_bits() {
		let id = GlobalId::new(PlaceId(3), 7);
		assert_eq!(id.gid(), (3u64 << 32) + 7);
		assert_eq!(id.to_string(), format!("gid({})", (3u64 << 32) + 7));
	}

	#[test]
	fn ids_with_same_gid_are_equal() {
		assert_eq!(GlobalId::new(PlaceId(1), 2), GlobalId::new(PlaceId(1), 2));
		assert_ne!(GlobalId::new(PlaceId(1), 2), GlobalId::new(PlaceId(2), 1));
	}

	#[test]
	fn ids_survive_the_wire() {
		let id = GlobalId::new(PlaceId(2), 41);
		let bytes = postcard::to_stdvec(&id).unwrap();
		let back: GlobalId = postcard::from_bytes(&bytes).unwrap();
		assert_eq!(back, id);
		assert_eq!(back.home, PlaceId(2));
	}
}
