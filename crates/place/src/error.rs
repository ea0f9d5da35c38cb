//! Errors raised when addressing places.

use thiserror::Error;

use crate::PlaceId;

/// Failure to reach a place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceError {
	/// The place id is outside the set of known places.
	#[error("{place} is not one of the {places} known places")]
	BadPlace {
		/// The requested place.
		place: PlaceId,
		/// Number of places currently known.
		places: usize,
	},

	/// The place is known but no longer accepts messages.
	#[error("{0} is dead")]
	Dead(PlaceId),

	/// The place has handed out every local sequence number.
	#[error("{0} has no identities left to allocate")]
	IdsExhausted(PlaceId),
}

/// Result type for place operations.
pub type Result<T> = std::result::Result<T, PlaceError>;
