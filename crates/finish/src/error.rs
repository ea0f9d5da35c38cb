//! Error types for finish scopes and cross-place transfer.

use pgas_place::{GlobalId, PlaceError, PlaceId};
use thiserror::Error;

use crate::MultipleFailures;

/// Failure to move finish state or failures across a place boundary.
///
/// Fatal to the operation that triggered it: continuing would break the
/// one-instance-per-place invariant or lose a failure.
#[derive(Debug, Error)]
pub enum TransferError {
	/// The home place no longer knows the root instance for this identity.
	#[error("no finish registered under {0} at its home place")]
	UnknownIdentity(GlobalId),

	/// The identity names a value that is not a finish.
	#[error("{0} is bound to a value that is not a finish")]
	TypeMismatch(GlobalId),

	/// A transported failure could not be encoded or decoded.
	#[error("failure codec error: {0}")]
	Codec(#[from] postcard::Error),

	/// No identity could be allocated for the scope.
	#[error(transparent)]
	Allocate(#[from] PlaceError),
}

/// Errors surfaced by finish constructs.
#[derive(Debug, Error)]
pub enum Error {
	/// One or more tasks governed by the scope failed.
	#[error(transparent)]
	Multiple(#[from] MultipleFailures),

	/// A task-only construct was used outside any running task or scope.
	#[error("not running inside a finish scope")]
	NoActivity,

	/// An arbitrary-finish spawn was given no finish to register with.
	#[error("a task must be registered with at least one finish")]
	NoFinish,

	/// A remote evaluation completed without producing its value.
	#[error("evaluation at {0} completed without a value")]
	MissingValue(PlaceId),

	/// The target place could not be reached.
	#[error(transparent)]
	Place(#[from] PlaceError),

	/// Finish state could not be transferred.
	#[error(transparent)]
	Transfer(#[from] TransferError),
}

impl Error {
	/// Returns the aggregated task failures when this is a scope failure.
	pub fn failures(&self) -> Option<&MultipleFailures> {
		match self {
			Self::Multiple(failures) => Some(failures),
			_ => None,
		}
	}
}

/// Result type for finish constructs.
pub type Result<T> = std::result::Result<T, Error>;
