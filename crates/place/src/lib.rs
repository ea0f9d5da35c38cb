//! Place identifiers and the distributed identity registry.
//!
//! A place is one participant of a partitioned computation. Values that must
//! be correlated across places are named by a [`GlobalId`] bound to the place
//! that allocated it, and every place keeps its own [`IdentityRegistry`]
//! mapping those ids to place-local values.

#![warn(missing_docs)]

pub mod error;
pub mod id;
pub mod identity;

pub use error::{PlaceError, Result};
pub use id::{GlobalId, PlaceId};
pub use identity::{IdentityRegistry, RegistryValue};
