//! Finish scopes over a partitioned set of places.
//!
//! A finish scope waits until every task spawned inside it, on any place,
//! has terminated, then raises the failures those tasks reported as one
//! [`MultipleFailures`]. Each scope is tracked by a [`Finish`] engine that is
//! materialized lazily on every place that runs one of its tasks:
//!
//! * while no task has left the opening place, the engine is a plain counter;
//! * the first transfer allocates a [`GlobalId`](pgas_place::GlobalId) and
//!   turns the engine into the root of a distributed tally;
//! * other places materialize remote instances that report per-place deltas
//!   back to the root whenever they run out of local work.
//!
//! The collaborators an engine needs (transport, executor, identity registry)
//! are bundled in a [`Place`] and injected explicitly.

#![warn(missing_docs)]

mod aggregate;
mod constructs;
mod counters;
mod engine;
mod error;
mod failure;
mod place;
mod retention;
mod task;

#[cfg(test)]
mod testing;

pub use aggregate::MultipleFailures;
pub use constructs::{
	async_arbitrary_finish, async_at, async_at_with_co_finish, async_different_finish, async_task, at, current_finish,
	finish, here,
};
pub use engine::{Finish, FinishToken, Role};
pub use error::{Error, Result, TransferError};
pub use failure::TaskFailure;
pub use place::{Executor, Job, Place, PlaceMessage, Transport};
pub use retention::{DiagnosticEntry, DiagnosticRegistry, FinishKind, ParseFinishKindError};
pub use task::{Task, TaskBody};
