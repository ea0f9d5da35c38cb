//! Worker primitives shared by every place of a cluster.
//!
//! * [`TaskClass`]: classification attached to every spawn for observability
//! * [`spawn_on`] / [`spawn_blocking_on`]: runtime entry points
//! * [`Inbox`]: FIFO message queue feeding a place
//! * [`Blocker`] / [`managed_block`]: cooperative blocking for scope owners
//! * [`ExecutorStats`]: per-place activity counters

#![warn(missing_docs)]

mod blocker;
mod class;
mod inbox;
mod panic;
mod spawn;
mod stats;

pub use blocker::{Blocker, managed_block};
pub use class::TaskClass;
pub use inbox::{Inbox, InboxClosed, InboxReceiver, InboxSender};
pub use panic::panic_message;
pub use spawn::{spawn_blocking_on, spawn_on};
pub use stats::{ExecutorSnapshot, ExecutorStats};
