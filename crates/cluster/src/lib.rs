//! An in-process cluster of places running finish scopes.
//!
//! [`Cluster::start`] builds one multi-thread runtime shared by every place.
//! Each place gets a FIFO inbox applied by its own pump task, and runs task
//! bodies on the runtime's blocking pool, so scopes nested inside tasks may
//! block their thread.
//!
//! ```no_run
//! use pgas_cluster::{Cluster, RuntimeConfig};
//! use pgas_finish::{async_at, here};
//! use pgas_place::PlaceId;
//!
//! let cluster = Cluster::start(RuntimeConfig::default()).unwrap();
//! cluster
//! 	.finish(|| {
//! 		async_at(PlaceId(1), || {
//! 			println!("hello from {}", here()?);
//! 			Ok(())
//! 		})?;
//! 		Ok(())
//! 	})
//! 	.unwrap();
//! ```

#![warn(missing_docs)]

mod cluster;
pub mod config;
pub mod telemetry;
pub mod transport;

pub use cluster::{Cluster, StartError};
pub use config::{ConfigError, RuntimeConfig};
pub use telemetry::init_tracing;
pub use transport::{LocalTransport, PoolExecutor};
