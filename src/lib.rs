//! Least-loaded work dispatcher.
//!
//! A fixed pool of workers fed by a single control loop that always routes the
//! next task to the worker with the fewest unfinished tasks.
//!
//! # Features
//! - Index-tracking min-heap over the worker roster, `O(log n)` per event
//! - Lock-free ownership: only the control loop touches pending counts
//! - Per-task timeout and producer-side cancellation
//! - Panicking computations are contained in the worker
//! - Snapshot stream for monitoring, graceful shutdown

pub mod balancer;
pub mod config;
pub mod dispatcher;
pub mod errors;
pub mod handle;
pub mod heap;
pub mod logging;
pub mod model;
pub mod worker;
pub mod workload;

pub use balancer::Balancer;
pub use config::Config;
pub use dispatcher::{LoadBalancer, Pool};
pub use errors::{DispatchError, TaskError};
pub use handle::TaskHandle;
pub use model::PoolSnapshot;
