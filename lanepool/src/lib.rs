//! lanepool: bounded-concurrency lane pools on tokio.
//!
//! - [`QueuePool`]: push items into a bounded FIFO; lanes drain it and each
//!   submitted item gets a [`Completion`].
//! - [`SelfServicePool`]: lanes pull their own items from a [`Supplier`] and
//!   are watched by a [`StallMonitor`].
//! - [`map_concurrent`] / [`for_each_concurrent`]: spread a fixed collection
//!   over N lanes.

mod error;
mod handler;
mod lane;
mod map;
mod monitor;

pub mod queue_pool;
pub mod self_service;
pub mod telemetry;

pub use error::{PoolError, StepError, SubmitError};
pub use handler::{Processor, ProcessorFn, Supplier, SupplierFn, processor_fn, supplier_fn};
pub use lane::{LaneExit, LaneId, LaneReport, PoolId, PoolIdSource};
pub use map::{for_each_concurrent, map_concurrent};
pub use monitor::{StallMonitor, StallThresholds};
pub use queue_pool::{Completion, QueuePool, QueuePoolConfig, QueuePoolStats, Ticket};
pub use self_service::{ErrorHook, SelfServiceConfig, SelfServicePool, SelfServiceStats};
