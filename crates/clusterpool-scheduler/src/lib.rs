//! clusterpool-scheduler — binds sessions to pooled clusters.
//!
//! Sessions ask the [`Allocator`] for a cluster and give it back when they
//! are done. A released cluster is handed to the [`Reclaimer`], which runs
//! the external reset in the background and returns the cluster to the pool
//! (or parks it in `Error`). [`ClusterPool`] wires both together with the
//! maintenance ticker and owns the shutdown sequence.
//!
//! # Architecture
//!
//! ```text
//! ClusterPool
//!   ├── PoolRegistry (shared state, from clusterpool-state)
//!   ├── Allocator   assign / release / mark_available (synchronous)
//!   ├── Reclaimer   id → JoinHandle map, one reset task per cluster
//!   │     └── ClusterResetter (external reset operation)
//!   └── MaintenanceHandle (from clusterpool-health)
//! ```

pub mod allocator;
pub mod backend;
pub mod error;
pub mod pool;
pub mod reclaimer;

pub use allocator::Allocator;
pub use backend::{BoxFuture, Bootstrapper, ClusterResetter};
pub use error::{AllocError, AllocResult};
pub use pool::{BootstrapReport, ClusterPool};
pub use reclaimer::{ReclaimConfig, Reclaimer, ScheduleOutcome, ShutdownReport};
