//! clusterpool-health — periodic maintenance for the resource pool.
//!
//! Runs a single background ticker, independent of the allocation path,
//! that stamps every resource's `last_health_check` and raises
//! operator-attention flags for resources that look stale.
//!
//! # Architecture
//!
//! ```text
//! MaintenanceScheduler
//!   ├── StalenessPolicy (pure: resource + now → Option<AttentionFlag>)
//!   ├── tick()  one exclusive registry pass
//!   └── spawn() → MaintenanceHandle (watch shutdown + JoinHandle)
//! ```
//!
//! The ticker never changes a resource's status; flags are advisory and
//! surfaced through logs and `GET /api/v1/clusters/{id}`.

pub mod checker;
pub mod monitor;

pub use checker::{parse_duration, StalenessPolicy};
pub use monitor::{MaintenanceHandle, MaintenanceScheduler, TickReport};
