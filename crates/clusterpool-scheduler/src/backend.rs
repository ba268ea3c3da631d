//! External collaborators the pool drives but does not implement.

use std::future::Future;
use std::pin::Pin;

use clusterpool_state::Resource;

/// Boxed, sendable future returned by collaborators.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Restores a released cluster to its clean baseline.
///
/// The reclaimer calls `reset` exactly once per reclamation and bounds it
/// with its own timeout; the operation may be aborted when that timeout
/// fires, so it must be safe to run again later.
pub trait ClusterResetter: Send + Sync + 'static {
    fn reset(&self, resource: &Resource) -> BoxFuture<Result<(), String>>;
}

/// Confirms that a freshly provisioned cluster is ready for use.
pub trait Bootstrapper: Send + Sync + 'static {
    fn confirm(&self, resource: &Resource) -> BoxFuture<Result<(), String>>;
}
