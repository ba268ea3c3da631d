//! Simulated cluster backend.
//!
//! Stands in for real provisioning: bootstrap and reset both succeed after
//! a fixed delay. Clusters whose id is listed in `failing` fail their reset,
//! which exercises the `Error` path end to end.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info};

use clusterpool_scheduler::{BoxFuture, Bootstrapper, ClusterResetter};
use clusterpool_state::Resource;

#[derive(Debug, Clone, Default)]
pub struct SimulatedBackend {
    bootstrap_delay: Duration,
    reset_delay: Duration,
    failing: HashSet<String>,
}

impl SimulatedBackend {
    pub fn new(bootstrap_delay: Duration, reset_delay: Duration) -> Self {
        Self {
            bootstrap_delay,
            reset_delay,
            failing: HashSet::new(),
        }
    }

    /// Make resets of `id` fail.
    pub fn with_failing_reset(mut self, id: impl Into<String>) -> Self {
        self.failing.insert(id.into());
        self
    }
}

impl Bootstrapper for SimulatedBackend {
    fn confirm(&self, resource: &Resource) -> BoxFuture<Result<(), String>> {
        let id = resource.id.clone();
        let members = resource.members.len();
        let delay = self.bootstrap_delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            info!(resource_id = %id, members, "simulated cluster ready");
            Ok(())
        })
    }
}

impl ClusterResetter for SimulatedBackend {
    fn reset(&self, resource: &Resource) -> BoxFuture<Result<(), String>> {
        let id = resource.id.clone();
        let namespace = resource.namespace.clone();
        let fail = self.failing.contains(&id);
        let delay = self.reset_delay;
        Box::pin(async move {
            debug!(resource_id = %id, %namespace, "wiping namespace");
            tokio::time::sleep(delay).await;
            if fail {
                return Err(format!("namespace {namespace} stuck terminating"));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterpool_state::{IndexedNamer, PoolRegistry};

    fn first_resource() -> Resource {
        let registry = PoolRegistry::initialize(1, &IndexedNamer::default()).unwrap();
        registry.read("cluster-1").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn reset_waits_for_delay() {
        let backend = SimulatedBackend::new(Duration::ZERO, Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        backend.reset(&first_resource()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_reset_reports_namespace() {
        let backend = SimulatedBackend::default().with_failing_reset("cluster-1");
        let err = backend.reset(&first_resource()).await.unwrap_err();
        assert!(err.contains("ns-cluster-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn bootstrap_always_confirms() {
        let backend = SimulatedBackend::new(Duration::from_millis(100), Duration::ZERO);
        assert!(backend.confirm(&first_resource()).await.is_ok());
    }
}
