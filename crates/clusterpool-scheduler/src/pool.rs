//! ClusterPool — the assembled pool handed to session and API layers.
//!
//! Owns one registry, the allocator and reclaimer built on it, and the
//! optional maintenance ticker. `shutdown` stops maintenance first, then
//! resolves every outstanding reclamation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use clusterpool_health::{MaintenanceHandle, MaintenanceScheduler, StalenessPolicy};
use clusterpool_state::*;

use crate::allocator::Allocator;
use crate::backend::{Bootstrapper, ClusterResetter};
use crate::error::{AllocError, AllocResult};
use crate::reclaimer::{ReclaimConfig, Reclaimer, ShutdownReport};

/// Result of [`ClusterPool::bootstrap`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub confirmed: Vec<ResourceId>,
    /// Clusters left in `Creating`, with the bootstrapper's reason.
    pub failed: Vec<(ResourceId, String)>,
}

/// A fixed pool of clusters with assignment, reclamation and maintenance.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct ClusterPool {
    registry: PoolRegistry,
    allocator: Allocator,
    reclaimer: Reclaimer,
    maintenance: Mutex<Option<MaintenanceHandle>>,
}

impl ClusterPool {
    /// Assemble a pool over `registry`.
    ///
    /// Must be called from within a tokio runtime; reclamation tasks are
    /// spawned on it.
    pub fn new(
        registry: PoolRegistry,
        resetter: Arc<dyn ClusterResetter>,
        config: ReclaimConfig,
    ) -> AllocResult<Self> {
        let runtime = Handle::try_current().map_err(|_| AllocError::NoRuntime)?;
        let reclaimer = Reclaimer::new(registry.clone(), resetter, config, runtime);
        let allocator = Allocator::new(registry.clone(), reclaimer.clone());
        info!(size = registry.len(), "cluster pool assembled");
        Ok(Self {
            registry,
            allocator,
            reclaimer,
            maintenance: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    pub fn reclaimer(&self) -> &Reclaimer {
        &self.reclaimer
    }

    /// Start the maintenance ticker. A running ticker is kept as is, and
    /// nothing starts once shutdown has begun.
    pub fn start_maintenance(&self, policy: StalenessPolicy, interval: Duration) {
        let mut slot = self.maintenance.lock();
        if self.reclaimer.is_closed() {
            warn!("pool is shutting down, maintenance not started");
            return;
        }
        if slot.as_ref().is_some_and(|h| h.is_running()) {
            warn!("maintenance already running");
            return;
        }
        let scheduler = MaintenanceScheduler::new(self.registry.clone(), policy, interval);
        *slot = Some(scheduler.spawn());
    }

    pub fn maintenance_running(&self) -> bool {
        self.maintenance
            .lock()
            .as_ref()
            .is_some_and(|h| h.is_running())
    }

    /// Confirm every `Creating` cluster with `bootstrapper`, concurrently.
    ///
    /// Confirmed clusters become `Available`; failures stay in `Creating`
    /// until a later bootstrap or `mark_available`.
    pub async fn bootstrap(&self, bootstrapper: Arc<dyn Bootstrapper>) -> BootstrapReport {
        let pending: Vec<Resource> = self.registry.inspect(|slots| {
            slots
                .iter()
                .filter(|r| r.status == ResourceStatus::Creating)
                .cloned()
                .collect()
        });

        let mut confirmations = JoinSet::new();
        for resource in pending {
            let confirm = bootstrapper.confirm(&resource);
            confirmations.spawn(async move { (resource.id, confirm.await) });
        }

        let mut report = BootstrapReport::default();
        while let Some(joined) = confirmations.join_next().await {
            match joined {
                Ok((id, Ok(()))) => match self.registry.transition(&id, Transition::Confirm) {
                    Ok(_) => report.confirmed.push(id),
                    Err(e) => {
                        warn!(resource_id = %id, error = %e, "bootstrap confirmation not applied");
                        report.failed.push((id, e.to_string()));
                    }
                },
                Ok((id, Err(reason))) => {
                    error!(resource_id = %id, %reason, "bootstrap failed");
                    report.failed.push((id, reason));
                }
                Err(e) => error!(error = %e, "bootstrap task failed"),
            }
        }

        report.confirmed.sort();
        report.failed.sort();
        info!(
            confirmed = report.confirmed.len(),
            failed = report.failed.len(),
            "bootstrap finished"
        );
        report
    }

    pub fn assign(&self, session: &str) -> AllocResult<Assignment> {
        self.allocator.assign(session)
    }

    pub fn release(&self, session: &str) -> AllocResult<ResourceId> {
        self.allocator.release(session)
    }

    pub fn mark_available(&self, id: &str) -> AllocResult<Resource> {
        self.allocator.mark_available(id)
    }

    pub fn get(&self, id: &str) -> AllocResult<Resource> {
        self.allocator.get(id)
    }

    pub fn status(&self) -> PoolStatus {
        self.allocator.status()
    }

    /// Stop maintenance, then wait for or abandon outstanding reclamations.
    pub async fn shutdown(&self) -> ShutdownReport {
        let maintenance = self.maintenance.lock().take();
        if let Some(handle) = maintenance {
            handle.stop().await;
        }
        let report = self.reclaimer.shutdown().await;
        // A ticker started while the reclaimer was still open.
        let late = self.maintenance.lock().take();
        if let Some(handle) = late {
            handle.stop().await;
        }
        info!(
            completed = report.completed.len(),
            abandoned = report.abandoned.len(),
            "cluster pool shut down"
        );
        report
    }
}
