//! Maintenance scheduler — background ticker over the whole registry.
//!
//! Each tick takes the registry's write lock once, evaluates the
//! staleness policy for every resource, stamps `last_health_check`, and
//! releases the lock. Flagged resources are logged for operators.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use clusterpool_state::{AttentionFlag, PoolRegistry, ResourceId};

use crate::checker::StalenessPolicy;

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Resources whose `last_health_check` was stamped.
    pub checked: usize,
    /// Resources flagged for operator attention on this pass.
    pub flagged: Vec<(ResourceId, AttentionFlag)>,
}

/// Periodic health-check bookkeeping for every pooled resource.
pub struct MaintenanceScheduler {
    registry: PoolRegistry,
    policy: StalenessPolicy,
    interval: Duration,
}

impl MaintenanceScheduler {
    /// Create a scheduler; nothing runs until [`spawn`](Self::spawn).
    pub fn new(registry: PoolRegistry, policy: StalenessPolicy, interval: Duration) -> Self {
        Self {
            registry,
            policy,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one maintenance pass.
    ///
    /// Touches bookkeeping fields only; never changes a resource's status.
    pub fn tick(&self) -> TickReport {
        let report = self.registry.mutate(|slots| {
            let now = slots.now();
            let decisions: Vec<(ResourceId, Option<AttentionFlag>)> = slots
                .iter()
                .map(|r| (r.id.clone(), self.policy.evaluate(r, now)))
                .collect();

            let mut report = TickReport::default();
            for (id, flag) in decisions {
                if let Err(e) = slots.record_health_check(&id, flag) {
                    error!(resource_id = %id, error = %e, "failed to record health check");
                    continue;
                }
                report.checked += 1;
                if let Some(flag) = flag {
                    report.flagged.push((id, flag));
                }
            }
            report
        });

        for (id, flag) in &report.flagged {
            warn!(resource_id = %id, ?flag, "resource needs operator attention");
        }
        debug!(checked = report.checked, flagged = report.flagged.len(), "maintenance tick");
        report
    }

    /// Start the ticker on the current tokio runtime.
    pub fn spawn(self) -> MaintenanceHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            self.run(shutdown_rx).await;
        });
        MaintenanceHandle {
            shutdown_tx,
            handle,
        }
    }

    /// Tick until the shutdown signal fires (or its sender is dropped).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "maintenance scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                // Shutdown wins any race with a due tick.
                biased;
                _ = shutdown.changed() => {
                    info!("maintenance scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    self.tick();
                }
            }
        }
    }
}

/// Handle to a running maintenance ticker.
pub struct MaintenanceHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signal shutdown and wait for the ticker to return.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            error!(error = %e, "maintenance task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}
