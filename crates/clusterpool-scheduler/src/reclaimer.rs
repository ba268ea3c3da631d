//! Reclaimer — asynchronous reset-and-return for released clusters.
//!
//! Every reclamation is a tokio task keyed by cluster id. The task calls
//! the external reset once, bounded by a timeout, and then performs exactly
//! one terminal transition: `Resetting → Available` on success or
//! `Resetting → Error` on failure or timeout. Scheduling an id that already
//! has a live task is a no-op.
//!
//! Shutdown closes the reclaimer, waits for outstanding tasks up to a grace
//! period, and moves anything still resetting to `Error` with an
//! `Abandoned` fault so no cluster is left in `Resetting` unattended.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use clusterpool_state::{PoolRegistry, ReclaimFault, ResourceId, ResourceStatus, Transition};

use crate::backend::ClusterResetter;

/// Timing bounds for reclamation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReclaimConfig {
    /// Upper bound on a single reset; exceeding it ends in `ResetTimeout`.
    pub timeout: Duration,
    /// How long shutdown waits for in-flight resets before abandoning them.
    pub shutdown_grace: Duration,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// What [`Reclaimer::schedule`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// A new reclamation task was spawned.
    Started,
    /// A task for this id is already running; nothing was spawned.
    AlreadyRunning,
    /// The cluster is not `Resetting`; nothing to reclaim.
    NotResetting,
    /// The reclaimer is shut down; the cluster was moved to `Error`.
    Abandoned,
}

/// Result of [`Reclaimer::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Reclamations that reached a terminal state during shutdown.
    pub completed: Vec<ResourceId>,
    /// Clusters moved to `Error` because their reset never finished.
    pub abandoned: Vec<ResourceId>,
}

struct ReclaimTask {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    registry: PoolRegistry,
    resetter: Arc<dyn ClusterResetter>,
    config: ReclaimConfig,
    runtime: Handle,
    /// In-flight reclamations: cluster id → task.
    tasks: Mutex<HashMap<ResourceId, ReclaimTask>>,
    generation: AtomicU64,
    closed: AtomicBool,
    idle: Notify,
}

/// Drives released clusters back into the pool. Cloning shares the task map.
#[derive(Clone)]
pub struct Reclaimer {
    inner: Arc<Inner>,
}

impl Reclaimer {
    /// Create a reclaimer that spawns its tasks on `runtime`.
    pub fn new(
        registry: PoolRegistry,
        resetter: Arc<dyn ClusterResetter>,
        config: ReclaimConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                resetter,
                config,
                runtime,
                tasks: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                idle: Notify::new(),
            }),
        }
    }

    pub fn config(&self) -> ReclaimConfig {
        self.inner.config
    }

    /// Whether shutdown has begun.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Start reclaiming `id`, unless a task for it is already running.
    ///
    /// Never blocks on the reset itself.
    pub fn schedule(&self, id: &str) -> ScheduleOutcome {
        // Status is read under the task map lock. A finishing task applies
        // its terminal transition and leaves the map under the same lock,
        // so a live entry always means the cluster is still its to resolve.
        let mut tasks = self.inner.tasks.lock();
        match self.inner.registry.read(id) {
            Ok(resource) if resource.status == ResourceStatus::Resetting => {}
            Ok(resource) => {
                warn!(resource_id = %id, status = %resource.status, "reclamation requested for cluster not resetting");
                return ScheduleOutcome::NotResetting;
            }
            Err(e) => {
                warn!(resource_id = %id, error = %e, "reclamation requested for unknown cluster");
                return ScheduleOutcome::NotResetting;
            }
        }

        if self.is_closed() {
            drop(tasks);
            abandon(&self.inner.registry, id);
            return ScheduleOutcome::Abandoned;
        }

        if let Some(task) = tasks.get(id) {
            if !task.handle.is_finished() {
                debug!(resource_id = %id, "reclamation already in flight");
                return ScheduleOutcome::AlreadyRunning;
            }
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        // Spawned while holding the map lock, so the task cannot forget
        // itself before it has been recorded.
        let handle = self
            .inner
            .runtime
            .spawn(run_reclamation(Arc::clone(&self.inner), id.to_string(), generation));
        tasks.insert(id.to_string(), ReclaimTask { generation, handle });

        info!(resource_id = %id, "reclamation scheduled");
        ScheduleOutcome::Started
    }

    /// Whether a reclamation task for `id` is still running.
    pub fn is_reclaiming(&self, id: &str) -> bool {
        self.inner
            .tasks
            .lock()
            .get(id)
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Ids with a reclamation still in flight, sorted.
    pub fn in_flight(&self) -> Vec<ResourceId> {
        let tasks = self.inner.tasks.lock();
        let mut ids: Vec<_> = tasks
            .iter()
            .filter(|(_, t)| !t.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Wait until no reclamation is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.tasks.lock().is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting work and resolve every outstanding reclamation.
    ///
    /// Tasks get `shutdown_grace` to finish; the rest are aborted and their
    /// clusters recorded as abandoned. Calling this twice is harmless.
    pub async fn shutdown(&self) -> ShutdownReport {
        let drained: Vec<(ResourceId, ReclaimTask)> = {
            let mut tasks = self.inner.tasks.lock();
            // Closed under the registry lock too, so an allocator critical
            // section either completes before shutdown or sees it.
            self.inner
                .registry
                .mutate(|_| self.inner.closed.store(true, Ordering::Release));
            tasks.drain().collect()
        };
        self.inner.idle.notify_waiters();

        info!(outstanding = drained.len(), "reclaimer shutting down");
        let deadline = tokio::time::Instant::now() + self.inner.config.shutdown_grace;
        let mut report = ShutdownReport::default();

        for (id, mut task) in drained {
            match tokio::time::timeout_at(deadline, &mut task.handle).await {
                Ok(Ok(())) => report.completed.push(id),
                Ok(Err(e)) => {
                    error!(resource_id = %id, error = %e, "reclamation task failed");
                    if abandon(&self.inner.registry, &id) {
                        report.abandoned.push(id);
                    } else {
                        report.completed.push(id);
                    }
                }
                Err(_) => {
                    task.handle.abort();
                    let _ = (&mut task.handle).await;
                    if abandon(&self.inner.registry, &id) {
                        report.abandoned.push(id);
                    } else {
                        report.completed.push(id);
                    }
                }
            }
        }

        // Anything still resetting has no task left to resolve it.
        let orphans: Vec<ResourceId> = self.inner.registry.inspect(|slots| {
            slots
                .iter()
                .filter(|r| r.status == ResourceStatus::Resetting)
                .map(|r| r.id.clone())
                .collect()
        });
        for id in orphans {
            if abandon(&self.inner.registry, &id) && !report.abandoned.contains(&id) {
                report.abandoned.push(id);
            }
        }

        report.completed.sort();
        report.abandoned.sort();
        if !report.abandoned.is_empty() {
            warn!(abandoned = ?report.abandoned, "reclamations abandoned at shutdown");
        }
        report
    }
}

impl Inner {
    /// Run `apply` and drop the task entry for `id` (if it still belongs to
    /// `generation`) under one hold of the task map lock.
    fn settle<R>(&self, id: &str, generation: u64, apply: impl FnOnce() -> R) -> R {
        let mut tasks = self.tasks.lock();
        let result = apply();
        if tasks.get(id).is_some_and(|t| t.generation == generation) {
            tasks.remove(id);
        }
        drop(tasks);
        self.idle.notify_waiters();
        result
    }

    fn forget(&self, id: &str, generation: u64) {
        self.settle(id, generation, || ());
    }
}

/// Aborts the wrapped task when dropped, so an aborted reclamation also
/// cancels its in-flight reset.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn run_reclamation(inner: Arc<Inner>, id: ResourceId, generation: u64) {
    let resource = match inner.registry.read(&id) {
        Ok(resource) if resource.status == ResourceStatus::Resetting => resource,
        Ok(resource) => {
            warn!(resource_id = %id, status = %resource.status, "cluster no longer resetting, reset skipped");
            inner.forget(&id, generation);
            return;
        }
        Err(e) => {
            error!(resource_id = %id, error = %e, "cluster vanished before reset");
            inner.forget(&id, generation);
            return;
        }
    };

    debug!(resource_id = %id, "reset starting");
    let mut reset = AbortOnDrop(tokio::spawn(inner.resetter.reset(&resource)));
    let transition = match tokio::time::timeout(inner.config.timeout, &mut reset.0).await {
        Ok(Ok(Ok(()))) => Transition::Restore,
        Ok(Ok(Err(reason))) => Transition::Fail(ReclaimFault::ResetFailed { reason }),
        Ok(Err(e)) => Transition::Fail(ReclaimFault::ResetFailed {
            reason: format!("reset task failed: {e}"),
        }),
        Err(_) => Transition::Fail(ReclaimFault::ResetTimeout {
            after_ms: inner.config.timeout.as_millis() as u64,
        }),
    };

    let outcome = inner.settle(&id, generation, || inner.registry.transition(&id, transition));
    match outcome {
        Ok(resource) if resource.status == ResourceStatus::Available => {
            info!(resource_id = %id, "cluster reclaimed");
        }
        Ok(resource) => {
            let fault = resource.fault.map(|f| f.to_string()).unwrap_or_default();
            error!(resource_id = %id, %fault, "reclamation failed, cluster parked in error");
        }
        Err(e) => {
            error!(resource_id = %id, error = %e, "reclamation could not record its outcome");
        }
    }
}

/// Move `id` from `Resetting` to `Error` as abandoned.
///
/// Returns false if it was no longer resetting.
fn abandon(registry: &PoolRegistry, id: &str) -> bool {
    match registry.transition(id, Transition::Fail(ReclaimFault::Abandoned)) {
        Ok(_) => {
            warn!(resource_id = %id, "reclamation abandoned");
            true
        }
        Err(e) => {
            debug!(resource_id = %id, error = %e, "nothing to abandon");
            false
        }
    }
}
