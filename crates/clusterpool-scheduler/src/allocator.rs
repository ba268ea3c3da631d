//! Allocator — synchronous session ↔ cluster binding.
//!
//! `assign` and `release` each run one short critical section on the
//! registry's write lock. Neither waits on I/O; `release` hands the cluster
//! to the reclaimer only after the lock is dropped.

use tracing::{debug, info, warn};

use clusterpool_state::*;

use crate::error::{AllocError, AllocResult};
use crate::reclaimer::{Reclaimer, ScheduleOutcome};

/// Public surface for binding and unbinding sessions.
#[derive(Clone)]
pub struct Allocator {
    registry: PoolRegistry,
    reclaimer: Reclaimer,
}

impl Allocator {
    pub fn new(registry: PoolRegistry, reclaimer: Reclaimer) -> Self {
        Self { registry, reclaimer }
    }

    /// Lock an available cluster to `session`.
    ///
    /// Candidates are scanned in id order; the scan and the flip to `Locked`
    /// happen under one write lock, so concurrent callers never win the same
    /// cluster.
    pub fn assign(&self, session: &str) -> AllocResult<Assignment> {
        if session.is_empty() {
            return Err(AllocError::EmptySession);
        }

        let result = self.registry.mutate(|slots| -> AllocResult<Assignment> {
            self.ensure_open()?;
            if let Some(held) = slots.find(|r| r.is_locked_to(session)) {
                return Err(AllocError::SessionAlreadyBound {
                    session: session.to_string(),
                    resource_id: held.id.clone(),
                });
            }

            let id = slots
                .find(|r| r.status == ResourceStatus::Available)
                .map(|r| r.id.clone())
                .ok_or(AllocError::PoolExhausted {
                    total: slots.iter().count(),
                })?;

            let resource = slots.transition(
                &id,
                Transition::Lock {
                    session: session.to_string(),
                },
            )?;
            Ok(Assignment::from(resource))
        });

        match &result {
            Ok(assignment) => {
                info!(%session, resource_id = %assignment.resource_id, "cluster assigned");
            }
            Err(AllocError::PoolExhausted { total }) => {
                warn!(%session, total, "pool exhausted");
            }
            Err(e) => {
                debug!(%session, error = %e, "assign rejected");
            }
        }
        result
    }

    /// Unbind `session` and start reclaiming its cluster.
    ///
    /// Fails with `SessionNotBound` if the session holds no lock, including
    /// a second release of the same session.
    pub fn release(&self, session: &str) -> AllocResult<ResourceId> {
        let id = self.registry.mutate(|slots| -> AllocResult<ResourceId> {
            self.ensure_open()?;
            let id = slots
                .find(|r| r.is_locked_to(session))
                .map(|r| r.id.clone())
                .ok_or_else(|| AllocError::SessionNotBound(session.to_string()))?;
            slots.transition(&id, Transition::Release)?;
            Ok(id)
        })?;

        info!(%session, resource_id = %id, "cluster released");
        match self.reclaimer.schedule(&id) {
            ScheduleOutcome::Started | ScheduleOutcome::AlreadyRunning => {}
            outcome => warn!(resource_id = %id, ?outcome, "reclamation not started"),
        }
        Ok(id)
    }

    /// Administrative recovery: force `Error` or stuck `Creating` back to
    /// `Available`. Already-available clusters are left as they are.
    pub fn mark_available(&self, id: &str) -> AllocResult<Resource> {
        let resource = self.registry.mutate(|slots| -> AllocResult<Resource> {
            self.ensure_open()?;
            let current = slots
                .get(id)
                .ok_or_else(|| AllocError::NotFound(id.to_string()))?;
            if current.status == ResourceStatus::Available {
                return Ok(current.clone());
            }
            Ok(slots.transition(id, Transition::Recover)?.clone())
        })?;

        info!(resource_id = %id, "cluster marked available");
        Ok(resource)
    }

    /// Copy of one cluster's current state.
    pub fn get(&self, id: &str) -> AllocResult<Resource> {
        Ok(self.registry.read(id)?)
    }

    /// Consistent snapshot of the whole pool.
    pub fn status(&self) -> PoolStatus {
        self.registry.snapshot()
    }

    /// Called inside the registry write lock; shutdown flips the closed
    /// flag under the same lock.
    fn ensure_open(&self) -> AllocResult<()> {
        if self.reclaimer.is_closed() {
            return Err(AllocError::ShuttingDown);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BoxFuture, ClusterResetter};
    use crate::reclaimer::ReclaimConfig;
    use std::sync::Arc;
    use std::time::Duration;

    struct InstantReset;

    impl ClusterResetter for InstantReset {
        fn reset(&self, _resource: &Resource) -> BoxFuture<Result<(), String>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn allocator(size: usize) -> (Allocator, PoolRegistry, Reclaimer) {
        let registry = PoolRegistry::initialize(size, &IndexedNamer::default()).unwrap();
        for i in 1..=size {
            registry
                .transition(&format!("cluster-{i}"), Transition::Confirm)
                .unwrap();
        }
        let reclaimer = Reclaimer::new(
            registry.clone(),
            Arc::new(InstantReset),
            ReclaimConfig {
                timeout: Duration::from_secs(1),
                shutdown_grace: Duration::from_secs(1),
            },
            tokio::runtime::Handle::current(),
        );
        (
            Allocator::new(registry.clone(), reclaimer.clone()),
            registry,
            reclaimer,
        )
    }

    #[tokio::test]
    async fn assign_locks_first_available() {
        let (allocator, registry, _) = allocator(3);
        let assignment = allocator.assign("s1").unwrap();

        assert_eq!(assignment.resource_id, "cluster-1");
        assert_eq!(assignment.namespace, "ns-cluster-1");
        assert_eq!(assignment.status, ResourceStatus::Locked);
        assert_eq!(assignment.members.len(), 2);

        let resource = registry.read("cluster-1").unwrap();
        assert_eq!(resource.bound_session.as_deref(), Some("s1"));
        assert!(resource.locked_at.is_some());

        let status = allocator.status();
        assert_eq!(status.available, 2);
        assert_eq!(status.locked, 1);
    }

    #[tokio::test]
    async fn assign_rejects_second_lock_for_same_session() {
        let (allocator, _, _) = allocator(2);
        allocator.assign("s1").unwrap();

        let err = allocator.assign("s1").unwrap_err();
        assert_eq!(
            err,
            AllocError::SessionAlreadyBound {
                session: "s1".into(),
                resource_id: "cluster-1".into(),
            }
        );
        assert!(err.is_caller_error());
        assert_eq!(allocator.status().locked, 1);
    }

    #[tokio::test]
    async fn assign_rejects_empty_session() {
        let (allocator, _, _) = allocator(1);
        assert_eq!(allocator.assign(""), Err(AllocError::EmptySession));
    }

    #[tokio::test]
    async fn exhausted_pool_fails_without_mutation() {
        let (allocator, _, _) = allocator(2);
        allocator.assign("a").unwrap();
        allocator.assign("b").unwrap();
        let before = allocator.status();

        let err = allocator.assign("s-new").unwrap_err();
        assert_eq!(err, AllocError::PoolExhausted { total: 2 });
        assert!(err.is_retryable());
        assert_eq!(allocator.status(), before);
    }

    #[tokio::test]
    async fn release_moves_to_resetting_and_is_not_idempotent() {
        let (allocator, registry, reclaimer) = allocator(1);
        allocator.assign("s1").unwrap();

        let id = allocator.release("s1").unwrap();
        assert_eq!(id, "cluster-1");
        let resource = registry.read("cluster-1").unwrap();
        assert_eq!(resource.status, ResourceStatus::Resetting);
        assert!(resource.locked_at.is_none());

        let err = allocator.release("s1").unwrap_err();
        assert_eq!(err, AllocError::SessionNotBound("s1".into()));
        assert!(!err.is_retryable());

        reclaimer.wait_idle().await;
        assert_eq!(registry.read("cluster-1").unwrap().status, ResourceStatus::Available);
    }

    #[tokio::test]
    async fn release_unknown_session_changes_nothing() {
        let (allocator, _, _) = allocator(3);
        let before = allocator.status();
        assert_eq!(
            allocator.release("ghost"),
            Err(AllocError::SessionNotBound("ghost".into()))
        );
        assert_eq!(allocator.status(), before);
    }

    #[tokio::test]
    async fn mark_available_rules() {
        let (allocator, registry, _) = allocator(2);

        // Available stays available.
        assert_eq!(
            allocator.mark_available("cluster-2").unwrap().status,
            ResourceStatus::Available
        );

        allocator.assign("s1").unwrap();
        let err = allocator.mark_available("cluster-1").unwrap_err();
        assert!(matches!(
            err,
            AllocError::InvalidTransition {
                from: ResourceStatus::Locked,
                ..
            }
        ));
        assert_eq!(registry.read("cluster-1").unwrap().status, ResourceStatus::Locked);

        assert_eq!(
            allocator.mark_available("cluster-9"),
            Err(AllocError::NotFound("cluster-9".into()))
        );
    }

    #[tokio::test]
    async fn mark_available_recovers_stuck_creating() {
        let registry = PoolRegistry::initialize(1, &IndexedNamer::default()).unwrap();
        let reclaimer = Reclaimer::new(
            registry.clone(),
            Arc::new(InstantReset),
            ReclaimConfig::default(),
            tokio::runtime::Handle::current(),
        );
        let allocator = Allocator::new(registry.clone(), reclaimer);

        assert_eq!(allocator.assign("s1"), Err(AllocError::PoolExhausted { total: 1 }));
        allocator.mark_available("cluster-1").unwrap();
        assert_eq!(allocator.assign("s1").unwrap().resource_id, "cluster-1");
    }

    #[tokio::test]
    async fn operations_fail_after_shutdown() {
        let (allocator, _, reclaimer) = allocator(1);
        allocator.assign("s1").unwrap();
        reclaimer.shutdown().await;
        let before = allocator.status();

        assert_eq!(allocator.assign("s2"), Err(AllocError::ShuttingDown));
        assert_eq!(allocator.release("s1"), Err(AllocError::ShuttingDown));
        assert_eq!(allocator.mark_available("cluster-1"), Err(AllocError::ShuttingDown));
        assert_eq!(allocator.status(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn no_assignment_lands_after_shutdown_returns() {
        let (allocator, registry, reclaimer) = allocator(64);
        let racer = {
            let allocator = allocator.clone();
            tokio::spawn(async move {
                let mut granted = 0;
                for i in 0..64 {
                    match allocator.assign(&format!("s{i}")) {
                        Ok(_) => granted += 1,
                        Err(AllocError::ShuttingDown) => break,
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                    tokio::task::yield_now().await;
                }
                granted
            })
        };

        tokio::task::yield_now().await;
        reclaimer.shutdown().await;
        let locked_at_close = registry.snapshot().locked;

        let granted = racer.await.unwrap();
        assert_eq!(granted, locked_at_close);
        assert_eq!(registry.snapshot().locked, locked_at_close);
    }
}
