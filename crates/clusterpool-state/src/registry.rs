//! PoolRegistry — lock-guarded in-memory store for every pooled resource.
//!
//! Reads may run concurrently; any mutation holds the write lock for its
//! whole closure, so a read-modify-write such as "find the first available
//! resource and lock it" is atomic with respect to every other caller.
//! Closures must stay short and must never block on I/O.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::{RegistryError, RegistryResult};
use crate::namer::Namer;
use crate::types::*;

const EVENT_CAPACITY: usize = 1024;

/// Thread-safe resource registry. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct PoolRegistry {
    resources: Arc<RwLock<BTreeMap<ResourceId, Resource>>>,
    events: broadcast::Sender<TransitionEvent>,
    size: usize,
}

impl PoolRegistry {
    /// Create `size` resources in `Creating`, named by `namer`.
    ///
    /// This is the only constructor; the pool never grows or shrinks after it.
    pub fn initialize(size: usize, namer: &dyn Namer) -> RegistryResult<Self> {
        if size == 0 {
            return Err(RegistryError::InvalidConfig(
                "pool size must be at least 1".to_string(),
            ));
        }

        let mut resources = BTreeMap::new();
        for index in 0..size {
            let naming = namer.name(index);
            if resources.contains_key(&naming.id) {
                return Err(RegistryError::InvalidConfig(format!(
                    "namer produced duplicate id {}",
                    naming.id
                )));
            }
            resources.insert(
                naming.id.clone(),
                Resource::new(naming.id, naming.namespace, naming.members),
            );
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        info!(size, "pool registry initialized");
        Ok(Self {
            resources: Arc::new(RwLock::new(resources)),
            events,
            size,
        })
    }

    /// Number of resources; fixed for the registry's lifetime.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Independent copy of one resource.
    pub fn read(&self, id: &str) -> RegistryResult<Resource> {
        self.resources
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Independent copies of every resource, in id order.
    pub fn list(&self) -> Vec<Resource> {
        self.resources.read().values().cloned().collect()
    }

    /// Counts and per-resource statuses taken under a single read lock.
    pub fn snapshot(&self) -> PoolStatus {
        let resources = self.resources.read();
        let mut status = PoolStatus {
            total: resources.len(),
            ..PoolStatus::default()
        };
        for resource in resources.values() {
            match resource.status {
                ResourceStatus::Creating => status.creating += 1,
                ResourceStatus::Available => status.available += 1,
                ResourceStatus::Locked => status.locked += 1,
                ResourceStatus::Resetting => status.resetting += 1,
                ResourceStatus::Error => status.error += 1,
            }
            status.resources.insert(resource.id.clone(), resource.status);
        }
        status
    }

    /// Run `f` under the shared read lock.
    pub fn inspect<R>(&self, f: impl FnOnce(SlotsRef<'_>) -> R) -> R {
        let resources = self.resources.read();
        f(SlotsRef {
            resources: &*resources,
        })
    }

    /// Run `f` under the exclusive write lock.
    ///
    /// All status changes in the system go through [`Slots::transition`]
    /// inside one of these closures.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Slots<'_>) -> R) -> R {
        let mut resources = self.resources.write();
        let mut slots = Slots {
            resources: &mut *resources,
            events: &self.events,
            now: epoch_millis(),
        };
        f(&mut slots)
    }

    /// Apply a single transition and return the updated copy.
    pub fn transition(&self, id: &str, transition: Transition) -> RegistryResult<Resource> {
        self.mutate(|slots| slots.transition(id, transition).cloned())
    }

    /// Subscribe to transition events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.events.subscribe()
    }

    /// Check the session-binding invariants against the current state.
    ///
    /// Returns a description of the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        self.inspect(|slots| {
            let mut locked_sessions = HashSet::new();
            for resource in slots.iter() {
                if resource.status.holds_session() != resource.bound_session.is_some() {
                    return Err(format!(
                        "{} is {} with bound_session {:?}",
                        resource.id, resource.status, resource.bound_session
                    ));
                }
                if resource.status == ResourceStatus::Locked {
                    if let Some(session) = &resource.bound_session {
                        if !locked_sessions.insert(session.as_str()) {
                            return Err(format!("session {session} holds more than one lock"));
                        }
                    }
                }
            }
            Ok(())
        })
    }
}

/// Read-only view of the registry inside [`PoolRegistry::inspect`].
pub struct SlotsRef<'a> {
    resources: &'a BTreeMap<ResourceId, Resource>,
}

impl<'a> SlotsRef<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources.values()
    }

    pub fn get(&self, id: &str) -> Option<&'a Resource> {
        self.resources.get(id)
    }
}

/// Mutable view of the registry inside [`PoolRegistry::mutate`].
///
/// Resources are only exposed by shared reference; status changes must go
/// through [`Slots::transition`].
pub struct Slots<'a> {
    resources: &'a mut BTreeMap<ResourceId, Resource>,
    events: &'a broadcast::Sender<TransitionEvent>,
    now: u64,
}

impl Slots<'_> {
    /// Epoch millis captured when the write lock was taken.
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// First resource (in id order) matching `pred`.
    pub fn find(&self, pred: impl Fn(&Resource) -> bool) -> Option<&Resource> {
        self.resources.values().find(|r| pred(*r))
    }

    /// Validate and apply a transition.
    pub fn transition(&mut self, id: &str, transition: Transition) -> RegistryResult<&Resource> {
        let now = self.now;
        let resource = self
            .resources
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        let to = transition.target();
        let from = resource
            .apply(transition, now)
            .map_err(|from| RegistryError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            })?;

        debug!(resource_id = %id, %from, %to, "resource transition");
        // No subscribers is fine.
        let _ = self.events.send(TransitionEvent {
            id: id.to_string(),
            from,
            to,
            at: now,
        });
        Ok(resource)
    }

    /// Stamp a maintenance check and replace the attention flag.
    ///
    /// Never changes status.
    pub fn record_health_check(
        &mut self,
        id: &str,
        attention: Option<AttentionFlag>,
    ) -> RegistryResult<()> {
        let resource = self
            .resources
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        resource.last_health_check = Some(self.now);
        resource.attention = attention;
        Ok(())
    }
}
