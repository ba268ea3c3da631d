//! Domain types for the resource registry.
//!
//! A `Resource` is one pre-built cluster. Its `status` moves through a
//! closed state machine; the allowed edges live in
//! [`ResourceStatus::can_transition_to`] and every change is described by a
//! [`Transition`].

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of a pooled resource (e.g. `cluster-3`).
pub type ResourceId = String;

/// Identifier of the external session holding a resource.
pub type SessionId = String;

// ── Status ─────────────────────────────────────────────────────────

/// Lifecycle status of a pooled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Creating,
    Available,
    Locked,
    Resetting,
    Error,
}

impl ResourceStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [ResourceStatus; 5] = [
        ResourceStatus::Creating,
        ResourceStatus::Available,
        ResourceStatus::Locked,
        ResourceStatus::Resetting,
        ResourceStatus::Error,
    ];

    /// Whether the state machine has an edge from `self` to `next`.
    ///
    /// `Locked → Available` is deliberately absent: every release passes
    /// through `Resetting`.
    pub fn can_transition_to(self, next: ResourceStatus) -> bool {
        use ResourceStatus::*;
        match (self, next) {
            (Creating, Available) => true,
            (Available, Locked) => true,
            (Locked, Resetting) => true,
            (Resetting, Available) | (Resetting, Error) => true,
            (Error, Available) => true,
            (Creating, _) | (Available, _) | (Locked, _) | (Resetting, _) | (Error, _) => false,
        }
    }

    /// Whether a resource in this status carries a bound session.
    pub fn holds_session(self) -> bool {
        matches!(self, ResourceStatus::Locked | ResourceStatus::Resetting)
    }

    /// Lowercase name, as used in JSON and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceStatus::Creating => "creating",
            ResourceStatus::Available => "available",
            ResourceStatus::Locked => "locked",
            ResourceStatus::Resetting => "resetting",
            ResourceStatus::Error => "error",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Faults and flags ───────────────────────────────────────────────

/// Why a reclamation ended in `Error`.
///
/// Recorded on the resource; never returned to the session that released it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReclaimFault {
    #[error("reset failed: {reason}")]
    ResetFailed { reason: String },

    #[error("reset timed out after {after_ms}ms")]
    ResetTimeout { after_ms: u64 },

    #[error("reclamation abandoned at shutdown")]
    Abandoned,
}

/// Operator-attention flag raised by the maintenance ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttentionFlag {
    /// The resource has been locked to one session for too long.
    StaleLock { held_ms: u64 },
    /// The previous health check on this resource is older than allowed.
    StaleHealthCheck { gap_ms: u64 },
}

// ── Resource ───────────────────────────────────────────────────────

/// One pooled cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub namespace: String,
    pub status: ResourceStatus,
    /// Set iff `status` is `Locked` or `Resetting`.
    pub bound_session: Option<SessionId>,
    /// Epoch millis when the current lock was taken.
    pub locked_at: Option<u64>,
    /// Epoch millis of the last successful reclamation.
    pub last_reset: Option<u64>,
    /// Epoch millis of the last maintenance tick that touched this resource.
    pub last_health_check: Option<u64>,
    /// Opaque sub-resource names owned by this resource.
    pub members: Vec<String>,
    /// Last reclamation fault; present while in `Error`.
    pub fault: Option<ReclaimFault>,
    pub attention: Option<AttentionFlag>,
}

impl Resource {
    pub(crate) fn new(id: ResourceId, namespace: String, members: Vec<String>) -> Self {
        Self {
            id,
            namespace,
            status: ResourceStatus::Creating,
            bound_session: None,
            locked_at: None,
            last_reset: None,
            last_health_check: None,
            members,
            fault: None,
            attention: None,
        }
    }

    /// Whether this resource is locked to `session`.
    pub fn is_locked_to(&self, session: &str) -> bool {
        self.status == ResourceStatus::Locked && self.bound_session.as_deref() == Some(session)
    }

    /// Apply a transition, returning the previous status.
    pub(crate) fn apply(&mut self, transition: Transition, now: u64) -> Result<ResourceStatus, ResourceStatus> {
        let from = self.status;
        let to = transition.target();
        if !transition.accepts(from) || !from.can_transition_to(to) {
            return Err(from);
        }

        match transition {
            Transition::Confirm | Transition::Recover => {
                self.bound_session = None;
                self.locked_at = None;
                self.fault = None;
                self.attention = None;
            }
            Transition::Lock { session } => {
                self.bound_session = Some(session);
                self.locked_at = Some(now);
                self.attention = None;
            }
            Transition::Release => {
                // The releasing session stays recorded until reclamation ends.
                self.locked_at = None;
                self.attention = None;
            }
            Transition::Restore => {
                self.bound_session = None;
                self.last_reset = Some(now);
                self.fault = None;
            }
            Transition::Fail(fault) => {
                self.bound_session = None;
                self.fault = Some(fault);
            }
        }
        self.status = to;
        Ok(from)
    }
}

// ── Transitions ────────────────────────────────────────────────────

/// A requested state change, named by its trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// External bootstrap confirmation: `Creating → Available`.
    Confirm,
    /// Allocator assign: `Available → Locked`.
    Lock { session: SessionId },
    /// Allocator release: `Locked → Resetting`.
    Release,
    /// Reclamation success: `Resetting → Available`.
    Restore,
    /// Reclamation failure, timeout or abandonment: `Resetting → Error`.
    Fail(ReclaimFault),
    /// Administrative recovery: `Error | Creating → Available`.
    Recover,
}

impl Transition {
    /// Status the resource ends up in.
    pub fn target(&self) -> ResourceStatus {
        match self {
            Transition::Confirm | Transition::Restore | Transition::Recover => ResourceStatus::Available,
            Transition::Lock { .. } => ResourceStatus::Locked,
            Transition::Release => ResourceStatus::Resetting,
            Transition::Fail(_) => ResourceStatus::Error,
        }
    }

    /// Whether this trigger may fire from `from`.
    fn accepts(&self, from: ResourceStatus) -> bool {
        use ResourceStatus::*;
        match self {
            Transition::Confirm => from == Creating,
            Transition::Lock { .. } => from == Available,
            Transition::Release => from == Locked,
            Transition::Restore | Transition::Fail(_) => from == Resetting,
            Transition::Recover => matches!(from, Error | Creating),
        }
    }
}

/// Emitted on the registry's broadcast channel after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub id: ResourceId,
    pub from: ResourceStatus,
    pub to: ResourceStatus,
    pub at: u64,
}

// ── Views ──────────────────────────────────────────────────────────

/// Point-in-time counts per status plus the per-resource status map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub total: usize,
    pub creating: usize,
    pub available: usize,
    pub locked: usize,
    pub resetting: usize,
    pub error: usize,
    pub resources: BTreeMap<ResourceId, ResourceStatus>,
}

impl PoolStatus {
    /// Count for a single status.
    pub fn count(&self, status: ResourceStatus) -> usize {
        match status {
            ResourceStatus::Creating => self.creating,
            ResourceStatus::Available => self.available,
            ResourceStatus::Locked => self.locked,
            ResourceStatus::Resetting => self.resetting,
            ResourceStatus::Error => self.error,
        }
    }
}

/// What a session receives when a resource is assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub resource_id: ResourceId,
    pub namespace: String,
    pub members: Vec<String>,
    pub status: ResourceStatus,
}

impl From<&Resource> for Assignment {
    fn from(resource: &Resource) -> Self {
        Self {
            resource_id: resource.id.clone(),
            namespace: resource.namespace.clone(),
            members: resource.members.clone(),
            status: resource.status,
        }
    }
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
