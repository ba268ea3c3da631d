//! Deterministic naming for pooled resources.

use serde::{Deserialize, Serialize};

/// Identity handed to the registry for one resource at initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNaming {
    pub id: String,
    pub namespace: String,
    pub members: Vec<String>,
}

/// Derives the identity of the resource at a given index.
///
/// Implementations must be deterministic: the same index always yields the
/// same naming, and distinct indices yield distinct ids.
pub trait Namer: Send + Sync {
    fn name(&self, index: usize) -> ResourceNaming;
}

/// `{prefix}-{n}` ids with one member per configured role.
///
/// Indices are rendered 1-based, so index 0 becomes `cluster-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedNamer {
    pub prefix: String,
    pub members: Vec<String>,
}

impl IndexedNamer {
    pub fn new(prefix: impl Into<String>, members: Vec<String>) -> Self {
        Self {
            prefix: prefix.into(),
            members,
        }
    }
}

impl Default for IndexedNamer {
    fn default() -> Self {
        Self::new(
            "cluster",
            vec!["control-plane".to_string(), "worker".to_string()],
        )
    }
}

impl Namer for IndexedNamer {
    fn name(&self, index: usize) -> ResourceNaming {
        let id = format!("{}-{}", self.prefix, index + 1);
        ResourceNaming {
            namespace: format!("ns-{id}"),
            members: self.members.iter().map(|m| format!("{id}-{m}")).collect(),
            id,
        }
    }
}
