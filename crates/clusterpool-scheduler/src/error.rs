//! Allocator error types.

use thiserror::Error;

use clusterpool_state::{RegistryError, ResourceStatus};

/// Errors returned synchronously by pool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("no cluster available (pool of {total} fully in use)")]
    PoolExhausted { total: usize },

    #[error("session is not bound to any cluster: {0}")]
    SessionNotBound(String),

    #[error("session {session} already holds {resource_id}")]
    SessionAlreadyBound { session: String, resource_id: String },

    #[error("session id must not be empty")]
    EmptySession,

    #[error("cluster not found: {0}")]
    NotFound(String),

    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ResourceStatus,
        to: ResourceStatus,
    },

    #[error("pool is shutting down")]
    ShuttingDown,

    #[error("no tokio runtime available to run reclamation tasks")]
    NoRuntime,

    #[error("registry error: {0}")]
    Registry(RegistryError),
}

impl AllocError {
    /// Capacity errors a caller can retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocError::PoolExhausted { .. })
    }

    /// Errors caused by the caller's own request.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            AllocError::SessionNotBound(_)
                | AllocError::SessionAlreadyBound { .. }
                | AllocError::EmptySession
                | AllocError::NotFound(_)
                | AllocError::InvalidTransition { .. }
        )
    }
}

impl From<RegistryError> for AllocError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(id) => AllocError::NotFound(id),
            RegistryError::InvalidTransition { id, from, to } => {
                AllocError::InvalidTransition { id, from, to }
            }
            other => AllocError::Registry(other),
        }
    }
}

pub type AllocResult<T> = Result<T, AllocError>;
