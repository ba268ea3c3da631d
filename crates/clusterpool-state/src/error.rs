//! Error types for the resource registry.

use thiserror::Error;

use crate::types::ResourceStatus;

/// Result type alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while reading or mutating the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ResourceStatus,
        to: ResourceStatus,
    },

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}
