//! Storage layer errors

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound {
        /// Type of entity (wallet, escrow, negotiation)
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// Duplicate entity (idempotency or exclusivity violation)
    #[error("Duplicate entity: {entity_type} with id {id}")]
    Duplicate {
        /// Type of entity
        entity_type: String,
        /// Entity ID or natural key
        id: String,
    },

    /// Optimistic concurrency check failed: someone else wrote first
    #[error("Version conflict on {entity_type} {id}: expected version {expected}, found {found}")]
    VersionConflict {
        /// Type of entity
        entity_type: String,
        /// Entity ID
        id: String,
        /// Version the write was conditioned on
        expected: u64,
        /// Version currently stored
        found: u64,
    },

    /// Lock poisoned by a panicking writer
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// Domain error passthrough
    #[error("Domain error: {0}")]
    Domain(#[from] agora_domain::DomainError),
}

impl StoreError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a duplicate error
    pub fn duplicate(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Duplicate {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a version conflict error
    pub fn conflict(entity_type: impl Into<String>, id: impl Into<String>, expected: u64, found: u64) -> Self {
        Self::VersionConflict {
            entity_type: entity_type.into(),
            id: id.into(),
            expected,
            found,
        }
    }

    /// Check if the failure is a lost optimistic race (worth retrying)
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}
