//! Ledger error types.

use agora_domain::{DomainError, WalletId};
use agora_store::StoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Limit violation, invalid amount or invalid transition
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Wallet does not exist
    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    /// No wallet registered for the owner
    #[error("No wallet for owner {0}")]
    OwnerHasNoWallet(uuid::Uuid),

    /// Lost the optimistic race on a wallet revision
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store error
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl LedgerError {
    /// Check if the error is a transient write conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => LedgerError::Conflict(err.to_string()),
            StoreError::Domain(e) => LedgerError::Domain(e),
            other => LedgerError::Store(other),
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
