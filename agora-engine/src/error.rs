//! Engine error types.
//!
//! The taxonomy callers see. Lower-layer errors are folded into it so that
//! the API layer only has to match on `ErrorKind`.

use agora_domain::{DomainError, EscrowId};
use agora_ledger::LedgerError;
use agora_store::StoreError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during settlement operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or out-of-range input; caller must fix the input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Action attempted on a negotiation or escrow not in the required state
    #[error("State error: {0}")]
    State(String),

    /// Negotiation exhausted its round budget
    #[error("Round limit exceeded: round {round} of {max_rounds}")]
    RoundLimitExceeded {
        /// Current round
        round: u32,
        /// Configured maximum
        max_rounds: u32,
    },

    /// Buyer balance cannot cover the amount
    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance {
        /// Spendable balance
        available: Decimal,
        /// Requested amount
        required: Decimal,
    },

    /// Hold would exceed the daily limit
    #[error("Daily limit exceeded: spent {spent} + requested {requested} > limit {limit}")]
    DailyLimitExceeded {
        /// Already spent today
        spent: Decimal,
        /// Requested amount
        requested: Decimal,
        /// Daily limit
        limit: Decimal,
    },

    /// Hold larger than the per-job limit
    #[error("Per-job limit exceeded: requested {requested} > limit {limit}")]
    PerJobLimitExceeded {
        /// Requested amount
        requested: Decimal,
        /// Per-job limit
        limit: Decimal,
    },

    /// Referenced entity absent
    #[error("{entity_type} not found: {id}")]
    NotFound {
        /// Type of entity
        entity_type: String,
        /// Entity ID
        id: String,
    },

    /// Transient conflict that survived the internal retries
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A compensating action failed; the named escrow needs manual repair
    #[error("Compensation failed for escrow {escrow_id}: {reason}")]
    CompensationFailed {
        /// Escrow left behind
        escrow_id: EscrowId,
        /// Underlying failure
        reason: String,
    },

    /// External collaborator (job registry, event sink) failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Storage failure
    #[error("Store error: {0}")]
    Store(StoreError),
}

/// Coarse error category, stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    State,
    RoundLimitExceeded,
    InsufficientBalance,
    DailyLimitExceeded,
    PerJobLimitExceeded,
    NotFound,
    Conflict,
    Internal,
}

impl EngineError {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::State(_) => ErrorKind::State,
            EngineError::RoundLimitExceeded { .. } => ErrorKind::RoundLimitExceeded,
            EngineError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            EngineError::DailyLimitExceeded { .. } => ErrorKind::DailyLimitExceeded,
            EngineError::PerJobLimitExceeded { .. } => ErrorKind::PerJobLimitExceeded,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::CompensationFailed { .. } | EngineError::Collaborator(_) | EngineError::Store(_) => {
                ErrorKind::Internal
            },
        }
    }

    /// Only transient conflicts are retried internally
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict(_))
    }

    /// Wallet limit violations (surfaced verbatim, never retried)
    pub fn is_limit_violation(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientBalance { .. }
                | EngineError::DailyLimitExceeded { .. }
                | EngineError::PerJobLimitExceeded { .. }
        )
    }
}

impl From<DomainError> for EngineError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::InvalidStateTransition(msg) => EngineError::State(msg),
            DomainError::RoundLimitExceeded { round, max_rounds } => {
                EngineError::RoundLimitExceeded { round, max_rounds }
            },
            DomainError::InsufficientBalance { available, required } => {
                EngineError::InsufficientBalance { available, required }
            },
            DomainError::DailyLimitExceeded { spent, requested, limit } => {
                EngineError::DailyLimitExceeded { spent, requested, limit }
            },
            DomainError::PerJobLimitExceeded { requested, limit } => {
                EngineError::PerJobLimitExceeded { requested, limit }
            },
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity_type, id } => EngineError::NotFound { entity_type, id },
            StoreError::VersionConflict { .. } => EngineError::Conflict(err.to_string()),
            StoreError::Domain(e) => e.into(),
            other => EngineError::Store(other),
        }
    }
}

impl From<LedgerError> for EngineError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Domain(e) => e.into(),
            LedgerError::WalletNotFound(id) => EngineError::not_found("Wallet", id),
            LedgerError::OwnerHasNoWallet(owner) => EngineError::not_found("Wallet for user", owner),
            LedgerError::Conflict(msg) => EngineError::Conflict(msg),
            LedgerError::Store(e) => e.into(),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_domain_errors_map_to_taxonomy() {
        let state: EngineError = DomainError::InvalidStateTransition("done".into()).into();
        assert_eq!(state.kind(), ErrorKind::State);

        let limit: EngineError = DomainError::DailyLimitExceeded {
            spent: dec!(72500),
            requested: dec!(60000),
            limit: dec!(100000),
        }
        .into();
        assert_eq!(limit.kind(), ErrorKind::DailyLimitExceeded);
        assert!(limit.is_limit_violation());
        assert!(!limit.is_retryable());
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        let conflict: EngineError = StoreError::conflict("wallet", "w1", 1, 2).into();
        assert!(conflict.is_retryable());
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let missing: EngineError = StoreError::not_found("escrow", "e1").into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_compensation_failure_is_internal() {
        let error = EngineError::CompensationFailed {
            escrow_id: uuid::Uuid::now_v7(),
            reason: "wallet busy".into(),
        };
        assert_eq!(error.kind(), ErrorKind::Internal);
        assert!(!error.is_retryable());
    }
}
