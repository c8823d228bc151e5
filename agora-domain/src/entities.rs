//! Domain Entities for Agora
//!
//! Money-bearing entities with lifecycle management.
//! Every mutation returns a new revision (version + 1) so the store can
//! condition writes on the version it read.

use crate::value_objects::{Currency, DomainError, Money};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a Wallet
pub type WalletId = Uuid;

/// Unique identifier for a user (buyer or seller), asserted by the session layer
pub type UserId = Uuid;

/// Unique identifier for a Job (owned by the external job registry)
pub type JobId = Uuid;

/// Unique identifier for an Escrow
pub type EscrowId = Uuid;

/// Unique identifier for a ledger Transaction
pub type TransactionId = Uuid;

// =============================================================================
// Wallet
// =============================================================================

/// Wallet holds a user's spendable and escrowed funds plus spending limits
///
/// Key invariants:
/// - `balance >= 0` and `escrow_balance >= 0`
/// - `daily_spent <= daily_limit` after every hold
/// - `balance + escrow_balance` only changes through ledger operations,
///   each of which appends a `Transaction`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner_id: UserId,
    pub balance: Decimal,
    pub currency: Currency,
    pub daily_limit: Decimal,
    pub daily_spent: Decimal,
    pub per_job_limit: Decimal,
    pub escrow_balance: Decimal,

    /// Optimistic concurrency revision
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Open an empty wallet
    ///
    /// # Errors
    /// Returns `DomainError::Validation` if either limit is negative
    pub fn open(
        owner_id: UserId,
        currency: Currency,
        daily_limit: Decimal,
        per_job_limit: Decimal,
    ) -> Result<Self, DomainError> {
        if daily_limit < Decimal::ZERO || per_job_limit < Decimal::ZERO {
            return Err(DomainError::Validation("Wallet limits must not be negative".to_string()));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            owner_id,
            balance: Decimal::ZERO,
            currency,
            daily_limit,
            daily_spent: Decimal::ZERO,
            per_job_limit,
            escrow_balance: Decimal::ZERO,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Total funds owned (spendable + escrowed)
    pub fn total_funds(&self) -> Decimal {
        self.balance + self.escrow_balance
    }

    /// Remaining headroom under the daily limit
    pub fn daily_remaining(&self) -> Decimal {
        (self.daily_limit - self.daily_spent).max(Decimal::ZERO)
    }

    /// Check whether a hold of `amount` is allowed
    ///
    /// Checks run in a fixed order: balance, per-job limit, daily limit.
    pub fn check_hold(&self, amount: Money) -> Result<(), DomainError> {
        let amount = amount.as_decimal();

        if self.balance < amount {
            return Err(DomainError::InsufficientBalance {
                available: self.balance,
                required: amount,
            });
        }

        if amount > self.per_job_limit {
            return Err(DomainError::PerJobLimitExceeded {
                requested: amount,
                limit: self.per_job_limit,
            });
        }

        if self.daily_spent + amount > self.daily_limit {
            return Err(DomainError::DailyLimitExceeded {
                spent: self.daily_spent,
                requested: amount,
                limit: self.daily_limit,
            });
        }

        Ok(())
    }

    /// State after crediting `amount` to the spendable balance
    pub fn after_deposit(&self, amount: Money) -> Wallet {
        let mut next = self.next_revision();
        next.balance += amount.as_decimal();
        next
    }

    /// State after withdrawing `amount` from the spendable balance
    pub fn after_withdrawal(&self, amount: Money) -> Result<Wallet, DomainError> {
        let amount = amount.as_decimal();
        if self.balance < amount {
            return Err(DomainError::InsufficientBalance {
                available: self.balance,
                required: amount,
            });
        }

        let mut next = self.next_revision();
        next.balance -= amount;
        Ok(next)
    }

    /// State after moving `amount` from balance into escrow
    pub fn after_hold(&self, amount: Money) -> Result<Wallet, DomainError> {
        self.check_hold(amount)?;

        let amount = amount.as_decimal();
        let mut next = self.next_revision();
        next.balance -= amount;
        next.escrow_balance += amount;
        next.daily_spent += amount;
        Ok(next)
    }

    /// Payer side of a release: escrowed funds leave the wallet
    pub fn after_release_debit(&self, amount: Money) -> Result<Wallet, DomainError> {
        let amount = amount.as_decimal();
        if self.escrow_balance < amount {
            return Err(DomainError::InvalidStateTransition(format!(
                "Escrow balance {} cannot cover release of {}",
                self.escrow_balance, amount
            )));
        }

        let mut next = self.next_revision();
        next.escrow_balance -= amount;
        Ok(next)
    }

    /// Payee side of a release: funds land in the spendable balance
    pub fn after_release_credit(&self, amount: Money) -> Wallet {
        let mut next = self.next_revision();
        next.balance += amount.as_decimal();
        next
    }

    /// Reverse a hold: escrowed funds return to balance and daily spend is restored
    ///
    /// `daily_spent` is floored at zero since a day rollover may already have cleared it.
    pub fn after_refund(&self, amount: Money) -> Result<Wallet, DomainError> {
        let amount = amount.as_decimal();
        if self.escrow_balance < amount {
            return Err(DomainError::InvalidStateTransition(format!(
                "Escrow balance {} cannot cover refund of {}",
                self.escrow_balance, amount
            )));
        }

        let mut next = self.next_revision();
        next.escrow_balance -= amount;
        next.balance += amount;
        next.daily_spent = (next.daily_spent - amount).max(Decimal::ZERO);
        Ok(next)
    }

    /// State after a day rollover
    pub fn after_daily_reset(&self) -> Wallet {
        let mut next = self.next_revision();
        next.daily_spent = Decimal::ZERO;
        next
    }

    fn next_revision(&self) -> Wallet {
        let mut next = self.clone();
        next.version += 1;
        next.updated_at = Utc::now();
        next
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Kind of ledger movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// External funds credited
    Deposit,
    /// Funds paid out of the wallet
    Withdrawal,
    /// Balance moved into escrow
    EscrowHold,
    /// Escrowed funds paid to the seller (one record per wallet leg)
    EscrowRelease,
    /// Escrowed funds returned to the buyer
    EscrowRefund,
}

impl TransactionKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::EscrowHold => "escrow_hold",
            TransactionKind::EscrowRelease => "escrow_release",
            TransactionKind::EscrowRefund => "escrow_refund",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable, append-only ledger record
///
/// Deltas are derived from the wallet revisions before and after the
/// operation, so folding `balance_delta` / `escrow_delta` over a wallet's
/// transactions always reproduces its stored balances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_delta: Decimal,
    pub escrow_delta: Decimal,
    pub resulting_balance: Decimal,
    pub resulting_escrow_balance: Decimal,
    pub description: String,
    /// Escrow id or external reference the movement belongs to
    pub reference: String,
    /// Replay guard: one effect per key
    pub idempotency_key: String,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Record the movement between two revisions of the same wallet
    pub fn record(
        before: &Wallet,
        after: &Wallet,
        kind: TransactionKind,
        amount: Money,
        description: impl Into<String>,
        reference: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            wallet_id: after.id,
            kind,
            amount: amount.as_decimal(),
            balance_delta: after.balance - before.balance,
            escrow_delta: after.escrow_balance - before.escrow_balance,
            resulting_balance: after.balance,
            resulting_escrow_balance: after.escrow_balance,
            description: description.into(),
            reference: reference.into(),
            idempotency_key: idempotency_key.into(),
            timestamp: after.updated_at,
        }
    }
}

// =============================================================================
// Escrow
// =============================================================================

/// Escrow lifecycle: `Held` is the only non-terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowStatus {
    /// Funds held from the buyer
    Held,
    /// Funds paid out to the seller
    Released,
    /// Funds returned to the buyer
    Refunded,
}

impl EscrowStatus {
    /// Check if the escrow is resolved
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EscrowStatus::Held)
    }

    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            EscrowStatus::Held => "held",
            EscrowStatus::Released => "released",
            EscrowStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Funds earmarked from a buyer's wallet for one (job, seller) deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Escrow {
    pub id: EscrowId,
    pub job_id: JobId,
    pub negotiation_id: Uuid,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub buyer_wallet_id: WalletId,
    pub seller_wallet_id: WalletId,
    pub amount: Money,
    pub currency: Currency,
    pub status: EscrowStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Escrow {
    /// Create a new escrow in `Held` state
    #[allow(clippy::too_many_arguments)]
    pub fn hold(
        job_id: JobId,
        negotiation_id: Uuid,
        buyer_id: UserId,
        seller_id: UserId,
        buyer_wallet_id: WalletId,
        seller_wallet_id: WalletId,
        amount: Money,
        currency: Currency,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_id,
            negotiation_id,
            buyer_id,
            seller_id,
            buyer_wallet_id,
            seller_wallet_id,
            amount,
            currency,
            status: EscrowStatus::Held,
            version: 0,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Transition `Held -> Released`
    pub fn release(&self, now: DateTime<Utc>) -> Result<Escrow, DomainError> {
        self.resolve(EscrowStatus::Released, now)
    }

    /// Transition `Held -> Refunded`
    pub fn refund(&self, now: DateTime<Utc>) -> Result<Escrow, DomainError> {
        self.resolve(EscrowStatus::Refunded, now)
    }

    fn resolve(&self, status: EscrowStatus, now: DateTime<Utc>) -> Result<Escrow, DomainError> {
        if self.status != EscrowStatus::Held {
            return Err(DomainError::InvalidStateTransition(format!(
                "Escrow {} is {}, expected held",
                self.id, self.status
            )));
        }

        let mut next = self.clone();
        next.status = status;
        next.resolved_at = Some(now);
        next.version += 1;
        Ok(next)
    }
}

// =============================================================================
// Job (external, read-only to the core)
// =============================================================================

/// Job lifecycle as reported by the job registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepting negotiations
    Open,
    /// A deal was accepted
    InProgress,
    /// Work delivered and paid
    Completed,
    /// Withdrawn by the buyer
    Cancelled,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Open => write!(f, "open"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Job metadata supplied by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub buyer_id: UserId,
    pub title: String,
    pub budget: Decimal,
    pub currency: Currency,
    pub deadline: DateTime<Utc>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a new open job
    pub fn new(
        buyer_id: UserId,
        title: impl Into<String>,
        budget: Decimal,
        currency: Currency,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            buyer_id,
            title: title.into(),
            budget,
            currency,
            deadline,
            status: JobStatus::Open,
            created_at: Utc::now(),
        }
    }

    /// Check if the job deadline has passed at `now`
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

// =============================================================================
// Tests
// =============================================================================
