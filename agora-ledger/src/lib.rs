//! Agora Ledger Layer
//!
//! The wallet ledger: the only writer of balances, escrow balances and
//! spending counters. Every movement is recorded as an immutable
//! `Transaction`, so any wallet can be audited by replaying its log.
//!
//! # Components
//!
//! - **WalletLedger**: deposit, withdraw, hold, release, refund, daily reset
//! - **Idempotency**: deterministic keys so replays apply nothing
//! - **Audit**: replay a wallet's transaction log from zero

#![warn(clippy::all)]

pub mod audit;
pub mod error;
pub mod idempotency;
pub mod ledger;

// Re-exports for convenience
pub use audit::AuditReport;
pub use error::{LedgerError, LedgerResult};
pub use idempotency::ledger_key;
pub use ledger::{LedgerReceipt, ReleaseReceipt, WalletLedger};
