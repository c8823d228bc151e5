//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the domain.
//! Implementations can be a relational store, in-memory, or mock for testing.
//!
//! # Versioning contract
//!
//! Every mutable entity carries a `version`. Inserts must carry version 0.
//! Updates must carry `stored.version + 1`; anything else is rejected with
//! `StoreError::VersionConflict` and nothing is written.

use crate::error::StoreError;
use agora_domain::{
    Escrow, EscrowId, JobId, Negotiation, NegotiationId, Transaction, UserId, Wallet, WalletId,
};
use async_trait::async_trait;

/// Repository for Wallet entities
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Insert a new wallet (one wallet per owner)
    async fn insert(&self, wallet: &Wallet) -> Result<(), StoreError>;

    /// Find a wallet by ID
    async fn find_by_id(&self, id: WalletId) -> Result<Option<Wallet>, StoreError>;

    /// Find the wallet owned by a user
    async fn find_by_owner(&self, owner_id: UserId) -> Result<Option<Wallet>, StoreError>;

    /// List all wallets
    async fn list(&self) -> Result<Vec<Wallet>, StoreError>;

    /// Atomically write new wallet revisions and append their transactions
    ///
    /// Either every wallet and every transaction is written, or none is.
    /// Fails with `Duplicate` if any transaction's idempotency key is
    /// already recorded.
    async fn commit(&self, wallets: &[Wallet], transactions: &[Transaction]) -> Result<(), StoreError>;
}

/// Repository for Transaction records (append-only, written via `WalletRepository::commit`)
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Load all transactions for a wallet, in append order
    async fn find_by_wallet(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, StoreError>;

    /// Find the transaction recorded under an idempotency key
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>, StoreError>;

    /// Find all transactions sharing a reference (e.g. both legs of a release)
    async fn find_by_reference(&self, reference: &str) -> Result<Vec<Transaction>, StoreError>;
}

/// Repository for Escrow entities
#[async_trait]
pub trait EscrowRepository: Send + Sync {
    /// Insert a new escrow
    ///
    /// Fails with `Duplicate` if a held escrow already exists for the same
    /// (job, seller) pair.
    async fn insert(&self, escrow: &Escrow) -> Result<(), StoreError>;

    /// Update an escrow, conditioned on its version
    async fn update(&self, escrow: &Escrow) -> Result<(), StoreError>;

    /// Find an escrow by ID
    async fn find_by_id(&self, id: EscrowId) -> Result<Option<Escrow>, StoreError>;

    /// Find the held escrow for a (job, seller) pair
    async fn find_held_for(&self, job_id: JobId, seller_id: UserId) -> Result<Option<Escrow>, StoreError>;

    /// Find all escrows for a job
    async fn find_by_job(&self, job_id: JobId) -> Result<Vec<Escrow>, StoreError>;

    /// Remove an escrow (compensation for a hold that never took effect)
    async fn delete(&self, id: EscrowId) -> Result<(), StoreError>;
}

/// Repository for Negotiation entities (offers are stored inline)
#[async_trait]
pub trait NegotiationRepository: Send + Sync {
    /// Insert a new negotiation
    ///
    /// Fails with `Duplicate` if an active negotiation already exists for the
    /// same (job, seller) pair.
    async fn insert(&self, negotiation: &Negotiation) -> Result<(), StoreError>;

    /// Update a negotiation, conditioned on its version
    async fn update(&self, negotiation: &Negotiation) -> Result<(), StoreError>;

    /// Find a negotiation by ID
    async fn find_by_id(&self, id: NegotiationId) -> Result<Option<Negotiation>, StoreError>;

    /// Find the active (pending) negotiation for a (job, seller) pair
    async fn find_active_for(
        &self,
        job_id: JobId,
        seller_id: UserId,
    ) -> Result<Option<Negotiation>, StoreError>;

    /// Find all negotiations for a job, oldest first
    async fn find_by_job(&self, job_id: JobId) -> Result<Vec<Negotiation>, StoreError>;

    /// Find all pending negotiations
    async fn find_pending(&self) -> Result<Vec<Negotiation>, StoreError>;
}

/// Combined store interface
pub trait Store: Send + Sync {
    /// Get wallet repository
    fn wallets(&self) -> &dyn WalletRepository;

    /// Get transaction repository
    fn transactions(&self) -> &dyn TransactionRepository;

    /// Get escrow repository
    fn escrows(&self) -> &dyn EscrowRepository;

    /// Get negotiation repository
    fn negotiations(&self) -> &dyn NegotiationRepository;
}
