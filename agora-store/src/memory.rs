//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access. Multi-map writes always
//! take the wallet lock before the transaction lock.

use crate::error::StoreError;
use crate::repository::{
    EscrowRepository, NegotiationRepository, Store, TransactionRepository, WalletRepository,
};
use agora_domain::{
    Escrow, EscrowId, EscrowStatus, JobId, Negotiation, NegotiationId, Transaction, UserId,
    Wallet, WalletId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// In-memory store for testing
pub struct MemoryStore {
    wallets: RwLock<HashMap<WalletId, Wallet>>,
    transactions: RwLock<TransactionLog>,
    escrows: RwLock<HashMap<EscrowId, Escrow>>,
    negotiations: RwLock<HashMap<NegotiationId, Negotiation>>,
}

/// Append-only transaction log with an idempotency index
#[derive(Default)]
struct TransactionLog {
    entries: Vec<Transaction>,
    by_key: HashMap<String, usize>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
}

/// Check `incoming.version == stored.version + 1`
fn check_next_version(entity_type: &str, id: impl ToString, stored: u64, incoming: u64) -> Result<(), StoreError> {
    if incoming != stored + 1 {
        return Err(StoreError::conflict(entity_type, id.to_string(), incoming.saturating_sub(1), stored));
    }
    Ok(())
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            wallets: RwLock::new(HashMap::new()),
            transactions: RwLock::new(TransactionLog::default()),
            escrows: RwLock::new(HashMap::new()),
            negotiations: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of wallets
    pub fn wallet_count(&self) -> usize {
        read(&self.wallets).map(|w| w.len()).unwrap_or_default()
    }

    /// Get the number of transactions
    pub fn transaction_count(&self) -> usize {
        read(&self.transactions).map(|t| t.entries.len()).unwrap_or_default()
    }

    /// Get the number of escrows
    pub fn escrow_count(&self) -> usize {
        read(&self.escrows).map(|e| e.len()).unwrap_or_default()
    }

    /// Get the number of negotiations
    pub fn negotiation_count(&self) -> usize {
        read(&self.negotiations).map(|n| n.len()).unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Wallet Repository Implementation
// =============================================================================

#[async_trait]
impl WalletRepository for MemoryStore {
    async fn insert(&self, wallet: &Wallet) -> Result<(), StoreError> {
        let mut wallets = write(&self.wallets)?;

        if wallets.contains_key(&wallet.id) {
            return Err(StoreError::duplicate("wallet", wallet.id.to_string()));
        }
        if wallets.values().any(|w| w.owner_id == wallet.owner_id) {
            return Err(StoreError::duplicate("wallet", format!("owner {}", wallet.owner_id)));
        }

        wallets.insert(wallet.id, wallet.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: WalletId) -> Result<Option<Wallet>, StoreError> {
        let wallets = read(&self.wallets)?;
        Ok(wallets.get(&id).cloned())
    }

    async fn find_by_owner(&self, owner_id: UserId) -> Result<Option<Wallet>, StoreError> {
        let wallets = read(&self.wallets)?;
        Ok(wallets.values().find(|w| w.owner_id == owner_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Wallet>, StoreError> {
        let wallets = read(&self.wallets)?;
        let mut all: Vec<Wallet> = wallets.values().cloned().collect();
        all.sort_by_key(|w| w.created_at);
        Ok(all)
    }

    async fn commit(&self, updates: &[Wallet], transactions: &[Transaction]) -> Result<(), StoreError> {
        let mut wallets = write(&self.wallets)?;
        let mut log = write(&self.transactions)?;

        // Validate everything before writing anything
        for wallet in updates {
            let stored = wallets
                .get(&wallet.id)
                .ok_or_else(|| StoreError::not_found("wallet", wallet.id.to_string()))?;
            check_next_version("wallet", wallet.id, stored.version, wallet.version)?;
        }
        for tx in transactions {
            if log.by_key.contains_key(&tx.idempotency_key) {
                return Err(StoreError::duplicate("transaction", tx.idempotency_key.clone()));
            }
        }

        for wallet in updates {
            wallets.insert(wallet.id, wallet.clone());
        }
        for tx in transactions {
            let index = log.entries.len();
            log.by_key.insert(tx.idempotency_key.clone(), index);
            log.entries.push(tx.clone());
        }

        Ok(())
    }
}

// =============================================================================
// Transaction Repository Implementation
// =============================================================================

#[async_trait]
impl TransactionRepository for MemoryStore {
    async fn find_by_wallet(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, StoreError> {
        let log = read(&self.transactions)?;
        Ok(log.entries.iter().filter(|t| t.wallet_id == wallet_id).cloned().collect())
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>, StoreError> {
        let log = read(&self.transactions)?;
        Ok(log.by_key.get(key).and_then(|&i| log.entries.get(i)).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Vec<Transaction>, StoreError> {
        let log = read(&self.transactions)?;
        Ok(log.entries.iter().filter(|t| t.reference == reference).cloned().collect())
    }
}

// =============================================================================
// Escrow Repository Implementation
// =============================================================================

#[async_trait]
impl EscrowRepository for MemoryStore {
    async fn insert(&self, escrow: &Escrow) -> Result<(), StoreError> {
        let mut escrows = write(&self.escrows)?;

        if escrows.contains_key(&escrow.id) {
            return Err(StoreError::duplicate("escrow", escrow.id.to_string()));
        }
        let held_exists = escrows.values().any(|e| {
            e.job_id == escrow.job_id
                && e.seller_id == escrow.seller_id
                && e.status == EscrowStatus::Held
        });
        if held_exists && escrow.status == EscrowStatus::Held {
            return Err(StoreError::duplicate(
                "escrow",
                format!("held for job {} seller {}", escrow.job_id, escrow.seller_id),
            ));
        }

        escrows.insert(escrow.id, escrow.clone());
        Ok(())
    }

    async fn update(&self, escrow: &Escrow) -> Result<(), StoreError> {
        let mut escrows = write(&self.escrows)?;

        let stored = escrows
            .get(&escrow.id)
            .ok_or_else(|| StoreError::not_found("escrow", escrow.id.to_string()))?;
        check_next_version("escrow", escrow.id, stored.version, escrow.version)?;

        escrows.insert(escrow.id, escrow.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: EscrowId) -> Result<Option<Escrow>, StoreError> {
        let escrows = read(&self.escrows)?;
        Ok(escrows.get(&id).cloned())
    }

    async fn find_held_for(&self, job_id: JobId, seller_id: UserId) -> Result<Option<Escrow>, StoreError> {
        let escrows = read(&self.escrows)?;
        Ok(escrows
            .values()
            .find(|e| e.job_id == job_id && e.seller_id == seller_id && e.status == EscrowStatus::Held)
            .cloned())
    }

    async fn find_by_job(&self, job_id: JobId) -> Result<Vec<Escrow>, StoreError> {
        let escrows = read(&self.escrows)?;
        let mut found: Vec<Escrow> = escrows.values().filter(|e| e.job_id == job_id).cloned().collect();
        found.sort_by_key(|e| (e.created_at, e.id));
        Ok(found)
    }

    async fn delete(&self, id: EscrowId) -> Result<(), StoreError> {
        let mut escrows = write(&self.escrows)?;
        if escrows.remove(&id).is_some() {
            Ok(())
        } else {
            Err(StoreError::not_found("escrow", id.to_string()))
        }
    }
}

// =============================================================================
// Negotiation Repository Implementation
// =============================================================================

#[async_trait]
impl NegotiationRepository for MemoryStore {
    async fn insert(&self, negotiation: &Negotiation) -> Result<(), StoreError> {
        let mut negotiations = write(&self.negotiations)?;

        if negotiations.contains_key(&negotiation.id) {
            return Err(StoreError::duplicate("negotiation", negotiation.id.to_string()));
        }
        let active_exists = negotiations.values().any(|n| {
            n.job_id == negotiation.job_id && n.seller_id == negotiation.seller_id && n.is_active()
        });
        if active_exists && negotiation.is_active() {
            return Err(StoreError::duplicate(
                "negotiation",
                format!("active for job {} seller {}", negotiation.job_id, negotiation.seller_id),
            ));
        }

        negotiations.insert(negotiation.id, negotiation.clone());
        Ok(())
    }

    async fn update(&self, negotiation: &Negotiation) -> Result<(), StoreError> {
        let mut negotiations = write(&self.negotiations)?;

        let stored = negotiations
            .get(&negotiation.id)
            .ok_or_else(|| StoreError::not_found("negotiation", negotiation.id.to_string()))?;
        check_next_version("negotiation", negotiation.id, stored.version, negotiation.version)?;

        negotiations.insert(negotiation.id, negotiation.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: NegotiationId) -> Result<Option<Negotiation>, StoreError> {
        let negotiations = read(&self.negotiations)?;
        Ok(negotiations.get(&id).cloned())
    }

    async fn find_active_for(
        &self,
        job_id: JobId,
        seller_id: UserId,
    ) -> Result<Option<Negotiation>, StoreError> {
        let negotiations = read(&self.negotiations)?;
        Ok(negotiations
            .values()
            .find(|n| n.job_id == job_id && n.seller_id == seller_id && n.is_active())
            .cloned())
    }

    async fn find_by_job(&self, job_id: JobId) -> Result<Vec<Negotiation>, StoreError> {
        let negotiations = read(&self.negotiations)?;
        let mut found: Vec<Negotiation> =
            negotiations.values().filter(|n| n.job_id == job_id).cloned().collect();
        found.sort_by_key(|n| (n.created_at, n.id));
        Ok(found)
    }

    async fn find_pending(&self) -> Result<Vec<Negotiation>, StoreError> {
        let negotiations = read(&self.negotiations)?;
        let mut found: Vec<Negotiation> =
            negotiations.values().filter(|n| n.is_active()).cloned().collect();
        found.sort_by_key(|n| (n.created_at, n.id));
        Ok(found)
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

impl Store for MemoryStore {
    fn wallets(&self) -> &dyn WalletRepository {
        self
    }

    fn transactions(&self) -> &dyn TransactionRepository {
        self
    }

    fn escrows(&self) -> &dyn EscrowRepository {
        self
    }

    fn negotiations(&self) -> &dyn NegotiationRepository {
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use agora_domain::{
        Currency, Money, NegotiationOffer, OfferDraft, Party, Transaction, TransactionKind,
    };
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn create_test_wallet() -> Wallet {
        Wallet::open(Uuid::now_v7(), Currency::usd(), dec!(100000), dec!(80000)).unwrap()
    }

    fn create_test_negotiation(job_id: JobId, seller_id: UserId) -> Negotiation {
        let draft = OfferDraft {
            price: dec!(1000),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 31).unwrap(),
            payment_schedule: "on completion".to_string(),
            terms: String::new(),
        };
        let offer = NegotiationOffer::from_draft(draft, Party::Buyer, Utc::now()).unwrap();
        Negotiation::open(job_id, Uuid::now_v7(), seller_id, offer, 5, Utc::now()).unwrap()
    }

    fn create_test_escrow(job_id: JobId, seller_id: UserId) -> Escrow {
        Escrow::hold(
            job_id,
            Uuid::now_v7(),
            Uuid::now_v7(),
            seller_id,
            Uuid::now_v7(),
            Uuid::now_v7(),
            Money::new(dec!(500)).unwrap(),
            Currency::usd(),
        )
    }

    fn deposit(wallet: &Wallet, key: &str) -> (Wallet, Transaction) {
        let amount = Money::new(dec!(100)).unwrap();
        let after = wallet.after_deposit(amount);
        let tx = Transaction::record(wallet, &after, TransactionKind::Deposit, amount, "deposit", "ref", key);
        (after, tx)
    }

    // Wallet Repository Tests
    #[tokio::test]
    async fn test_wallet_insert_and_find() {
        let store = MemoryStore::new();
        let wallet = create_test_wallet();

        store.wallets().insert(&wallet).await.unwrap();

        let by_id = store.wallets().find_by_id(wallet.id).await.unwrap();
        assert_eq!(by_id, Some(wallet.clone()));

        let by_owner = store.wallets().find_by_owner(wallet.owner_id).await.unwrap();
        assert_eq!(by_owner.map(|w| w.id), Some(wallet.id));
    }

    #[tokio::test]
    async fn test_wallet_one_per_owner() {
        let store = MemoryStore::new();
        let wallet = create_test_wallet();
        store.wallets().insert(&wallet).await.unwrap();

        let mut second = create_test_wallet();
        second.owner_id = wallet.owner_id;

        let result = store.wallets().insert(&second).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_commit_writes_wallet_and_transaction() {
        let store = MemoryStore::new();
        let wallet = create_test_wallet();
        store.wallets().insert(&wallet).await.unwrap();

        let (after, tx) = deposit(&wallet, "key-1");
        store.wallets().commit(&[after.clone()], &[tx.clone()]).await.unwrap();

        let stored = store.wallets().find_by_id(wallet.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec!(100));
        assert_eq!(stored.version, 1);

        let found = store.transactions().find_by_idempotency_key("key-1").await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(tx.id));
        assert_eq!(store.transactions().find_by_wallet(wallet.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_stale_version_writes_nothing() {
        let store = MemoryStore::new();
        let wallet = create_test_wallet();
        store.wallets().insert(&wallet).await.unwrap();

        let (first, tx1) = deposit(&wallet, "key-1");
        let (second, tx2) = deposit(&wallet, "key-2");

        store.wallets().commit(&[first], &[tx1]).await.unwrap();
        let result = store.wallets().commit(&[second], &[tx2]).await;

        assert!(result.as_ref().unwrap_err().is_conflict());
        assert_eq!(store.transaction_count(), 1);
        let stored = store.wallets().find_by_id(wallet.id).await.unwrap().unwrap();
        assert_eq!(stored.balance, dec!(100));
    }

    #[tokio::test]
    async fn test_commit_duplicate_key_writes_nothing() {
        let store = MemoryStore::new();
        let wallet = create_test_wallet();
        store.wallets().insert(&wallet).await.unwrap();

        let (first, tx1) = deposit(&wallet, "same-key");
        store.wallets().commit(&[first.clone()], &[tx1]).await.unwrap();

        let (second, tx2) = deposit(&first, "same-key");
        let result = store.wallets().commit(&[second], &[tx2]).await;

        assert!(matches!(result, Err(StoreError::Duplicate { .. })));
        let stored = store.wallets().find_by_id(wallet.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_commit_unknown_wallet() {
        let store = MemoryStore::new();
        let wallet = create_test_wallet();
        let (after, tx) = deposit(&wallet, "key");

        let result = store.wallets().commit(&[after], &[tx]).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    // Escrow Repository Tests
    #[tokio::test]
    async fn test_escrow_single_held_per_pair() {
        let store = MemoryStore::new();
        let job_id = Uuid::now_v7();
        let seller_id = Uuid::now_v7();

        store.escrows().insert(&create_test_escrow(job_id, seller_id)).await.unwrap();
        let result = store.escrows().insert(&create_test_escrow(job_id, seller_id)).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));

        // A different seller on the same job is fine
        store.escrows().insert(&create_test_escrow(job_id, Uuid::now_v7())).await.unwrap();
        assert_eq!(store.escrows().find_by_job(job_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_escrow_update_is_version_checked() {
        let store = MemoryStore::new();
        let escrow = create_test_escrow(Uuid::now_v7(), Uuid::now_v7());
        store.escrows().insert(&escrow).await.unwrap();

        let released = escrow.release(Utc::now()).unwrap();
        let refunded = escrow.refund(Utc::now()).unwrap();

        store.escrows().update(&released).await.unwrap();
        let result = store.escrows().update(&refunded).await;
        assert!(result.unwrap_err().is_conflict());

        let held = store.escrows().find_held_for(escrow.job_id, escrow.seller_id).await.unwrap();
        assert!(held.is_none());
    }

    #[tokio::test]
    async fn test_escrow_delete() {
        let store = MemoryStore::new();
        let escrow = create_test_escrow(Uuid::now_v7(), Uuid::now_v7());
        store.escrows().insert(&escrow).await.unwrap();

        store.escrows().delete(escrow.id).await.unwrap();
        assert_eq!(store.escrow_count(), 0);
        assert!(store.escrows().delete(escrow.id).await.is_err());
    }

    // Negotiation Repository Tests
    #[tokio::test]
    async fn test_negotiation_single_active_per_pair() {
        let store = MemoryStore::new();
        let job_id = Uuid::now_v7();
        let seller_id = Uuid::now_v7();

        let first = create_test_negotiation(job_id, seller_id);
        store.negotiations().insert(&first).await.unwrap();

        let second = create_test_negotiation(job_id, seller_id);
        let result = store.negotiations().insert(&second).await;
        assert!(matches!(result, Err(StoreError::Duplicate { .. })));

        // Once the first is terminal the pair is free again
        store.negotiations().update(&first.reject(Utc::now()).unwrap()).await.unwrap();
        store.negotiations().insert(&second).await.unwrap();

        let active = store.negotiations().find_active_for(job_id, seller_id).await.unwrap();
        assert_eq!(active.map(|n| n.id), Some(second.id));
    }

    #[tokio::test]
    async fn test_negotiation_concurrent_writers_one_wins() {
        let store = MemoryStore::new();
        let negotiation = create_test_negotiation(Uuid::now_v7(), Uuid::now_v7());
        store.negotiations().insert(&negotiation).await.unwrap();

        let accepted = negotiation.accept(Utc::now()).unwrap();
        let rejected = negotiation.reject(Utc::now()).unwrap();

        store.negotiations().update(&accepted).await.unwrap();
        assert!(store.negotiations().update(&rejected).await.unwrap_err().is_conflict());

        let pending = store.negotiations().find_pending().await.unwrap();
        assert!(pending.is_empty());
    }
}
