//! WalletLedger: the only component allowed to mutate money state.
//!
//! # Guarantees
//!
//! - Every mutation runs under the wallet's lock (two wallets for a release,
//!   taken in ascending id order).
//! - Wallet revisions and their transactions are committed in one store call,
//!   conditioned on the versions read. A lost race is retried with backoff and
//!   then surfaced as `LedgerError::Conflict`.
//! - Each movement carries an idempotency key derived from
//!   (kind, wallet, reference). Replaying a recorded key applies nothing and
//!   returns the original transaction.

use std::sync::Arc;

use agora_domain::{
    Currency, DomainError, Money, Transaction, TransactionKind, UserId, Wallet, WalletId,
};
use agora_store::{KeyedLocks, RetryPolicy, Store};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::AuditReport;
use crate::error::{LedgerError, LedgerResult};
use crate::idempotency::ledger_key;

// =============================================================================
// Receipts
// =============================================================================

/// Result of a single-wallet ledger operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerReceipt {
    /// Wallet state after the operation
    pub wallet: Wallet,
    /// The transaction recording the movement
    pub transaction: Transaction,
    /// True if this call replayed an already-applied operation
    pub replayed: bool,
}

/// Result of a release, one leg per wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseReceipt {
    /// Payer leg: escrow balance debited
    pub payer: LedgerReceipt,
    /// Payee leg: balance credited
    pub payee: LedgerReceipt,
}

/// One wallet's part of a commit
struct Leg {
    before: Wallet,
    after: Wallet,
    kind: TransactionKind,
    description: String,
    key: String,
}

// =============================================================================
// WalletLedger
// =============================================================================

/// Owns wallet balances, escrow balances and spending limits.
pub struct WalletLedger<S: Store> {
    store: Arc<S>,
    locks: KeyedLocks<WalletId>,
    retry: RetryPolicy,
}

impl<S: Store> WalletLedger<S> {
    /// Create a new ledger over a store.
    pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            retry,
        }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Get a wallet by id.
    pub async fn get_wallet(&self, wallet_id: WalletId) -> LedgerResult<Wallet> {
        self.store
            .wallets()
            .find_by_id(wallet_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(wallet_id))
    }

    /// Get the wallet owned by a user.
    pub async fn wallet_for_owner(&self, owner_id: UserId) -> LedgerResult<Wallet> {
        self.store
            .wallets()
            .find_by_owner(owner_id)
            .await?
            .ok_or(LedgerError::OwnerHasNoWallet(owner_id))
    }

    /// All transactions of a wallet, in append order.
    pub async fn transactions(&self, wallet_id: WalletId) -> LedgerResult<Vec<Transaction>> {
        self.get_wallet(wallet_id).await?;
        Ok(self.store.transactions().find_by_wallet(wallet_id).await?)
    }

    /// Replay a wallet's transaction log and compare with its stored balances.
    pub async fn audit(&self, wallet_id: WalletId) -> LedgerResult<AuditReport> {
        let _guard = self.locks.lock(wallet_id).await;

        let wallet = self.get_wallet(wallet_id).await?;
        let transactions = self.store.transactions().find_by_wallet(wallet_id).await?;
        let report = AuditReport::replay(&wallet, &transactions);

        if !report.is_consistent() {
            warn!(
                %wallet_id,
                stored = %report.stored_balance,
                replayed = %report.replayed_balance,
                stored_escrow = %report.stored_escrow_balance,
                replayed_escrow = %report.replayed_escrow_balance,
                "Ledger audit mismatch"
            );
        }

        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Wallet lifecycle
    // -------------------------------------------------------------------------

    /// Open an empty wallet for a user (one per owner).
    pub async fn open_wallet(
        &self,
        owner_id: UserId,
        currency: Currency,
        daily_limit: Decimal,
        per_job_limit: Decimal,
    ) -> LedgerResult<Wallet> {
        let wallet = Wallet::open(owner_id, currency, daily_limit, per_job_limit)?;

        self.store.wallets().insert(&wallet).await.map_err(|e| match e {
            agora_store::StoreError::Duplicate { .. } => LedgerError::Domain(DomainError::Validation(
                format!("User {} already has a wallet", owner_id),
            )),
            other => other.into(),
        })?;

        info!(wallet_id = %wallet.id, %owner_id, currency = %wallet.currency, "Wallet opened");
        Ok(wallet)
    }

    // -------------------------------------------------------------------------
    // Money movements
    // -------------------------------------------------------------------------

    /// Credit external funds to a wallet.
    pub async fn deposit(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        reference: &str,
    ) -> LedgerResult<LedgerReceipt> {
        let amount = Money::new(amount)?;
        self.apply(wallet_id, TransactionKind::Deposit, amount, reference, "Deposit to wallet".to_string(), |w| {
            Ok(w.after_deposit(amount))
        })
        .await
    }

    /// Pay funds out of a wallet. Does not count toward the daily limit.
    pub async fn withdraw(
        &self,
        wallet_id: WalletId,
        amount: Decimal,
        reference: &str,
    ) -> LedgerResult<LedgerReceipt> {
        let amount = Money::new(amount)?;
        self.apply(
            wallet_id,
            TransactionKind::Withdrawal,
            amount,
            reference,
            "Withdrawal from wallet".to_string(),
            |w| w.after_withdrawal(amount),
        )
        .await
    }

    /// Move funds from a buyer's balance into escrow.
    ///
    /// # Errors
    /// `InsufficientBalance`, `PerJobLimitExceeded` or `DailyLimitExceeded`
    /// (checked in that order); the wallet is untouched on failure.
    pub async fn hold(&self, wallet_id: WalletId, amount: Money, reference: &str) -> LedgerResult<LedgerReceipt> {
        self.apply(
            wallet_id,
            TransactionKind::EscrowHold,
            amount,
            reference,
            format!("Escrow hold for {}", reference),
            |w| w.after_hold(amount),
        )
        .await
    }

    /// Return escrowed funds to the buyer and restore daily headroom.
    pub async fn refund_hold(
        &self,
        wallet_id: WalletId,
        amount: Money,
        reference: &str,
    ) -> LedgerResult<LedgerReceipt> {
        self.apply(
            wallet_id,
            TransactionKind::EscrowRefund,
            amount,
            reference,
            format!("Escrow refund for {}", reference),
            |w| w.after_refund(amount),
        )
        .await
    }

    /// Pay escrowed funds from the payer's escrow balance to the payee's balance.
    ///
    /// The payer's spendable balance and the payee's escrow balance are not
    /// touched. Both legs commit together.
    pub async fn release(
        &self,
        payer_wallet_id: WalletId,
        payee_wallet_id: WalletId,
        amount: Money,
        reference: &str,
    ) -> LedgerResult<ReleaseReceipt> {
        if payer_wallet_id == payee_wallet_id {
            return Err(DomainError::Validation("Cannot release escrow to the paying wallet".to_string()).into());
        }

        let _guards = self.locks.lock_all(&[payer_wallet_id, payee_wallet_id]).await;

        let payer_key = ledger_key(TransactionKind::EscrowRelease, payer_wallet_id, reference);
        let payee_key = ledger_key(TransactionKind::EscrowRelease, payee_wallet_id, reference);

        self.retry
            .run("escrow_release", LedgerError::is_conflict, || {
                self.try_release(payer_wallet_id, payee_wallet_id, amount, reference, &payer_key, &payee_key)
            })
            .await
    }

    /// Zero `daily_spent` on every wallet (day rollover).
    ///
    /// Balances do not change, so no transaction is appended.
    /// Returns the number of wallets reset.
    pub async fn reset_daily_spent(&self) -> LedgerResult<usize> {
        let wallets = self.store.wallets().list().await?;
        let mut reset = 0;

        for candidate in wallets.into_iter().filter(|w| w.daily_spent > Decimal::ZERO) {
            let _guard = self.locks.lock(candidate.id).await;

            let done = self
                .retry
                .run("daily_reset", LedgerError::is_conflict, || self.try_reset(candidate.id))
                .await?;
            if done {
                reset += 1;
            }
        }

        info!(wallets = reset, "Daily spending reset");
        Ok(reset)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn apply<F>(
        &self,
        wallet_id: WalletId,
        kind: TransactionKind,
        amount: Money,
        reference: &str,
        description: String,
        transition: F,
    ) -> LedgerResult<LedgerReceipt>
    where
        F: Fn(&Wallet) -> Result<Wallet, DomainError>,
    {
        let key = ledger_key(kind, wallet_id, reference);
        let _guard = self.locks.lock(wallet_id).await;

        let result = self
            .retry
            .run(kind.as_str(), LedgerError::is_conflict, || {
                self.try_apply(wallet_id, kind, amount, reference, &description, &key, &transition)
            })
            .await;

        match &result {
            Ok(receipt) if receipt.replayed => {
                debug!(%wallet_id, %kind, reference, "Ledger operation replayed");
            },
            Ok(receipt) => {
                info!(
                    %wallet_id,
                    %kind,
                    amount = %amount,
                    balance = %receipt.wallet.balance,
                    escrow_balance = %receipt.wallet.escrow_balance,
                    daily_spent = %receipt.wallet.daily_spent,
                    "Ledger operation applied"
                );
            },
            Err(e) => {
                warn!(%wallet_id, %kind, amount = %amount, error = %e, "Ledger operation rejected");
            },
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn try_apply<F>(
        &self,
        wallet_id: WalletId,
        kind: TransactionKind,
        amount: Money,
        reference: &str,
        description: &str,
        key: &str,
        transition: &F,
    ) -> LedgerResult<LedgerReceipt>
    where
        F: Fn(&Wallet) -> Result<Wallet, DomainError>,
    {
        if let Some(transaction) = self.store.transactions().find_by_idempotency_key(key).await? {
            ensure_same_intent(&transaction, kind, amount, reference)?;
            let wallet = self.get_wallet(wallet_id).await?;
            return Ok(LedgerReceipt {
                wallet,
                transaction,
                replayed: true,
            });
        }

        let before = self.get_wallet(wallet_id).await?;
        let after = transition(&before)?;
        let leg = Leg {
            before,
            after,
            kind,
            description: description.to_string(),
            key: key.to_string(),
        };

        let mut receipts = self.commit(vec![leg], amount, reference).await?;
        receipts.pop().ok_or_else(|| LedgerError::Conflict("empty commit".to_string()))
    }

    async fn try_release(
        &self,
        payer_wallet_id: WalletId,
        payee_wallet_id: WalletId,
        amount: Money,
        reference: &str,
        payer_key: &str,
        payee_key: &str,
    ) -> LedgerResult<ReleaseReceipt> {
        let transactions = self.store.transactions();
        if let (Some(payer_tx), Some(payee_tx)) = (
            transactions.find_by_idempotency_key(payer_key).await?,
            transactions.find_by_idempotency_key(payee_key).await?,
        ) {
            ensure_same_intent(&payer_tx, TransactionKind::EscrowRelease, amount, reference)?;
            ensure_same_intent(&payee_tx, TransactionKind::EscrowRelease, amount, reference)?;
            debug!(%payer_wallet_id, %payee_wallet_id, reference, "Release replayed");
            return Ok(ReleaseReceipt {
                payer: LedgerReceipt {
                    wallet: self.get_wallet(payer_wallet_id).await?,
                    transaction: payer_tx,
                    replayed: true,
                },
                payee: LedgerReceipt {
                    wallet: self.get_wallet(payee_wallet_id).await?,
                    transaction: payee_tx,
                    replayed: true,
                },
            });
        }

        let payer = self.get_wallet(payer_wallet_id).await?;
        let payee = self.get_wallet(payee_wallet_id).await?;

        if payer.currency != payee.currency {
            return Err(DomainError::Validation(format!(
                "Currency mismatch: payer holds {}, payee holds {}",
                payer.currency, payee.currency
            ))
            .into());
        }

        let debited = payer.after_release_debit(amount)?;
        let credited = payee.after_release_credit(amount);

        let legs = vec![
            Leg {
                before: payer,
                after: debited,
                kind: TransactionKind::EscrowRelease,
                description: format!("Escrow release for {}", reference),
                key: payer_key.to_string(),
            },
            Leg {
                before: payee,
                after: credited,
                kind: TransactionKind::EscrowRelease,
                description: format!("Payment received for {}", reference),
                key: payee_key.to_string(),
            },
        ];

        let mut receipts = self.commit(legs, amount, reference).await?.into_iter();
        match (receipts.next(), receipts.next()) {
            (Some(payer), Some(payee)) => {
                info!(
                    %payer_wallet_id,
                    %payee_wallet_id,
                    amount = %amount,
                    reference,
                    "Escrow released"
                );
                Ok(ReleaseReceipt { payer, payee })
            },
            _ => Err(LedgerError::Conflict("incomplete release commit".to_string())),
        }
    }

    async fn try_reset(&self, wallet_id: WalletId) -> LedgerResult<bool> {
        let wallet = self.get_wallet(wallet_id).await?;
        if wallet.daily_spent == Decimal::ZERO {
            return Ok(false);
        }

        self.store.wallets().commit(&[wallet.after_daily_reset()], &[]).await?;
        Ok(true)
    }

    async fn commit(&self, legs: Vec<Leg>, amount: Money, reference: &str) -> LedgerResult<Vec<LedgerReceipt>> {
        let transactions: Vec<Transaction> = legs
            .iter()
            .map(|leg| {
                Transaction::record(&leg.before, &leg.after, leg.kind, amount, leg.description.as_str(), reference, leg.key.as_str())
            })
            .collect();
        let wallets: Vec<Wallet> = legs.iter().map(|leg| leg.after.clone()).collect();

        self.store.wallets().commit(&wallets, &transactions).await?;

        Ok(wallets
            .into_iter()
            .zip(transactions)
            .map(|(wallet, transaction)| LedgerReceipt {
                wallet,
                transaction,
                replayed: false,
            })
            .collect())
    }
}

/// A key hit is a replay only if it records the same movement; a reused
/// reference with a different amount is refused rather than dropped.
fn ensure_same_intent(
    recorded: &Transaction,
    kind: TransactionKind,
    amount: Money,
    reference: &str,
) -> LedgerResult<()> {
    if recorded.kind != kind || recorded.amount != amount.as_decimal() {
        return Err(DomainError::Validation(format!(
            "Reference {} already used for a {} of {}",
            reference, recorded.kind, recorded.amount
        ))
        .into());
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use agora_store::MemoryStore;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn ledger() -> WalletLedger<MemoryStore> {
        WalletLedger::new(Arc::new(MemoryStore::new()), RetryPolicy::default())
    }

    fn money(value: Decimal) -> Money {
        Money::new(value).unwrap()
    }

    async fn funded(ledger: &WalletLedger<MemoryStore>, amount: Decimal) -> Wallet {
        let wallet = ledger
            .open_wallet(Uuid::now_v7(), Currency::usd(), dec!(100000), dec!(80000))
            .await
            .unwrap();
        ledger.deposit(wallet.id, amount, "seed").await.unwrap().wallet
    }

    #[tokio::test]
    async fn test_deposit_appends_transaction() {
        let ledger = ledger();
        let wallet = funded(&ledger, dec!(250000)).await;

        assert_eq!(wallet.balance, dec!(250000));
        let log = ledger.transactions(wallet.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, TransactionKind::Deposit);
        assert_eq!(log[0].resulting_balance, dec!(250000));
    }

    #[tokio::test]
    async fn test_deposit_rejects_non_positive_amount() {
        let ledger = ledger();
        let wallet = funded(&ledger, dec!(10)).await;

        let result = ledger.deposit(wallet.id, dec!(0), "zero").await;
        assert!(matches!(result, Err(LedgerError::Domain(DomainError::Validation(_)))));
        let result = ledger.deposit(wallet.id, dec!(-5), "negative").await;
        assert!(matches!(result, Err(LedgerError::Domain(DomainError::Validation(_)))));
    }

    #[tokio::test]
    async fn test_deposit_replay_is_a_no_op() {
        let ledger = ledger();
        let wallet = funded(&ledger, dec!(100)).await;

        let first = ledger.deposit(wallet.id, dec!(50), "bank-1").await.unwrap();
        let second = ledger.deposit(wallet.id, dec!(50), "bank-1").await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(second.transaction.id, first.transaction.id);
        assert_eq!(ledger.get_wallet(wallet.id).await.unwrap().balance, dec!(150));
    }

    #[tokio::test]
    async fn test_reused_reference_with_other_amount_is_refused() {
        let ledger = ledger();
        let wallet = funded(&ledger, dec!(100)).await;

        ledger.deposit(wallet.id, dec!(50), "bank-1").await.unwrap();
        let result = ledger.deposit(wallet.id, dec!(5000), "bank-1").await;

        assert!(matches!(result, Err(LedgerError::Domain(DomainError::Validation(_)))));
        assert_eq!(ledger.get_wallet(wallet.id).await.unwrap().balance, dec!(150));
        assert_eq!(ledger.transactions(wallet.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_release_replay_with_other_amount_is_refused() {
        let ledger = ledger();
        let buyer = funded(&ledger, dec!(1000)).await;
        let seller = ledger
            .open_wallet(Uuid::now_v7(), Currency::usd(), dec!(0), dec!(0))
            .await
            .unwrap();
        ledger.hold(buyer.id, money(dec!(400)), "escrow-1").await.unwrap();
        ledger.release(buyer.id, seller.id, money(dec!(400)), "escrow-1").await.unwrap();

        let replay = ledger.release(buyer.id, seller.id, money(dec!(400)), "escrow-1").await.unwrap();
        assert!(replay.payer.replayed && replay.payee.replayed);

        let result = ledger.release(buyer.id, seller.id, money(dec!(300)), "escrow-1").await;
        assert!(matches!(result, Err(LedgerError::Domain(DomainError::Validation(_)))));
        assert_eq!(ledger.get_wallet(seller.id).await.unwrap().balance, dec!(400));
    }

    #[tokio::test]
    async fn test_withdraw_does_not_count_toward_daily_limit() {
        let ledger = ledger();
        let wallet = funded(&ledger, dec!(1000)).await;

        let receipt = ledger.withdraw(wallet.id, dec!(400), "payout-1").await.unwrap();
        assert_eq!(receipt.wallet.balance, dec!(600));
        assert_eq!(receipt.wallet.daily_spent, dec!(0));

        let result = ledger.withdraw(wallet.id, dec!(601), "payout-2").await;
        assert!(matches!(result, Err(LedgerError::Domain(DomainError::InsufficientBalance { .. }))));
    }

    #[tokio::test]
    async fn test_hold_limit_failure_leaves_wallet_untouched() {
        let ledger = ledger();
        let wallet = funded(&ledger, dec!(250000)).await;

        let result = ledger.hold(wallet.id, money(dec!(90000)), "escrow-1").await;
        assert!(matches!(result, Err(LedgerError::Domain(DomainError::PerJobLimitExceeded { .. }))));

        let after = ledger.get_wallet(wallet.id).await.unwrap();
        assert_eq!(after, wallet);
        assert_eq!(ledger.transactions(wallet.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_release_moves_escrow_to_payee_balance() {
        let ledger = ledger();
        let buyer = funded(&ledger, dec!(1000)).await;
        let seller = ledger
            .open_wallet(Uuid::now_v7(), Currency::usd(), dec!(0), dec!(0))
            .await
            .unwrap();

        ledger.hold(buyer.id, money(dec!(400)), "escrow-1").await.unwrap();
        let receipt = ledger.release(buyer.id, seller.id, money(dec!(400)), "escrow-1").await.unwrap();

        assert_eq!(receipt.payer.wallet.balance, dec!(600));
        assert_eq!(receipt.payer.wallet.escrow_balance, dec!(0));
        assert_eq!(receipt.payee.wallet.balance, dec!(400));
        assert_eq!(receipt.payee.wallet.escrow_balance, dec!(0));
        assert_eq!(receipt.payer.transaction.kind, TransactionKind::EscrowRelease);
        assert_eq!(receipt.payee.transaction.kind, TransactionKind::EscrowRelease);

        assert!(ledger.audit(buyer.id).await.unwrap().is_consistent());
        assert!(ledger.audit(seller.id).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_release_currency_mismatch() {
        let ledger = ledger();
        let buyer = funded(&ledger, dec!(1000)).await;
        let seller = ledger
            .open_wallet(Uuid::now_v7(), Currency::new("EUR").unwrap(), dec!(0), dec!(0))
            .await
            .unwrap();
        ledger.hold(buyer.id, money(dec!(100)), "escrow-1").await.unwrap();

        let result = ledger.release(buyer.id, seller.id, money(dec!(100)), "escrow-1").await;
        assert!(matches!(result, Err(LedgerError::Domain(DomainError::Validation(_)))));
        assert_eq!(ledger.get_wallet(buyer.id).await.unwrap().escrow_balance, dec!(100));
    }

    #[tokio::test]
    async fn test_refund_restores_daily_headroom() {
        let ledger = ledger();
        let wallet = funded(&ledger, dec!(1000)).await;

        ledger.hold(wallet.id, money(dec!(300)), "escrow-1").await.unwrap();
        let receipt = ledger.refund_hold(wallet.id, money(dec!(300)), "escrow-1").await.unwrap();

        assert_eq!(receipt.wallet.balance, dec!(1000));
        assert_eq!(receipt.wallet.escrow_balance, dec!(0));
        assert_eq!(receipt.wallet.daily_spent, dec!(0));
    }

    #[tokio::test]
    async fn test_reset_daily_spent() {
        let ledger = ledger();
        let wallet = funded(&ledger, dec!(1000)).await;
        let idle = funded(&ledger, dec!(1000)).await;
        ledger.hold(wallet.id, money(dec!(300)), "escrow-1").await.unwrap();

        let reset = ledger.reset_daily_spent().await.unwrap();
        assert_eq!(reset, 1);

        let after = ledger.get_wallet(wallet.id).await.unwrap();
        assert_eq!(after.daily_spent, dec!(0));
        assert_eq!(after.escrow_balance, dec!(300));
        assert_eq!(ledger.get_wallet(idle.id).await.unwrap().version, idle.version);
    }

    #[tokio::test]
    async fn test_open_wallet_once_per_owner() {
        let ledger = ledger();
        let owner = Uuid::now_v7();
        ledger.open_wallet(owner, Currency::usd(), dec!(10), dec!(10)).await.unwrap();

        let second = ledger.open_wallet(owner, Currency::usd(), dec!(10), dec!(10)).await;
        assert!(matches!(second, Err(LedgerError::Domain(DomainError::Validation(_)))));
        assert_eq!(ledger.wallet_for_owner(owner).await.unwrap().owner_id, owner);
    }

    #[tokio::test]
    async fn test_unknown_wallet() {
        let ledger = ledger();
        let id = Uuid::now_v7();
        assert!(matches!(ledger.get_wallet(id).await, Err(LedgerError::WalletNotFound(w)) if w == id));
        assert!(matches!(ledger.deposit(id, dec!(1), "x").await, Err(LedgerError::WalletNotFound(_))));
    }
}
