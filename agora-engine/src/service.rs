//! Marketplace: the settlement service callers talk to.
//!
//! Wires the ledger, escrow controller and negotiation engine over one
//! store and exposes the operation table of the settlement core. Every
//! mutating call returns the authoritative post-state.

use std::sync::Arc;

use agora_domain::{
    Currency, Escrow, EscrowId, JobId, Negotiation, NegotiationId, OfferDraft, Transaction,
    UserId, Wallet, WalletId,
};
use agora_ledger::{AuditReport, LedgerReceipt, WalletLedger};
use agora_store::{RetryPolicy, Store};
use rust_decimal::Decimal;

use crate::error::EngineResult;
use crate::escrow::EscrowController;
use crate::negotiation::{CandidateView, NegotiationConfig, NegotiationEngine, OpenNegotiation};
use crate::ports::{Clock, EventSink, JobRegistry};

/// Settlement configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketplaceConfig {
    pub negotiation: NegotiationConfig,
    pub retry: RetryPolicy,
}

/// Collaborators supplied by the runtime.
pub struct Collaborators {
    pub jobs: Arc<dyn JobRegistry>,
    pub events: Arc<dyn EventSink>,
    pub clock: Arc<dyn Clock>,
}

/// The settlement core.
pub struct Marketplace<S: Store> {
    ledger: Arc<WalletLedger<S>>,
    escrow: Arc<EscrowController<S>>,
    negotiations: NegotiationEngine<S>,
}

impl<S: Store> Marketplace<S> {
    /// Build the component graph over a store.
    pub fn new(store: Arc<S>, collaborators: Collaborators, config: MarketplaceConfig) -> Self {
        let Collaborators { jobs, events, clock } = collaborators;

        let ledger = Arc::new(WalletLedger::new(store.clone(), config.retry));
        let escrow = Arc::new(EscrowController::new(
            store.clone(),
            ledger.clone(),
            jobs.clone(),
            events.clone(),
            clock.clone(),
        ));
        let negotiations = NegotiationEngine::new(
            store,
            escrow.clone(),
            jobs,
            events,
            clock,
            config.retry,
            config.negotiation,
        );

        Self {
            ledger,
            escrow,
            negotiations,
        }
    }

    /// Direct access to the ledger.
    pub fn ledger(&self) -> &WalletLedger<S> {
        &self.ledger
    }

    /// Direct access to the escrow controller.
    pub fn escrows(&self) -> &EscrowController<S> {
        &self.escrow
    }

    /// Direct access to the negotiation engine.
    pub fn negotiations(&self) -> &NegotiationEngine<S> {
        &self.negotiations
    }

    // =========================================================================
    // Negotiations
    // =========================================================================

    pub async fn open_negotiation(&self, request: OpenNegotiation) -> EngineResult<Negotiation> {
        self.negotiations.open(request).await
    }

    pub async fn submit_counter_offer(
        &self,
        negotiation_id: NegotiationId,
        offer: OfferDraft,
        actor_id: UserId,
    ) -> EngineResult<Negotiation> {
        self.negotiations.counter_offer(negotiation_id, offer, actor_id).await
    }

    pub async fn accept_offer(
        &self,
        negotiation_id: NegotiationId,
        actor_id: UserId,
    ) -> EngineResult<(Negotiation, Escrow)> {
        self.negotiations.accept(negotiation_id, actor_id).await
    }

    pub async fn reject_offer(&self, negotiation_id: NegotiationId, actor_id: UserId) -> EngineResult<Negotiation> {
        self.negotiations.reject(negotiation_id, actor_id).await
    }

    pub async fn expire_negotiation(&self, negotiation_id: NegotiationId) -> EngineResult<Negotiation> {
        self.negotiations.expire(negotiation_id).await
    }

    /// Scheduler entry point: expire pending negotiations past their job deadline.
    pub async fn expire_overdue(&self) -> EngineResult<Vec<NegotiationId>> {
        self.negotiations.expire_overdue().await
    }

    pub async fn get_negotiation(&self, negotiation_id: NegotiationId) -> EngineResult<Negotiation> {
        self.negotiations.negotiation(negotiation_id).await
    }

    pub async fn candidates(&self, job_id: JobId) -> EngineResult<Vec<CandidateView>> {
        self.negotiations.candidate_statuses(job_id).await
    }

    // =========================================================================
    // Escrow
    // =========================================================================

    pub async fn release_escrow(&self, escrow_id: EscrowId) -> EngineResult<Escrow> {
        self.escrow.release_on_completion(escrow_id).await
    }

    pub async fn refund_escrow(&self, escrow_id: EscrowId) -> EngineResult<Escrow> {
        self.escrow.refund_on_cancellation(escrow_id).await
    }

    pub async fn get_escrow(&self, escrow_id: EscrowId) -> EngineResult<Escrow> {
        self.escrow.escrow(escrow_id).await
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    pub async fn open_wallet(
        &self,
        owner_id: UserId,
        currency: Currency,
        daily_limit: Decimal,
        per_job_limit: Decimal,
    ) -> EngineResult<Wallet> {
        Ok(self.ledger.open_wallet(owner_id, currency, daily_limit, per_job_limit).await?)
    }

    pub async fn get_wallet(&self, wallet_id: WalletId) -> EngineResult<Wallet> {
        Ok(self.ledger.get_wallet(wallet_id).await?)
    }

    pub async fn deposit(&self, wallet_id: WalletId, amount: Decimal, reference: &str) -> EngineResult<LedgerReceipt> {
        Ok(self.ledger.deposit(wallet_id, amount, reference).await?)
    }

    pub async fn withdraw(&self, wallet_id: WalletId, amount: Decimal, reference: &str) -> EngineResult<LedgerReceipt> {
        Ok(self.ledger.withdraw(wallet_id, amount, reference).await?)
    }

    pub async fn wallet_transactions(&self, wallet_id: WalletId) -> EngineResult<Vec<Transaction>> {
        Ok(self.ledger.transactions(wallet_id).await?)
    }

    pub async fn audit_wallet(&self, wallet_id: WalletId) -> EngineResult<AuditReport> {
        Ok(self.ledger.audit(wallet_id).await?)
    }

    /// Scheduler entry point: day rollover of spending counters.
    pub async fn reset_daily_limits(&self) -> EngineResult<usize> {
        Ok(self.ledger.reset_daily_spent().await?)
    }
}
