//! EscrowController: turns negotiation outcomes into ledger operations.
//!
//! # Flow
//!
//! ```text
//! accept  → hold_for_acceptance   → Escrow(held)     + ledger.hold
//! deliver → release_on_completion → Escrow(released) + ledger.release
//! cancel  → refund_on_cancellation→ Escrow(refunded) + ledger.refund_hold
//! ```
//!
//! The escrow record is written before the hold and removed again if the
//! hold fails, so a failed acceptance leaves no trace. For release and refund
//! the ledger moves first: its idempotency key is the escrow id, so a retry
//! after a failed status write replays the movement instead of repeating it.

use std::sync::Arc;
use tracing::{error, info, warn};

use agora_domain::{
    DomainError, Escrow, EscrowId, JobId, JobStatus, Negotiation, NegotiationOffer, Notification,
};
use agora_ledger::WalletLedger;
use agora_store::{KeyedLocks, Store, StoreError};

use crate::error::{EngineError, EngineResult};
use crate::ports::{deliver, Clock, EventSink, JobRegistry};

/// Owns Escrow records; the only caller of escrow-kind ledger operations.
pub struct EscrowController<S: Store> {
    store: Arc<S>,
    ledger: Arc<WalletLedger<S>>,
    jobs: Arc<dyn JobRegistry>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<EscrowId>,
}

impl<S: Store> EscrowController<S> {
    /// Create a new escrow controller.
    pub fn new(
        store: Arc<S>,
        ledger: Arc<WalletLedger<S>>,
        jobs: Arc<dyn JobRegistry>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            ledger,
            jobs,
            events,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    /// Get an escrow by id.
    pub async fn escrow(&self, escrow_id: EscrowId) -> EngineResult<Escrow> {
        self.store
            .escrows()
            .find_by_id(escrow_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Escrow", escrow_id))
    }

    /// All escrows of a job, oldest first.
    pub async fn escrows_for_job(&self, job_id: JobId) -> EngineResult<Vec<Escrow>> {
        Ok(self.store.escrows().find_by_job(job_id).await?)
    }

    /// Hold the offer price from the buyer's wallet for the (job, seller) pair.
    ///
    /// Either the escrow exists and the funds are held, or neither.
    pub async fn hold_for_acceptance(
        &self,
        negotiation: &Negotiation,
        offer: &NegotiationOffer,
    ) -> EngineResult<Escrow> {
        let job_id = negotiation.job_id;
        let seller_id = negotiation.seller_id;

        if let Some(existing) = self.store.escrows().find_held_for(job_id, seller_id).await? {
            return Err(EngineError::State(format!(
                "Escrow {} is already held for job {} and seller {}",
                existing.id, job_id, seller_id
            )));
        }

        let buyer_wallet = self.ledger.wallet_for_owner(negotiation.buyer_id).await?;
        let seller_wallet = self.ledger.wallet_for_owner(seller_id).await?;

        if buyer_wallet.currency != seller_wallet.currency {
            return Err(EngineError::Validation(format!(
                "Buyer wallet is in {}, seller wallet is in {}",
                buyer_wallet.currency, seller_wallet.currency
            )));
        }

        let escrow = Escrow::hold(
            job_id,
            negotiation.id,
            negotiation.buyer_id,
            seller_id,
            buyer_wallet.id,
            seller_wallet.id,
            offer.price,
            buyer_wallet.currency.clone(),
        );

        self.store.escrows().insert(&escrow).await.map_err(|e| match e {
            StoreError::Duplicate { .. } => EngineError::State(format!(
                "Escrow already held for job {} and seller {}",
                job_id, seller_id
            )),
            other => other.into(),
        })?;

        if let Err(e) = self.ledger.hold(buyer_wallet.id, offer.price, &escrow.id.to_string()).await {
            self.discard(&escrow).await;
            return Err(e.into());
        }

        info!(
            escrow_id = %escrow.id,
            %job_id,
            %seller_id,
            amount = %escrow.amount,
            "Escrow held"
        );
        Ok(escrow)
    }

    /// Pay a held escrow to the seller and mark the job completed.
    pub async fn release_on_completion(&self, escrow_id: EscrowId) -> EngineResult<Escrow> {
        let _guard = self.locks.lock(escrow_id).await;

        let escrow = self.escrow(escrow_id).await?;
        let released = escrow.release(self.clock.now())?;

        self.ledger
            .release(escrow.buyer_wallet_id, escrow.seller_wallet_id, escrow.amount, &escrow.id.to_string())
            .await?;
        self.store.escrows().update(&released).await?;

        info!(%escrow_id, seller_id = %escrow.seller_id, amount = %escrow.amount, "Escrow released");

        if let Err(e) = self.jobs.set_status(escrow.job_id, JobStatus::Completed).await {
            warn!(%escrow_id, job_id = %escrow.job_id, error = %e, "Failed to mark job completed");
        }
        deliver(self.events.as_ref(), Notification::payment_released(&released, self.clock.now()));

        Ok(released)
    }

    /// Return a held escrow to the buyer.
    pub async fn refund_on_cancellation(&self, escrow_id: EscrowId) -> EngineResult<Escrow> {
        let _guard = self.locks.lock(escrow_id).await;

        let escrow = self.escrow(escrow_id).await?;
        let refunded = escrow.refund(self.clock.now())?;

        self.ledger
            .refund_hold(escrow.buyer_wallet_id, escrow.amount, &escrow.id.to_string())
            .await?;
        self.store.escrows().update(&refunded).await?;

        info!(%escrow_id, buyer_id = %escrow.buyer_id, amount = %escrow.amount, "Escrow refunded");
        deliver(self.events.as_ref(), Notification::escrow_refunded(&refunded, self.clock.now()));

        Ok(refunded)
    }

    /// Undo a hold whose acceptance could not be committed.
    ///
    /// Refunds the buyer and removes the escrow record.
    pub(crate) async fn rollback_hold(&self, escrow: &Escrow) -> EngineResult<()> {
        let _guard = self.locks.lock(escrow.id).await;

        if escrow.status != agora_domain::EscrowStatus::Held {
            return Err(DomainError::InvalidStateTransition(format!("Escrow {} is {}", escrow.id, escrow.status)).into());
        }

        self.ledger
            .refund_hold(escrow.buyer_wallet_id, escrow.amount, &escrow.id.to_string())
            .await?;
        self.discard(escrow).await;

        warn!(escrow_id = %escrow.id, job_id = %escrow.job_id, "Escrow hold rolled back");
        Ok(())
    }

    async fn discard(&self, escrow: &Escrow) {
        if let Err(e) = self.store.escrows().delete(escrow.id).await {
            error!(escrow_id = %escrow.id, error = %e, "Failed to remove escrow record");
        }
    }
}
