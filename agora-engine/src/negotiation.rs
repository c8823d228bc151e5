//! NegotiationEngine: the offer/counter-offer state machine per (job, seller).
//!
//! Every operation on a negotiation runs under that negotiation's lock and
//! writes are version-checked in the store, so two concurrent `accept`
//! calls can never both succeed.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use agora_domain::{
    CandidateStatus, Escrow, Job, JobId, JobStatus, Negotiation, NegotiationId,
    NegotiationOffer, Notification, OfferDraft, Party, TurnPolicy, UserId,
};
use agora_store::{KeyedLocks, RetryPolicy, Store, StoreError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::escrow::EscrowController;
use crate::ports::{deliver, Clock, EventSink, JobRegistry};

// =============================================================================
// Configuration
// =============================================================================

/// Negotiation policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationConfig {
    /// Round budget used when the caller does not pass one
    pub default_max_rounds: u32,
    /// Largest round budget a caller may ask for
    pub max_rounds_cap: u32,
    /// Whether participants must take turns
    pub turn_policy: TurnPolicy,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            default_max_rounds: 5,
            max_rounds_cap: 20,
            turn_policy: TurnPolicy::Free,
        }
    }
}

// =============================================================================
// Requests and views
// =============================================================================

/// Input for opening a negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenNegotiation {
    pub job_id: JobId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub initial_offer: OfferDraft,
    /// Falls back to the configured default
    #[serde(default)]
    pub max_rounds: Option<u32>,
    /// Author of the first offer
    #[serde(default = "default_opener")]
    pub opened_by: Party,
}

fn default_opener() -> Party {
    Party::Buyer
}

/// One row of a job's candidate list, recomputed from the negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateView {
    pub seller_id: UserId,
    pub negotiation_id: NegotiationId,
    pub status: CandidateStatus,
    pub current_price: Decimal,
    pub round: u32,
    pub max_rounds: u32,
}

// =============================================================================
// NegotiationEngine
// =============================================================================

/// Drives negotiations and hands accepted deals to the escrow controller.
pub struct NegotiationEngine<S: Store> {
    store: Arc<S>,
    escrow: Arc<EscrowController<S>>,
    jobs: Arc<dyn JobRegistry>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<NegotiationId>,
    retry: RetryPolicy,
    config: NegotiationConfig,
}

impl<S: Store> NegotiationEngine<S> {
    /// Create a new negotiation engine.
    pub fn new(
        store: Arc<S>,
        escrow: Arc<EscrowController<S>>,
        jobs: Arc<dyn JobRegistry>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        config: NegotiationConfig,
    ) -> Self {
        Self {
            store,
            escrow,
            jobs,
            events,
            clock,
            locks: KeyedLocks::new(),
            retry,
            config,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Get a negotiation by id.
    pub async fn negotiation(&self, negotiation_id: NegotiationId) -> EngineResult<Negotiation> {
        self.store
            .negotiations()
            .find_by_id(negotiation_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Negotiation", negotiation_id))
    }

    /// All negotiations of a job, oldest first.
    pub async fn negotiations_for_job(&self, job_id: JobId) -> EngineResult<Vec<Negotiation>> {
        Ok(self.store.negotiations().find_by_job(job_id).await?)
    }

    /// The job's candidate list: one row per seller, from their latest negotiation.
    pub async fn candidate_statuses(&self, job_id: JobId) -> EngineResult<Vec<CandidateView>> {
        let negotiations = self.negotiations_for_job(job_id).await?;

        let mut rows: Vec<CandidateView> = Vec::new();
        let mut index: HashMap<UserId, usize> = HashMap::new();

        for negotiation in negotiations {
            let row = CandidateView {
                seller_id: negotiation.seller_id,
                negotiation_id: negotiation.id,
                status: negotiation.candidate_status(),
                current_price: negotiation.current_offer().price.as_decimal(),
                round: negotiation.round(),
                max_rounds: negotiation.max_rounds,
            };
            match index.get(&negotiation.seller_id) {
                Some(&i) => rows[i] = row,
                None => {
                    index.insert(negotiation.seller_id, rows.len());
                    rows.push(row);
                },
            }
        }

        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Open a negotiation with its first offer.
    ///
    /// # Errors
    /// `Validation` for a bad round budget, a closed or overdue job, a buyer
    /// that does not own the job, a bad offer, or an already active
    /// negotiation for the (job, seller) pair. `NotFound` for an unknown job.
    pub async fn open(&self, request: OpenNegotiation) -> EngineResult<Negotiation> {
        let now = self.clock.now();
        let max_rounds = request.max_rounds.unwrap_or(self.config.default_max_rounds);

        if max_rounds == 0 || max_rounds > self.config.max_rounds_cap {
            return Err(EngineError::Validation(format!(
                "max_rounds must be between 1 and {}, got {}",
                self.config.max_rounds_cap, max_rounds
            )));
        }

        let job = self.load_job(request.job_id).await?;
        if job.status != JobStatus::Open {
            return Err(EngineError::Validation(format!("Job {} is {}, not open", job.id, job.status)));
        }
        Self::ensure_before_deadline(&job, now)?;
        if job.buyer_id != request.buyer_id {
            return Err(EngineError::Validation(format!(
                "User {} is not the buyer of job {}",
                request.buyer_id, job.id
            )));
        }

        let offer = NegotiationOffer::from_draft(request.initial_offer, request.opened_by, now)?;
        let negotiation =
            Negotiation::open(job.id, request.buyer_id, request.seller_id, offer, max_rounds, now)?;

        self.store.negotiations().insert(&negotiation).await.map_err(|e| match e {
            StoreError::Duplicate { .. } => EngineError::Validation(format!(
                "An active negotiation already exists for job {} and seller {}",
                job.id, request.seller_id
            )),
            other => other.into(),
        })?;

        info!(
            negotiation_id = %negotiation.id,
            job_id = %job.id,
            seller_id = %negotiation.seller_id,
            price = %negotiation.current_offer().price,
            max_rounds,
            "Negotiation opened"
        );
        deliver(self.events.as_ref(), Notification::negotiation_opened(&negotiation, now));

        Ok(negotiation)
    }

    /// Append a counter-offer from `actor_id`.
    ///
    /// # Errors
    /// `State` unless pending, `RoundLimitExceeded` at the round budget,
    /// `Validation` for a bad offer, a non-participant, an out-of-turn actor
    /// or a passed job deadline.
    pub async fn counter_offer(
        &self,
        negotiation_id: NegotiationId,
        draft: OfferDraft,
        actor_id: UserId,
    ) -> EngineResult<Negotiation> {
        let _guard = self.locks.lock(negotiation_id).await;

        let updated = self
            .retry
            .run("counter_offer", EngineError::is_retryable, || {
                self.try_counter(negotiation_id, &draft, actor_id)
            })
            .await
            .map_err(|e| {
                debug!(%negotiation_id, %actor_id, error = %e, "Counter-offer rejected");
                e
            })?;

        info!(
            %negotiation_id,
            from = %updated.current_offer().from,
            price = %updated.current_offer().price,
            round = updated.round(),
            max_rounds = updated.max_rounds,
            "Counter-offer appended"
        );
        deliver(self.events.as_ref(), Notification::counter_offer(&updated, self.clock.now()));

        Ok(updated)
    }

    /// Accept the current offer: hold funds in escrow and close the deal.
    ///
    /// A wallet limit failure leaves the negotiation pending and is returned
    /// unchanged.
    pub async fn accept(
        &self,
        negotiation_id: NegotiationId,
        actor_id: UserId,
    ) -> EngineResult<(Negotiation, Escrow)> {
        let _guard = self.locks.lock(negotiation_id).await;

        let negotiation = self.negotiation(negotiation_id).await?;
        Self::ensure_pending(&negotiation, "accept")?;
        let party = negotiation.party_of(actor_id)?;
        negotiation.check_turn(party, self.config.turn_policy)?;

        let job = self.load_job(negotiation.job_id).await?;
        if job.status != JobStatus::Open {
            return Err(EngineError::State(format!(
                "Cannot accept negotiation {}: job {} is {}",
                negotiation_id, job.id, job.status
            )));
        }

        let escrow = match self.escrow.hold_for_acceptance(&negotiation, negotiation.current_offer()).await {
            Ok(escrow) => escrow,
            Err(e) if e.is_limit_violation() => {
                warn!(%negotiation_id, error = %e, "Acceptance blocked by wallet limits");
                deliver(
                    self.events.as_ref(),
                    Notification::limit_reached(negotiation.buyer_id, &e, self.clock.now()),
                );
                return Err(e);
            },
            Err(e) => return Err(e),
        };

        let now = self.clock.now();
        let accepted = negotiation.accept(now)?;

        if let Err(e) = self.store.negotiations().update(&accepted).await {
            warn!(%negotiation_id, error = %e, "Lost acceptance race, rolling back hold");
            let rollback = self.escrow.rollback_hold(&escrow).await;
            return Err(failed_acceptance(negotiation_id, &escrow, e, rollback));
        }

        info!(
            %negotiation_id,
            escrow_id = %escrow.id,
            accepted_by = %party,
            amount = %escrow.amount,
            "Deal accepted"
        );

        if let Err(e) = self.jobs.set_status(accepted.job_id, JobStatus::InProgress).await {
            warn!(%negotiation_id, job_id = %accepted.job_id, error = %e, "Failed to mark job in progress");
        }
        for notification in Notification::deal_accepted(&accepted, &escrow, now) {
            deliver(self.events.as_ref(), notification);
        }

        Ok((accepted, escrow))
    }

    /// Reject the negotiation. No funds move.
    pub async fn reject(&self, negotiation_id: NegotiationId, actor_id: UserId) -> EngineResult<Negotiation> {
        let _guard = self.locks.lock(negotiation_id).await;

        let (rejected, party) = self
            .retry
            .run("reject", EngineError::is_retryable, || self.try_reject(negotiation_id, actor_id))
            .await?;

        info!(%negotiation_id, rejected_by = %party, "Negotiation rejected");
        deliver(
            self.events.as_ref(),
            Notification::negotiation_rejected(&rejected, party, self.clock.now()),
        );

        Ok(rejected)
    }

    /// Expire a pending negotiation. A no-op returning the current record if
    /// it is already terminal.
    pub async fn expire(&self, negotiation_id: NegotiationId) -> EngineResult<Negotiation> {
        let (negotiation, _) = self.expire_inner(negotiation_id).await?;
        Ok(negotiation)
    }

    /// Expire every pending negotiation whose job deadline has passed.
    ///
    /// Returns the ids that transitioned. Safe to run redundantly.
    pub async fn expire_overdue(&self) -> EngineResult<Vec<NegotiationId>> {
        let now = self.clock.now();
        let pending = self.store.negotiations().find_pending().await?;

        let mut jobs: HashMap<JobId, Option<Job>> = HashMap::new();
        let mut expired = Vec::new();

        for negotiation in pending {
            if !jobs.contains_key(&negotiation.job_id) {
                let job = match self.jobs.get_job(negotiation.job_id).await {
                    Ok(job) => job,
                    Err(e) => {
                        warn!(job_id = %negotiation.job_id, error = %e, "Job lookup failed during expiry sweep");
                        None
                    },
                };
                jobs.insert(negotiation.job_id, job);
            }

            let overdue = matches!(jobs.get(&negotiation.job_id), Some(Some(job)) if job.deadline_passed(now));
            if !overdue {
                continue;
            }

            match self.expire_inner(negotiation.id).await {
                Ok((_, true)) => expired.push(negotiation.id),
                Ok((_, false)) => {},
                Err(e) => warn!(negotiation_id = %negotiation.id, error = %e, "Failed to expire negotiation"),
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Overdue negotiations expired");
        }
        Ok(expired)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    async fn try_counter(
        &self,
        negotiation_id: NegotiationId,
        draft: &OfferDraft,
        actor_id: UserId,
    ) -> EngineResult<Negotiation> {
        let now = self.clock.now();
        let negotiation = self.negotiation(negotiation_id).await?;

        Self::ensure_pending(&negotiation, "counter-offer on")?;
        if !negotiation.has_rounds_left() {
            return Err(EngineError::RoundLimitExceeded {
                round: negotiation.round(),
                max_rounds: negotiation.max_rounds,
            });
        }

        let party = negotiation.party_of(actor_id)?;
        negotiation.check_turn(party, self.config.turn_policy)?;
        let offer = NegotiationOffer::from_draft(draft.clone(), party, now)?;

        let job = self.load_job(negotiation.job_id).await?;
        Self::ensure_before_deadline(&job, now)?;

        let updated = negotiation.counter(offer, now)?;
        self.store.negotiations().update(&updated).await?;
        Ok(updated)
    }

    async fn try_reject(&self, negotiation_id: NegotiationId, actor_id: UserId) -> EngineResult<(Negotiation, Party)> {
        let negotiation = self.negotiation(negotiation_id).await?;
        Self::ensure_pending(&negotiation, "reject")?;
        let party = negotiation.party_of(actor_id)?;

        let rejected = negotiation.reject(self.clock.now())?;
        self.store.negotiations().update(&rejected).await?;
        Ok((rejected, party))
    }

    async fn expire_inner(&self, negotiation_id: NegotiationId) -> EngineResult<(Negotiation, bool)> {
        let _guard = self.locks.lock(negotiation_id).await;

        let (negotiation, transitioned) = self
            .retry
            .run("expire", EngineError::is_retryable, || self.try_expire(negotiation_id))
            .await?;

        if transitioned {
            info!(%negotiation_id, job_id = %negotiation.job_id, "Negotiation expired");
            for notification in Notification::negotiation_expired(&negotiation, self.clock.now()) {
                deliver(self.events.as_ref(), notification);
            }
        }

        Ok((negotiation, transitioned))
    }

    async fn try_expire(&self, negotiation_id: NegotiationId) -> EngineResult<(Negotiation, bool)> {
        let negotiation = self.negotiation(negotiation_id).await?;

        match negotiation.expire(self.clock.now()) {
            Some(expired) => {
                self.store.negotiations().update(&expired).await?;
                Ok((expired, true))
            },
            None => Ok((negotiation, false)),
        }
    }

    async fn load_job(&self, job_id: JobId) -> EngineResult<Job> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Job", job_id))
    }

    fn ensure_pending(negotiation: &Negotiation, action: &str) -> EngineResult<()> {
        if negotiation.status.is_terminal() {
            return Err(EngineError::State(format!(
                "Cannot {} negotiation {}: status is {}",
                action, negotiation.id, negotiation.status
            )));
        }
        Ok(())
    }

    fn ensure_before_deadline(job: &Job, now: chrono::DateTime<chrono::Utc>) -> EngineResult<()> {
        if job.deadline_passed(now) {
            return Err(EngineError::Validation(format!(
                "Job {} deadline {} has passed",
                job.id, job.deadline
            )));
        }
        Ok(())
    }
}

/// Error for an acceptance whose save failed after the hold succeeded.
///
/// A failed rollback outranks the save error: the escrow is still held
/// against a pending negotiation.
fn failed_acceptance(
    negotiation_id: NegotiationId,
    escrow: &Escrow,
    save: StoreError,
    rollback: EngineResult<()>,
) -> EngineError {
    if let Err(rollback) = rollback {
        error!(%negotiation_id, escrow_id = %escrow.id, error = %rollback, "Hold rollback failed");
        return EngineError::CompensationFailed {
            escrow_id: escrow.id,
            reason: rollback.to_string(),
        };
    }

    match save {
        StoreError::VersionConflict { .. } => {
            EngineError::State(format!("Negotiation {} changed during acceptance", negotiation_id))
        },
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_domain::{Currency, Money};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn held_escrow() -> Escrow {
        Escrow::hold(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            Uuid::now_v7(),
            Money::new(dec!(47500)).unwrap(),
            Currency::usd(),
        )
    }

    fn lost_race() -> StoreError {
        StoreError::conflict("Negotiation", Uuid::now_v7().to_string(), 1, 2)
    }

    #[test]
    fn test_lost_race_with_clean_rollback_is_a_state_error() {
        let escrow = held_escrow();

        let error = failed_acceptance(Uuid::now_v7(), &escrow, lost_race(), Ok(()));
        assert!(matches!(error, EngineError::State(_)));
    }

    #[test]
    fn test_failed_rollback_is_surfaced() {
        let escrow = held_escrow();

        let error = failed_acceptance(
            Uuid::now_v7(),
            &escrow,
            lost_race(),
            Err(EngineError::Conflict("wallet busy".to_string())),
        );
        assert!(matches!(error, EngineError::CompensationFailed { escrow_id, .. } if escrow_id == escrow.id));
        assert_eq!(error.kind(), crate::error::ErrorKind::Internal);
    }
}
