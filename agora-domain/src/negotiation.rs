//! Negotiation state machine
//!
//! ```text
//!            counter (round < max_rounds)
//!              ┌──────┐
//!              ▼      │
//! open ──▶ Pending ───┴──▶ Accepted
//!              │
//!              ├────────▶ Rejected
//!              └────────▶ Expired
//! ```
//!
//! `Pending` is the only non-terminal state. Offers are append-only and
//! ordered by append order; `current_offer` is always the last one appended,
//! whatever the offer timestamps say.

use crate::entities::{JobId, UserId};
use crate::value_objects::{DomainError, Money, TurnPolicy};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a Negotiation
pub type NegotiationId = Uuid;

/// Unique identifier for an offer within a negotiation
pub type OfferId = Uuid;

// =============================================================================
// Party
// =============================================================================

/// Which side of the deal authored an offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    /// The job owner
    Buyer,
    /// The matched seller
    Seller,
}

impl Party {
    /// The other side of the deal
    pub fn counterparty(&self) -> Party {
        match self {
            Party::Buyer => Party::Seller,
            Party::Seller => Party::Buyer,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Buyer => write!(f, "buyer"),
            Party::Seller => write!(f, "seller"),
        }
    }
}

// =============================================================================
// Offers
// =============================================================================

/// Offer terms as submitted by a caller, before the engine stamps identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferDraft {
    pub price: Decimal,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payment_schedule: String,
    #[serde(default)]
    pub terms: String,
}

/// An offer appended to a negotiation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationOffer {
    pub id: OfferId,
    pub price: Money,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub payment_schedule: String,
    pub terms: String,
    pub timestamp: DateTime<Utc>,
    pub from: Party,
}

impl NegotiationOffer {
    /// Validate a draft and stamp it with author and time
    ///
    /// # Errors
    /// Returns `DomainError::Validation` if price <= 0 or the period is inverted
    pub fn from_draft(
        draft: OfferDraft,
        from: Party,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let price = Money::new(draft.price)
            .map_err(|_| DomainError::Validation(format!("Offer price must be positive, got {}", draft.price)))?;

        if draft.start_date > draft.end_date {
            return Err(DomainError::Validation(format!(
                "Offer start date {} is after end date {}",
                draft.start_date, draft.end_date
            )));
        }

        Ok(Self {
            id: Uuid::now_v7(),
            price,
            start_date: draft.start_date,
            end_date: draft.end_date,
            payment_schedule: draft.payment_schedule,
            terms: draft.terms,
            timestamp: now,
            from,
        })
    }
}

// =============================================================================
// Status
// =============================================================================

/// Negotiation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationStatus {
    /// Open for offers
    Pending,
    /// Deal struck, funds held in escrow
    Accepted,
    /// Declined by a participant
    Rejected,
    /// Deadline passed or expired by the scheduler
    Expired,
}

impl NegotiationStatus {
    /// Check if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NegotiationStatus::Pending)
    }

    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            NegotiationStatus::Pending => "pending",
            NegotiationStatus::Accepted => "accepted",
            NegotiationStatus::Rejected => "rejected",
            NegotiationStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for NegotiationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-seller status shown on a job's candidate list.
///
/// Always derived from the negotiation, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    /// Only the opening offer exists
    Pending,
    /// At least one counter-offer was made
    Negotiating,
    /// Deal accepted
    Accepted,
    /// Rejected or expired
    Rejected,
}

// =============================================================================
// Negotiation
// =============================================================================

/// Offer/counter-offer exchange between a job's buyer and one seller
///
/// `offers`, `current_offer` and `round` are private so that the
/// `round == offers.len()` invariant can only change through `counter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Negotiation {
    pub id: NegotiationId,
    pub job_id: JobId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    offers: Vec<NegotiationOffer>,
    current_offer: NegotiationOffer,
    pub status: NegotiationStatus,
    round: u32,
    pub max_rounds: u32,

    /// Optimistic concurrency revision
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Negotiation {
    /// Open a negotiation with its first offer (round 1)
    ///
    /// # Errors
    /// Returns `DomainError::Validation` if `max_rounds` is zero, the buyer and
    /// seller are the same user, or the initial offer's author is wrong
    pub fn open(
        job_id: JobId,
        buyer_id: UserId,
        seller_id: UserId,
        initial_offer: NegotiationOffer,
        max_rounds: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if max_rounds == 0 {
            return Err(DomainError::Validation("max_rounds must be at least 1".to_string()));
        }

        if buyer_id == seller_id {
            return Err(DomainError::Validation(
                "Buyer and seller must be different users".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::now_v7(),
            job_id,
            buyer_id,
            seller_id,
            offers: vec![initial_offer.clone()],
            current_offer: initial_offer,
            status: NegotiationStatus::Pending,
            round: 1,
            max_rounds,
            version: 0,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        })
    }

    /// All offers in append order
    pub fn offers(&self) -> &[NegotiationOffer] {
        &self.offers
    }

    /// The most recently appended offer
    pub fn current_offer(&self) -> &NegotiationOffer {
        &self.current_offer
    }

    /// Number of offers made so far
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Check if the negotiation still accepts actions
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Check if another offer may be appended
    pub fn has_rounds_left(&self) -> bool {
        self.round < self.max_rounds
    }

    /// Resolve which side `actor` is on
    ///
    /// # Errors
    /// Returns `DomainError::Validation` if the actor is not a participant
    pub fn party_of(&self, actor: UserId) -> Result<Party, DomainError> {
        if actor == self.buyer_id {
            Ok(Party::Buyer)
        } else if actor == self.seller_id {
            Ok(Party::Seller)
        } else {
            Err(DomainError::Validation(format!(
                "User {} is not a participant in negotiation {}",
                actor, self.id
            )))
        }
    }

    /// User id of the given side
    pub fn participant(&self, party: Party) -> UserId {
        match party {
            Party::Buyer => self.buyer_id,
            Party::Seller => self.seller_id,
        }
    }

    /// Enforce the configured turn policy for an action by `party`
    pub fn check_turn(&self, party: Party, policy: TurnPolicy) -> Result<(), DomainError> {
        match policy {
            TurnPolicy::Free => Ok(()),
            TurnPolicy::Alternating if self.current_offer.from == party => {
                Err(DomainError::Validation(format!(
                    "It is the {}'s turn in negotiation {}",
                    party.counterparty(),
                    self.id
                )))
            },
            TurnPolicy::Alternating => Ok(()),
        }
    }

    /// Append a counter-offer
    ///
    /// # Errors
    /// - `InvalidStateTransition` unless pending
    /// - `RoundLimitExceeded` if `round == max_rounds`
    pub fn counter(&self, offer: NegotiationOffer, now: DateTime<Utc>) -> Result<Negotiation, DomainError> {
        self.ensure_pending("counter-offer")?;

        if !self.has_rounds_left() {
            return Err(DomainError::RoundLimitExceeded {
                round: self.round,
                max_rounds: self.max_rounds,
            });
        }

        let mut next = self.next_revision(now);
        next.offers.push(offer.clone());
        next.current_offer = offer;
        next.round += 1;
        Ok(next)
    }

    /// Transition `Pending -> Accepted`
    pub fn accept(&self, now: DateTime<Utc>) -> Result<Negotiation, DomainError> {
        self.resolve(NegotiationStatus::Accepted, "accept", now)
    }

    /// Transition `Pending -> Rejected`
    pub fn reject(&self, now: DateTime<Utc>) -> Result<Negotiation, DomainError> {
        self.resolve(NegotiationStatus::Rejected, "reject", now)
    }

    /// Transition `Pending -> Expired`
    ///
    /// Returns `None` when already terminal; expiry is a no-op there.
    pub fn expire(&self, now: DateTime<Utc>) -> Option<Negotiation> {
        self.resolve(NegotiationStatus::Expired, "expire", now).ok()
    }

    /// Denormalized status for the job's candidate list
    pub fn candidate_status(&self) -> CandidateStatus {
        match self.status {
            NegotiationStatus::Pending if self.round > 1 => CandidateStatus::Negotiating,
            NegotiationStatus::Pending => CandidateStatus::Pending,
            NegotiationStatus::Accepted => CandidateStatus::Accepted,
            NegotiationStatus::Rejected | NegotiationStatus::Expired => CandidateStatus::Rejected,
        }
    }

    fn resolve(
        &self,
        status: NegotiationStatus,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<Negotiation, DomainError> {
        self.ensure_pending(action)?;

        let mut next = self.next_revision(now);
        next.status = status;
        next.resolved_at = Some(now);
        Ok(next)
    }

    fn ensure_pending(&self, action: &str) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot {} negotiation {}: status is {}",
                action, self.id, self.status
            )));
        }
        Ok(())
    }

    fn next_revision(&self, now: DateTime<Utc>) -> Negotiation {
        let mut next = self.clone();
        next.version += 1;
        next.updated_at = now;
        next
    }
}

// =============================================================================
// Tests
// =============================================================================
