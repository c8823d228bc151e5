//! Notification events for Agora
//!
//! Events are emitted by the settlement core after a state change has been
//! committed. Delivery is fire-and-forget: a lost notification never undoes
//! the change that produced it.

use crate::entities::{Escrow, UserId};
use crate::negotiation::{Negotiation, Party};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a Notification
pub type NotificationId = Uuid;

/// Notification category, as rendered by the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A deal was struck or settled
    Deal,
    /// Negotiation activity (new offer, rejection)
    Negotiation,
    /// A deadline passed
    Deadline,
    /// Action needs the user's approval (spending limits)
    Approval,
    /// Free-form message
    Message,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::Deal => "deal",
            NotificationKind::Negotiation => "negotiation",
            NotificationKind::Deadline => "deadline",
            NotificationKind::Approval => "approval",
            NotificationKind::Message => "message",
        };
        f.write_str(s)
    }
}

/// A notification addressed to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique notification identifier
    pub id: NotificationId,
    /// Category
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Recipient
    pub user_id: UserId,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Link the dashboard opens when the notification is clicked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    /// When the event occurred
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a notification with no action link
    pub fn new(
        kind: NotificationKind,
        user_id: UserId,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            user_id,
            title: title.into(),
            message: message.into(),
            action_url: None,
            created_at,
        }
    }

    /// Attach an action link
    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    /// Counterparty learns that a negotiation was opened with them
    pub fn negotiation_opened(negotiation: &Negotiation, now: DateTime<Utc>) -> Self {
        let offer = negotiation.current_offer();
        let recipient = negotiation.participant(offer.from.counterparty());
        Self::new(
            NotificationKind::Negotiation,
            recipient,
            "New negotiation",
            format!("You received an offer of {}", offer.price),
            now,
        )
        .with_action_url(negotiation_url(negotiation))
    }

    /// Counterparty learns about a counter-offer
    pub fn counter_offer(negotiation: &Negotiation, now: DateTime<Utc>) -> Self {
        let offer = negotiation.current_offer();
        let recipient = negotiation.participant(offer.from.counterparty());
        Self::new(
            NotificationKind::Negotiation,
            recipient,
            "New counter-offer",
            format!(
                "Counter-offer of {} (round {} of {})",
                offer.price,
                negotiation.round(),
                negotiation.max_rounds
            ),
            now,
        )
        .with_action_url(negotiation_url(negotiation))
    }

    /// Both parties learn that the deal was accepted
    pub fn deal_accepted(negotiation: &Negotiation, escrow: &Escrow, now: DateTime<Utc>) -> Vec<Self> {
        [negotiation.buyer_id, negotiation.seller_id]
            .into_iter()
            .map(|user| {
                Self::new(
                    NotificationKind::Deal,
                    user,
                    "Deal accepted",
                    format!("{} {} is now held in escrow", escrow.amount, escrow.currency),
                    now,
                )
                .with_action_url(negotiation_url(negotiation))
            })
            .collect()
    }

    /// The counterparty of the rejecting party learns about the rejection
    pub fn negotiation_rejected(negotiation: &Negotiation, rejected_by: Party, now: DateTime<Utc>) -> Self {
        Self::new(
            NotificationKind::Negotiation,
            negotiation.participant(rejected_by.counterparty()),
            "Offer rejected",
            format!("The {} rejected the negotiation", rejected_by),
            now,
        )
        .with_action_url(negotiation_url(negotiation))
    }

    /// Both parties learn that the negotiation expired
    pub fn negotiation_expired(negotiation: &Negotiation, now: DateTime<Utc>) -> Vec<Self> {
        [negotiation.buyer_id, negotiation.seller_id]
            .into_iter()
            .map(|user| {
                Self::new(
                    NotificationKind::Deadline,
                    user,
                    "Negotiation expired",
                    format!("Negotiation for job {} expired without a deal", negotiation.job_id),
                    now,
                )
            })
            .collect()
    }

    /// Buyer learns that accepting would break a wallet limit
    pub fn limit_reached(buyer_id: UserId, reason: &impl fmt::Display, now: DateTime<Utc>) -> Self {
        Self::new(
            NotificationKind::Approval,
            buyer_id,
            "Spending limit reached",
            reason.to_string(),
            now,
        )
        .with_action_url("/wallet")
    }

    /// Seller learns that escrowed funds were paid out
    pub fn payment_released(escrow: &Escrow, now: DateTime<Utc>) -> Self {
        Self::new(
            NotificationKind::Deal,
            escrow.seller_id,
            "Payment released",
            format!("{} {} was released to your wallet", escrow.amount, escrow.currency),
            now,
        )
        .with_action_url("/wallet")
    }

    /// Buyer learns that escrowed funds came back
    pub fn escrow_refunded(escrow: &Escrow, now: DateTime<Utc>) -> Self {
        Self::new(
            NotificationKind::Deal,
            escrow.buyer_id,
            "Escrow refunded",
            format!("{} {} was returned to your wallet", escrow.amount, escrow.currency),
            now,
        )
        .with_action_url("/wallet")
    }
}

fn negotiation_url(negotiation: &Negotiation) -> String {
    format!("/negotiations/{}", negotiation.id)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::{NegotiationOffer, OfferDraft};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn negotiation() -> Negotiation {
        let draft = OfferDraft {
            price: dec!(50000),
            start_date: NaiveDate::from_ymd_opt(2026, 2, 15).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 5, 15).unwrap(),
            payment_schedule: "milestones".to_string(),
            terms: String::new(),
        };
        let offer = NegotiationOffer::from_draft(draft, Party::Buyer, Utc::now()).unwrap();
        Negotiation::open(Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7(), offer, 5, Utc::now()).unwrap()
    }

    #[test]
    fn test_opened_goes_to_counterparty() {
        let negotiation = negotiation();
        let notification = Notification::negotiation_opened(&negotiation, Utc::now());

        assert_eq!(notification.user_id, negotiation.seller_id);
        assert_eq!(notification.kind, NotificationKind::Negotiation);
        assert!(notification.action_url.unwrap().contains(&negotiation.id.to_string()));
    }

    #[test]
    fn test_expired_goes_to_both_parties() {
        let negotiation = negotiation();
        let notifications = Notification::negotiation_expired(&negotiation, Utc::now());

        let users: Vec<_> = notifications.iter().map(|n| n.user_id).collect();
        assert_eq!(users, vec![negotiation.buyer_id, negotiation.seller_id]);
        assert!(notifications.iter().all(|n| n.kind == NotificationKind::Deadline));
    }

    #[test]
    fn test_wire_format_uses_type_field() {
        let notification = Notification::new(
            NotificationKind::Approval,
            Uuid::now_v7(),
            "Spending limit reached",
            "Daily limit exceeded",
            Utc::now(),
        );
        let json = serde_json::to_value(&notification).unwrap();

        assert_eq!(json["type"], "approval");
        assert!(json.get("action_url").is_none());
    }
}
