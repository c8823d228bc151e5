//! Agora Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains entities, value objects, the negotiation state machine and
//! notification events.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod events;
pub mod negotiation;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    Escrow, EscrowId, EscrowStatus, Job, JobId, JobStatus, Transaction, TransactionId,
    TransactionKind, UserId, Wallet, WalletId,
};
pub use events::{Notification, NotificationId, NotificationKind};
pub use negotiation::{
    CandidateStatus, Negotiation, NegotiationId, NegotiationOffer, NegotiationStatus, OfferDraft,
    OfferId, Party,
};
pub use value_objects::{Currency, DomainError, Money, TurnPolicy};
