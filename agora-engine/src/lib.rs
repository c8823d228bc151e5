//! Agora Settlement Engine
//!
//! The negotiation state machine and the escrow controller it drives.
//!
//! # Architecture
//!
//! ```text
//! caller → NegotiationEngine → EscrowController → WalletLedger → Store
//!                 │                    │
//!                 └── JobRegistry ─────┴── EventSink (fire-and-forget)
//! ```
//!
//! # Components
//!
//! - **Ports**: Traits for the job registry, notification delivery and time
//! - **EscrowController**: hold / release / refund with compensation
//! - **NegotiationEngine**: bounded offer/counter-offer rounds per (job, seller)
//! - **Marketplace**: the service facade wiring it all over one store
//! - **Stub**: In-process collaborators for tests and development
//!
//! # Example
//!
//! ```rust,ignore
//! use agora_engine::{Collaborators, Marketplace, MarketplaceConfig, MemoryJobRegistry, RecordingEventSink, SystemClock};
//! use agora_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let marketplace = Marketplace::new(
//!     Arc::new(MemoryStore::new()),
//!     Collaborators {
//!         jobs: Arc::new(MemoryJobRegistry::new()),
//!         events: Arc::new(RecordingEventSink::new()),
//!         clock: Arc::new(SystemClock),
//!     },
//!     MarketplaceConfig::default(),
//! );
//!
//! let (negotiation, escrow) = marketplace.accept_offer(negotiation_id, buyer_id).await?;
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod escrow;
pub mod negotiation;
pub mod ports;
pub mod service;
pub mod stub;

// Re-exports for convenience
pub use error::{EngineError, EngineResult, ErrorKind};
pub use escrow::EscrowController;
pub use negotiation::{CandidateView, NegotiationConfig, NegotiationEngine, OpenNegotiation};
pub use ports::{Clock, EventSink, JobRegistry, SystemClock};
pub use service::{Collaborators, Marketplace, MarketplaceConfig};
pub use stub::{ManualClock, MemoryJobRegistry, RecordingEventSink};
