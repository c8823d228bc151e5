//! Test fixtures for Agora settlement tests.
//!
//! Provides a fully wired in-memory marketplace with controllable
//! collaborators, plus seeding helpers for wallets, jobs and negotiations.

mod helpers;

pub use helpers::{offer, offer_dated, Parties, WalletSeed};

use std::sync::Arc;

use agora_engine::{Collaborators, ManualClock, Marketplace, MarketplaceConfig, MemoryJobRegistry, RecordingEventSink};
use agora_store::MemoryStore;
use chrono::{DateTime, TimeZone, Utc};

/// Result type for fixtures.
pub type Result<T> = anyhow::Result<T>;

/// Fixed start instant so deadline arithmetic is reproducible.
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).single().unwrap_or_else(Utc::now)
}

/// An in-memory marketplace with handles on every collaborator.
pub struct TestMarket {
    pub marketplace: Arc<Marketplace<MemoryStore>>,
    pub store: Arc<MemoryStore>,
    pub jobs: Arc<MemoryJobRegistry>,
    pub events: Arc<RecordingEventSink>,
    pub clock: Arc<ManualClock>,
}

impl TestMarket {
    /// Marketplace with default configuration.
    pub fn new() -> Self {
        Self::with_config(MarketplaceConfig::default())
    }

    /// Marketplace with a custom configuration.
    pub fn with_config(config: MarketplaceConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let jobs = Arc::new(MemoryJobRegistry::new());
        let events = Arc::new(RecordingEventSink::new());
        let clock = Arc::new(ManualClock::new(epoch()));

        let marketplace = Arc::new(Marketplace::new(
            store.clone(),
            Collaborators {
                jobs: jobs.clone(),
                events: events.clone(),
                clock: clock.clone(),
            },
            config,
        ));

        Self {
            marketplace,
            store,
            jobs,
            events,
            clock,
        }
    }
}

impl Default for TestMarket {
    fn default() -> Self {
        Self::new()
    }
}
