//! Scheduler: the system-triggered transitions.
//!
//! Two jobs share one background task:
//! - every `expiry_sweep_secs`, expire pending negotiations whose job
//!   deadline has passed
//! - at each daily boundary, zero `daily_spent` on every wallet
//!
//! Both are idempotent, so a sweep that races a request or runs twice
//! changes nothing extra.

use std::sync::Arc;
use std::time::Duration;

use agora_engine::{Clock, Marketplace};
use agora_store::Store;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{DailyReset, SchedulerConfig};

/// Background task driving expiry and daily-limit rollover.
pub struct Scheduler<S: Store + 'static> {
    marketplace: Arc<Marketplace<S>>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    cancel: CancellationToken,
}

impl<S: Store + 'static> Scheduler<S> {
    /// Create a scheduler; it stops when `cancel` fires.
    pub fn new(
        marketplace: Arc<Marketplace<S>>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            marketplace,
            clock,
            config,
            cancel,
        }
    }

    /// Next daily boundary strictly after `last_reset`.
    pub fn next_reset(policy: DailyReset, last_reset: DateTime<Utc>) -> DateTime<Utc> {
        match policy {
            DailyReset::CalendarUtc => {
                let next_day = last_reset.date_naive() + ChronoDuration::days(1);
                next_day.and_hms_opt(0, 0, 0).map(|t| t.and_utc()).unwrap_or(last_reset + ChronoDuration::days(1))
            },
            DailyReset::Rolling24h => last_reset + ChronoDuration::hours(24),
        }
    }

    /// Run one expiry sweep. Returns how many negotiations expired.
    pub async fn sweep_expired(&self) -> usize {
        match self.marketplace.expire_overdue().await {
            Ok(expired) => {
                if !expired.is_empty() {
                    info!(count = expired.len(), "Expiry sweep expired negotiations");
                }
                expired.len()
            },
            Err(e) => {
                error!(error = %e, "Expiry sweep failed");
                0
            },
        }
    }

    /// Reset daily limits if the boundary after `last_reset` has passed.
    ///
    /// Returns the new reset mark.
    pub async fn maybe_reset_daily(&self, last_reset: DateTime<Utc>) -> DateTime<Utc> {
        let now = self.clock.now();
        let due = Self::next_reset(self.config.daily_reset, last_reset);
        if now < due {
            return last_reset;
        }

        match self.marketplace.reset_daily_limits().await {
            Ok(count) => {
                info!(wallets = count, policy = ?self.config.daily_reset, "Daily limits reset");
                match self.config.daily_reset {
                    DailyReset::CalendarUtc => now,
                    DailyReset::Rolling24h => due,
                }
            },
            Err(e) => {
                error!(error = %e, "Daily limit reset failed");
                last_reset
            },
        }
    }

    /// Start the scheduler in the background.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = Duration::from_secs(self.config.expiry_sweep_secs);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_reset = self.clock.now();

            info!(
                sweep_secs = self.config.expiry_sweep_secs,
                daily_reset = ?self.config.daily_reset,
                "Scheduler started"
            );

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        debug!("Scheduler tick");
                        self.sweep_expired().await;
                        last_reset = self.maybe_reset_daily(last_reset).await;
                    }
                }
            }

            info!("Scheduler stopped");
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
