//! Agora Daemon Library
//!
//! Runtime host for the Agora settlement core.
//!
//! # Architecture
//!
//! ```text
//! HTTP API → Marketplace → Ledger / Escrow / Negotiations → Store
//!                 │
//!                 └─ notifications → Event Bus → Notification Inbox
//!                                        ↑
//!                 Scheduler (expiry sweep, daily reset)
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **Scheduler**: Expires overdue negotiations, rolls daily limits over
//! - **Event Bus**: Fan-out of notifications from the settlement core
//! - **Notification Inbox**: Per-user notifications with read flags
//! - **API**: HTTP endpoints for the marketplace front end
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use agorad::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     Daemon::new(config).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event_bus;
pub mod notifications;
pub mod scheduler;

// Re-exports for convenience
pub use api::{create_router, ApiState, ErrorResponse, ACTOR_HEADER};
pub use config::{ApiConfig, Config, DailyReset, Environment, LogFormat, SchedulerConfig, SettlementConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{DaemonEvent, EventBus, EventReceiver};
pub use notifications::{InboxEntry, NotificationInbox};
pub use scheduler::Scheduler;
