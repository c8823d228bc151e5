//! Daemon error types.

use agora_engine::EngineError;
use thiserror::Error;
use uuid::Uuid;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Settlement core error
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Notification not found in the inbox
    #[error("Notification not found: {0}")]
    NotificationNotFound(Uuid),

    /// Malformed request (missing actor header, bad body)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Socket or runtime I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown requested
    #[error("Shutdown requested")]
    Shutdown,
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
