//! Collaborator port definitions.
//!
//! Ports define the interfaces for services outside the settlement core
//! (job registry, notification delivery, time). Adapters implement these
//! ports for specific services (in-process stub, daemon event bus, etc.).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use agora_domain::{Job, JobId, JobStatus, Notification};

use crate::error::EngineError;

// =============================================================================
// Job Registry Port
// =============================================================================

/// Port for the external job registry.
///
/// Implementations:
/// - `MemoryJobRegistry` - In-process registry (tests, default daemon)
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Read job metadata (budget, deadline, status).
    ///
    /// Returns `Ok(None)` if the registry does not know the job.
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, EngineError>;

    /// Record a job status change.
    ///
    /// Called only on acceptance (`InProgress`) and completion (`Completed`).
    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), EngineError>;
}

// =============================================================================
// Event Sink Port
// =============================================================================

/// Port for notification delivery.
///
/// `publish` is fire-and-forget: it must not block, and a failure is only
/// logged by the caller. It never undoes a committed change.
pub trait EventSink: Send + Sync {
    /// Hand a notification to the delivery layer.
    fn publish(&self, notification: Notification) -> Result<(), EngineError>;
}

/// Publish and log; delivery failures never propagate.
pub(crate) fn deliver(sink: &dyn EventSink, notification: Notification) {
    let user_id = notification.user_id;
    let kind = notification.kind;

    match sink.publish(notification) {
        Ok(()) => debug!(%user_id, %kind, "Notification published"),
        Err(e) => warn!(%user_id, %kind, error = %e, "Notification delivery failed"),
    }
}

// =============================================================================
// Clock Port
// =============================================================================

/// Source of "now" for deadline checks and timestamps.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
