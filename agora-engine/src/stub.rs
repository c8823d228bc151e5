//! Stub implementations for testing.
//!
//! These implementations simulate the job registry, notification delivery
//! and time without talking to real services.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use agora_domain::{Job, JobId, JobStatus, Notification, UserId};

use crate::error::EngineError;
use crate::ports::{Clock, EventSink, JobRegistry};

// =============================================================================
// Memory Job Registry
// =============================================================================

/// In-process job registry.
///
/// Used by tests and by the daemon when no external registry is wired.
pub struct MemoryJobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
    /// Whether the next `set_status` should fail
    fail_next_update: RwLock<bool>,
    /// Jobs whose lookups fail until cleared
    unreachable: RwLock<HashSet<JobId>>,
}

impl MemoryJobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            fail_next_update: RwLock::new(false),
            unreachable: RwLock::new(HashSet::new()),
        }
    }

    /// Register (or replace) a job.
    pub fn register(&self, job: Job) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(job.id, job);
    }

    /// Snapshot of a job.
    pub fn job(&self, job_id: JobId) -> Option<Job> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(&job_id).cloned()
    }

    /// Configure the next status update to fail.
    pub fn set_fail_next_update(&self, fail: bool) {
        let mut flag = self.fail_next_update.write().unwrap_or_else(|e| e.into_inner());
        *flag = fail;
    }

    /// Make every lookup of `job_id` fail (or succeed again).
    pub fn set_lookup_failing(&self, job_id: JobId, failing: bool) {
        let mut unreachable = self.unreachable.write().unwrap_or_else(|e| e.into_inner());
        if failing {
            unreachable.insert(job_id);
        } else {
            unreachable.remove(&job_id);
        }
    }

    fn should_fail(&self) -> bool {
        let mut flag = self.fail_next_update.write().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *flag)
    }
}

impl Default for MemoryJobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRegistry for MemoryJobRegistry {
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, EngineError> {
        if self.unreachable.read().unwrap_or_else(|e| e.into_inner()).contains(&job_id) {
            return Err(EngineError::Collaborator(format!("Simulated lookup failure for job {}", job_id)));
        }
        Ok(self.job(job_id))
    }

    async fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), EngineError> {
        if self.should_fail() {
            return Err(EngineError::Collaborator("Simulated job registry failure".to_string()));
        }

        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let job = jobs.get_mut(&job_id).ok_or_else(|| EngineError::not_found("Job", job_id))?;
        job.status = status;
        Ok(())
    }
}

// =============================================================================
// Recording Event Sink
// =============================================================================

/// Event sink that keeps every published notification in memory.
pub struct RecordingEventSink {
    published: RwLock<Vec<Notification>>,
    /// Whether every publish should fail
    failing: RwLock<bool>,
}

impl RecordingEventSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self {
            published: RwLock::new(Vec::new()),
            failing: RwLock::new(false),
        }
    }

    /// Make every subsequent publish fail.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.write().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    /// All notifications published so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.published.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Notifications addressed to one user.
    pub fn for_user(&self, user_id: UserId) -> Vec<Notification> {
        self.notifications().into_iter().filter(|n| n.user_id == user_id).collect()
    }
}

impl Default for RecordingEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for RecordingEventSink {
    fn publish(&self, notification: Notification) -> Result<(), EngineError> {
        if *self.failing.read().unwrap_or_else(|e| e.into_inner()) {
            return Err(EngineError::Collaborator("Simulated delivery failure".to_string()));
        }

        self.published.write().unwrap_or_else(|e| e.into_inner()).push(notification);
        Ok(())
    }
}

// =============================================================================
// Manual Clock
// =============================================================================

/// Clock that only moves when told to.
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at a fixed instant.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: RwLock::new(start) }
    }

    /// Jump to an instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = instant;
    }

    /// Move forward by a duration.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Tests
// =============================================================================
