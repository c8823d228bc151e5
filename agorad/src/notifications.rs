//! Per-user notification inbox.
//!
//! Subscribes to the event bus and keeps every notification with a `read`
//! flag, newest last. The inbox is a read model: losing it loses no
//! settlement state.

use std::collections::HashMap;
use std::sync::Arc;

use agora_domain::{Notification, NotificationId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DaemonError, DaemonResult};
use crate::event_bus::{DaemonEvent, EventBus};

/// A notification as shown in a user's inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    #[serde(flatten)]
    pub notification: Notification,
    pub read: bool,
}

#[derive(Default)]
struct InboxState {
    entries: Vec<InboxEntry>,
    index: HashMap<NotificationId, usize>,
}

/// In-memory notification inbox.
#[derive(Default)]
pub struct NotificationInbox {
    state: RwLock<InboxState>,
}

impl NotificationInbox {
    /// Create an empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a notification as unread. Duplicates are ignored.
    pub async fn record(&self, notification: Notification) {
        let mut state = self.state.write().await;

        if state.index.contains_key(&notification.id) {
            return;
        }
        let position = state.entries.len();
        state.index.insert(notification.id, position);
        state.entries.push(InboxEntry {
            notification,
            read: false,
        });
    }

    /// All notifications of a user, oldest first.
    pub async fn for_user(&self, user_id: UserId) -> Vec<InboxEntry> {
        self.state
            .read()
            .await
            .entries
            .iter()
            .filter(|e| e.notification.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Unread notifications of a user, oldest first.
    pub async fn unread_for_user(&self, user_id: UserId) -> Vec<InboxEntry> {
        self.for_user(user_id).await.into_iter().filter(|e| !e.read).collect()
    }

    /// Mark a notification as read. Marking twice is a no-op.
    pub async fn mark_read(&self, notification_id: NotificationId) -> DaemonResult<InboxEntry> {
        self.mark_read_as(None, notification_id).await
    }

    /// Mark one of `user_id`'s notifications as read.
    ///
    /// Another user's notification reports as not found.
    pub async fn mark_read_for(&self, user_id: UserId, notification_id: NotificationId) -> DaemonResult<InboxEntry> {
        self.mark_read_as(Some(user_id), notification_id).await
    }

    async fn mark_read_as(&self, owner: Option<UserId>, notification_id: NotificationId) -> DaemonResult<InboxEntry> {
        let mut state = self.state.write().await;
        let position = *state
            .index
            .get(&notification_id)
            .ok_or(DaemonError::NotificationNotFound(notification_id))?;

        let entry = state
            .entries
            .get_mut(position)
            .filter(|e| owner.map_or(true, |user_id| e.notification.user_id == user_id))
            .ok_or(DaemonError::NotificationNotFound(notification_id))?;
        entry.read = true;
        Ok(entry.clone())
    }

    /// Number of stored notifications.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    /// Check if the inbox is empty.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    /// Consume notifications from the bus until cancelled or shut down.
    pub fn start(self: Arc<Self>, bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let mut receiver = bus.subscribe();

        tokio::spawn(async move {
            info!("Notification inbox started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = receiver.recv() => match event {
                        Some(Ok(DaemonEvent::Notification(notification))) => {
                            debug!(
                                notification_id = %notification.id,
                                user_id = %notification.user_id,
                                kind = %notification.kind,
                                "Notification stored"
                            );
                            self.record(notification).await;
                        },
                        Some(Ok(DaemonEvent::Shutdown)) | None => break,
                        Some(Err(lag_msg)) => warn!(%lag_msg, "Notification inbox lagged"),
                    },
                }
            }

            info!("Notification inbox stopped");
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
