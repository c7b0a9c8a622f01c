use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::settings::MailCredentials;

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Mailbox authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Mailbox unavailable: {0}")]
    Unavailable(String),

    #[error("Connection is already open")]
    AlreadyOpen,

    #[error("Mail item not found: {0}")]
    ItemNotFound(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Mailbox event kinds a subscription can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMail,
    Created,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: String,
    pub folder: String,
    pub kinds: Vec<NotificationKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailNotification {
    pub item_id: String,
    pub kind: NotificationKind,
}

/// What a streaming connection reports. A closed channel counts as a
/// disconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionNotification {
    Event(MailNotification),
    Disconnected { reason: Option<String> },
    Error(String),
}

pub struct StreamingConnection {
    pub id: String,
    pub notifications: mpsc::Receiver<ConnectionNotification>,
}

impl std::fmt::Debug for StreamingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingConnection")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailItem {
    pub item_id: String,
    pub subject: String,
    pub body: String,
}

/// A mail whose subject announced a new issue, handed to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEvent {
    pub item_id: String,
    pub subject: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl From<MailItem> for CandidateEvent {
    fn from(item: MailItem) -> Self {
        Self {
            item_id: item.item_id,
            subject: item.subject,
            body: item.body,
            received_at: Utc::now(),
        }
    }
}

/// Push-notification mailbox.
#[async_trait]
pub trait MailboxService: Send + Sync {
    async fn subscribe(
        &self,
        creds: &MailCredentials,
        folder: &str,
        kinds: &[NotificationKind],
    ) -> Result<SubscriptionHandle, MailboxError>;

    async fn open_streaming_connection(
        &self,
        handle: &SubscriptionHandle,
    ) -> Result<StreamingConnection, MailboxError>;

    /// Load the item a notification refers to.
    async fn bind(&self, handle: &SubscriptionHandle, item_id: &str)
        -> Result<MailItem, MailboxError>;
}
