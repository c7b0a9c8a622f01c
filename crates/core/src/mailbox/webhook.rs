//! Mailbox fed by push notifications POSTed to the server.
//!
//! The mail system (or a relay in front of it) delivers each new mail to the
//! ingest endpoint. Items are held until the listener binds them, and only
//! while a streaming connection is open; mail arriving with no open
//! connection is discarded, as the real subscription would not have seen it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::settings::MailCredentials;

use super::{
    ConnectionNotification, MailItem, MailNotification, MailboxError, MailboxService,
    NotificationKind, StreamingConnection, SubscriptionHandle,
};

/// Body of an ingest request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMail {
    /// Generated when absent.
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub item_id: String,
    /// `false` when no connection was open or the folder is not watched.
    pub delivered: bool,
}

struct Connection {
    subscription: SubscriptionHandle,
    sender: mpsc::Sender<ConnectionNotification>,
}

#[derive(Default)]
struct State {
    /// Only the latest subscription is live; subscribing again supersedes it.
    subscription: Option<SubscriptionHandle>,
    connection: Option<Connection>,
    items: HashMap<String, MailItem>,
}

#[derive(Clone)]
pub struct WebhookMailbox {
    state: Arc<Mutex<State>>,
    buffer: usize,
}

impl WebhookMailbox {
    pub fn new(buffer: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            buffer: buffer.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_connected(&self) -> bool {
        self.lock()
            .connection
            .as_ref()
            .is_some_and(|c| !c.sender.is_closed())
    }

    /// Accept one pushed mail and notify the open connection.
    pub fn ingest(&self, mail: InboundMail) -> IngestReceipt {
        let item_id = mail
            .item_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut state = self.lock();
        let Some(connection) = state.connection.as_ref() else {
            debug!(item_id = %item_id, "No open mailbox connection, discarding mail");
            return IngestReceipt {
                item_id,
                delivered: false,
            };
        };

        let watched = mail
            .folder
            .as_deref()
            .is_none_or(|f| f.eq_ignore_ascii_case(&connection.subscription.folder));
        if !watched {
            debug!(item_id = %item_id, "Mail is for an unwatched folder");
            return IngestReceipt {
                item_id,
                delivered: false,
            };
        }

        let notification = ConnectionNotification::Event(MailNotification {
            item_id: item_id.clone(),
            kind: NotificationKind::NewMail,
        });
        if let Err(e) = connection.sender.try_send(notification) {
            warn!(item_id = %item_id, "Mailbox connection cannot take the notification: {}", e);
            return IngestReceipt {
                item_id,
                delivered: false,
            };
        }

        state.items.insert(
            item_id.clone(),
            MailItem {
                item_id: item_id.clone(),
                subject: mail.subject,
                body: mail.body,
            },
        );

        IngestReceipt {
            item_id,
            delivered: true,
        }
    }

    /// Drop the open connection and its subscription, telling the listener
    /// why.
    pub fn disconnect(&self, reason: impl Into<String>) {
        let connection = {
            let mut state = self.lock();
            state.subscription = None;
            state.connection.take()
        };
        if let Some(connection) = connection {
            let reason = reason.into();
            info!(reason = %reason, "Dropping mailbox connection");
            let _ = connection
                .sender
                .try_send(ConnectionNotification::Disconnected {
                    reason: Some(reason),
                });
        }
    }
}

#[async_trait]
impl MailboxService for WebhookMailbox {
    async fn subscribe(
        &self,
        creds: &MailCredentials,
        folder: &str,
        kinds: &[NotificationKind],
    ) -> Result<SubscriptionHandle, MailboxError> {
        if creds.address.trim().is_empty() {
            return Err(MailboxError::AuthenticationFailed(
                "mailbox address is empty".to_string(),
            ));
        }

        let handle = SubscriptionHandle {
            id: Uuid::new_v4().to_string(),
            folder: folder.to_string(),
            kinds: kinds.to_vec(),
        };
        self.lock().subscription = Some(handle.clone());
        debug!(subscription = %handle.id, folder = %folder, "Subscribed");
        Ok(handle)
    }

    async fn open_streaming_connection(
        &self,
        handle: &SubscriptionHandle,
    ) -> Result<StreamingConnection, MailboxError> {
        let mut state = self.lock();
        let subscription = state
            .subscription
            .as_ref()
            .filter(|current| current.id == handle.id)
            .cloned()
            .ok_or_else(|| MailboxError::Unavailable(format!("unknown subscription {}", handle.id)))?;

        let (sender, notifications) = mpsc::channel(self.buffer);
        // Replacing the sender closes any previous stream.
        state.connection = Some(Connection {
            subscription,
            sender,
        });
        state.items.clear();

        Ok(StreamingConnection {
            id: Uuid::new_v4().to_string(),
            notifications,
        })
    }

    async fn bind(
        &self,
        _handle: &SubscriptionHandle,
        item_id: &str,
    ) -> Result<MailItem, MailboxError> {
        self.lock()
            .items
            .remove(item_id)
            .ok_or_else(|| MailboxError::ItemNotFound(item_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> MailCredentials {
        MailCredentials {
            address: "desk@example.com".to_string(),
            password: "x".to_string(),
        }
    }

    fn inbound(subject: &str) -> InboundMail {
        InboundMail {
            item_id: None,
            folder: None,
            subject: subject.to_string(),
            body: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_ingest_without_connection_is_not_delivered() {
        let mailbox = WebhookMailbox::new(8);
        let receipt = mailbox.ingest(inbound("New issue #1"));
        assert!(!receipt.delivered);
        assert!(!receipt.item_id.is_empty());
    }

    #[tokio::test]
    async fn test_ingest_notifies_and_bind_returns_item() {
        let mailbox = WebhookMailbox::new(8);
        let handle = mailbox
            .subscribe(&creds(), "Inbox", &[NotificationKind::NewMail])
            .await
            .unwrap();
        let mut connection = mailbox.open_streaming_connection(&handle).await.unwrap();
        assert!(mailbox.is_connected());

        let receipt = mailbox.ingest(InboundMail {
            item_id: Some("abc".to_string()),
            ..inbound("New issue #1")
        });
        assert!(receipt.delivered);

        match connection.notifications.recv().await.unwrap() {
            ConnectionNotification::Event(n) => assert_eq!(n.item_id, "abc"),
            other => panic!("unexpected notification: {:?}", other),
        }

        let item = mailbox.bind(&handle, "abc").await.unwrap();
        assert_eq!(item.subject, "New issue #1");
        assert!(matches!(
            mailbox.bind(&handle, "abc").await,
            Err(MailboxError::ItemNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unwatched_folder_is_skipped() {
        let mailbox = WebhookMailbox::new(8);
        let handle = mailbox.subscribe(&creds(), "Inbox", &[]).await.unwrap();
        let _connection = mailbox.open_streaming_connection(&handle).await.unwrap();

        let receipt = mailbox.ingest(InboundMail {
            folder: Some("Spam".to_string()),
            ..inbound("New issue #1")
        });
        assert!(!receipt.delivered);

        let receipt = mailbox.ingest(InboundMail {
            folder: Some("inbox".to_string()),
            ..inbound("New issue #2")
        });
        assert!(receipt.delivered);
    }

    #[tokio::test]
    async fn test_disconnect_reports_reason() {
        let mailbox = WebhookMailbox::new(8);
        let handle = mailbox.subscribe(&creds(), "Inbox", &[]).await.unwrap();
        let mut connection = mailbox.open_streaming_connection(&handle).await.unwrap();

        mailbox.disconnect("maintenance");
        assert_eq!(
            connection.notifications.recv().await,
            Some(ConnectionNotification::Disconnected {
                reason: Some("maintenance".to_string())
            })
        );
        assert_eq!(connection.notifications.recv().await, None);
        assert!(!mailbox.is_connected());
    }

    #[tokio::test]
    async fn test_resubscribe_supersedes_previous_subscription() {
        let mailbox = WebhookMailbox::new(8);
        let mut previous = None;
        for _ in 0..50 {
            let handle = mailbox.subscribe(&creds(), "Inbox", &[]).await.unwrap();
            let _connection = mailbox.open_streaming_connection(&handle).await.unwrap();
            previous = Some(handle);
        }
        let latest = previous.unwrap();

        {
            let state = mailbox.lock();
            assert_eq!(state.subscription.as_ref().map(|s| s.id.as_str()), Some(latest.id.as_str()));
        }

        let stale = mailbox.subscribe(&creds(), "Inbox", &[]).await.unwrap();
        let current = mailbox.subscribe(&creds(), "Inbox", &[]).await.unwrap();
        assert!(matches!(
            mailbox.open_streaming_connection(&stale).await,
            Err(MailboxError::Unavailable(_))
        ));
        assert!(mailbox.open_streaming_connection(&current).await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnect_forgets_subscription() {
        let mailbox = WebhookMailbox::new(8);
        let handle = mailbox.subscribe(&creds(), "Inbox", &[]).await.unwrap();
        let _connection = mailbox.open_streaming_connection(&handle).await.unwrap();

        mailbox.disconnect("maintenance");
        assert!(mailbox.lock().subscription.is_none());
        assert!(matches!(
            mailbox.open_streaming_connection(&handle).await,
            Err(MailboxError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_address_fails_subscribe() {
        let mailbox = WebhookMailbox::new(8);
        let creds = MailCredentials {
            address: " ".to_string(),
            password: String::new(),
        };
        assert!(matches!(
            mailbox.subscribe(&creds, "Inbox", &[]).await,
            Err(MailboxError::AuthenticationFailed(_))
        ));
    }
}
