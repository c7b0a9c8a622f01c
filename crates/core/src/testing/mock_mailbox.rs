//! Mock mailbox for testing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::mailbox::{
    ConnectionNotification, MailItem, MailNotification, MailboxError, MailboxService,
    NotificationKind, StreamingConnection, SubscriptionHandle,
};
use crate::settings::MailCredentials;

#[derive(Default)]
struct MockMailboxState {
    items: HashMap<String, MailItem>,
    sender: Option<mpsc::Sender<ConnectionNotification>>,
    subscribe_calls: u32,
    open_calls: u32,
    failing_connects: u32,
    subscribe_delay: Option<Duration>,
}

/// Mock implementation of the MailboxService trait.
///
/// Provides controllable behavior for testing:
/// - Deliver mails to the open connection
/// - Drop the connection as the remote side would
/// - Fail upcoming subscribe attempts or make them slow
/// - Count subscribe and open calls
#[derive(Clone, Default)]
pub struct MockMailbox {
    state: Arc<RwLock<MockMailboxState>>,
}

impl std::fmt::Debug for MockMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockMailbox").finish_non_exhaustive()
    }
}

impl MockMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the item and notify the open connection. `false` when nothing
    /// is listening.
    pub async fn deliver(&self, item: MailItem) -> bool {
        let notification = ConnectionNotification::Event(MailNotification {
            item_id: item.item_id.clone(),
            kind: NotificationKind::NewMail,
        });
        let sender = {
            let mut state = self.state.write().await;
            state.items.insert(item.item_id.clone(), item);
            state.sender.clone()
        };
        match sender {
            Some(sender) => sender.send(notification).await.is_ok(),
            None => false,
        }
    }

    /// Report a remote disconnect and close the stream.
    pub async fn disconnect(&self, reason: &str) {
        let sender = self.state.write().await.sender.take();
        if let Some(sender) = sender {
            let _ = sender
                .send(ConnectionNotification::Disconnected {
                    reason: Some(reason.to_string()),
                })
                .await;
        }
    }

    /// Report a non-fatal connection error.
    pub async fn report_error(&self, message: &str) {
        let sender = self.state.read().await.sender.clone();
        if let Some(sender) = sender {
            let _ = sender
                .send(ConnectionNotification::Error(message.to_string()))
                .await;
        }
    }

    /// Make the next `count` subscribe calls fail.
    pub async fn fail_next_connects(&self, count: u32) {
        self.state.write().await.failing_connects = count;
    }

    pub async fn set_subscribe_delay(&self, delay: Duration) {
        self.state.write().await.subscribe_delay = Some(delay);
    }

    pub async fn subscribe_count(&self) -> u32 {
        self.state.read().await.subscribe_calls
    }

    pub async fn open_count(&self) -> u32 {
        self.state.read().await.open_calls
    }

    pub async fn is_connected(&self) -> bool {
        self.state
            .read()
            .await
            .sender
            .as_ref()
            .is_some_and(|s| !s.is_closed())
    }

    /// Poll until at least `count` connections were opened.
    pub async fn wait_for_opens(&self, count: u32, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.open_count().await >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl MailboxService for MockMailbox {
    async fn subscribe(
        &self,
        _creds: &MailCredentials,
        folder: &str,
        kinds: &[NotificationKind],
    ) -> Result<SubscriptionHandle, MailboxError> {
        let delay = {
            let mut state = self.state.write().await;
            state.subscribe_calls += 1;
            state.subscribe_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(MailboxError::Unavailable("mock mailbox offline".to_string()));
        }

        Ok(SubscriptionHandle {
            id: format!("sub-{}", state.subscribe_calls),
            folder: folder.to_string(),
            kinds: kinds.to_vec(),
        })
    }

    async fn open_streaming_connection(
        &self,
        _handle: &SubscriptionHandle,
    ) -> Result<StreamingConnection, MailboxError> {
        let mut state = self.state.write().await;
        state.open_calls += 1;
        let (sender, notifications) = mpsc::channel(32);
        state.sender = Some(sender);
        Ok(StreamingConnection {
            id: format!("conn-{}", state.open_calls),
            notifications,
        })
    }

    async fn bind(
        &self,
        _handle: &SubscriptionHandle,
        item_id: &str,
    ) -> Result<MailItem, MailboxError> {
        self.state
            .read()
            .await
            .items
            .get(item_id)
            .cloned()
            .ok_or_else(|| MailboxError::ItemNotFound(item_id.to_string()))
    }
}
