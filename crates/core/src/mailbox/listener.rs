use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::activity::LogDispatcher;
use crate::config::AutomationConfig;
use crate::engine::{ServiceState, ServiceStatus};
use crate::metrics::{MAILBOX_EVENTS, MAILBOX_RECONNECTS};
use crate::settings::SettingsSnapshot;

use super::{
    CandidateEvent, ConnectionNotification, MailNotification, MailboxError, MailboxService,
    NotificationKind, StreamingConnection, SubscriptionHandle,
};

#[derive(Debug, Clone)]
pub struct ListenerSettings {
    pub folder: String,
    pub reconnect_max_attempts: u32,
    pub reconnect_base_delay: Duration,
}

impl From<&AutomationConfig> for ListenerSettings {
    fn from(config: &AutomationConfig) -> Self {
        Self {
            folder: config.mail_folder.clone(),
            reconnect_max_attempts: config.reconnect_max_attempts.max(1),
            reconnect_base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
        }
    }
}

/// Unrecoverable listener failure; the session cannot continue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerFault {
    #[error("Mailbox reconnect failed after {attempts} attempts: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },
}

struct Shared {
    service: Arc<dyn MailboxService>,
    settings: ListenerSettings,
    snapshot: Arc<SettingsSnapshot>,
    events: mpsc::Sender<CandidateEvent>,
    faults: mpsc::Sender<ListenerFault>,
    status: watch::Receiver<ServiceStatus>,
    log: LogDispatcher,
}

enum Slot {
    Idle,
    Open {
        generation: u64,
        token: CancellationToken,
        task: Option<JoinHandle<()>>,
    },
}

/// Keeps the push subscription for one session alive and forwards mails
/// whose subject announces a new issue.
///
/// After an unexpected disconnect the listener reopens the subscription only
/// while the service is `Started`, with a bounded number of attempts and
/// doubling delays. When the budget is spent it reports a
/// [`ListenerFault`] and stops.
pub struct MailboxListener {
    shared: Arc<Shared>,
    slot: Mutex<Slot>,
    generation: AtomicU64,
}

impl MailboxListener {
    pub fn new(
        service: Arc<dyn MailboxService>,
        settings: ListenerSettings,
        snapshot: Arc<SettingsSnapshot>,
        events: mpsc::Sender<CandidateEvent>,
        faults: mpsc::Sender<ListenerFault>,
        status: watch::Receiver<ServiceStatus>,
        log: LogDispatcher,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                service,
                settings,
                snapshot,
                events,
                faults,
                status,
                log,
            }),
            slot: Mutex::new(Slot::Idle),
            generation: AtomicU64::new(0),
        }
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock_slot(), Slot::Open { .. })
    }

    /// Subscribe and start receiving notifications.
    ///
    /// Fails with `AlreadyOpen` if a connection is open or opening, and with
    /// `Cancelled` if `cancel` fires or the connection is closed before the
    /// subscription is established.
    pub async fn open_connection(&self, cancel: &CancellationToken) -> Result<(), MailboxError> {
        let token = CancellationToken::new();
        let generation = {
            let mut slot = self.lock_slot();
            if matches!(*slot, Slot::Open { .. }) {
                return Err(MailboxError::AlreadyOpen);
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *slot = Slot::Open {
                generation,
                token: token.clone(),
                task: None,
            };
            generation
        };

        let connected = tokio::select! {
            _ = cancel.cancelled() => Err(MailboxError::Cancelled),
            _ = token.cancelled() => Err(MailboxError::Cancelled),
            result = self.shared.connect() => result,
        };

        let mut slot = self.lock_slot();
        let current = matches!(&*slot, Slot::Open { generation: g, .. } if *g == generation);

        match connected {
            Err(e) => {
                if current {
                    *slot = Slot::Idle;
                }
                Err(e)
            }
            Ok(_) if !current => Err(MailboxError::Cancelled),
            Ok((handle, connection)) => {
                info!(
                    folder = %handle.folder,
                    subscription = %handle.id,
                    "Mailbox connection open"
                );
                let task = tokio::spawn(pump(self.shared.clone(), handle, connection, token));
                if let Slot::Open { task: slot_task, .. } = &mut *slot {
                    *slot_task = Some(task);
                }
                Ok(())
            }
        }
    }

    /// Tear the connection down. No reconnect happens afterwards. Safe to
    /// call when nothing is open.
    pub async fn close_connection(&self) {
        let task = match std::mem::replace(&mut *self.lock_slot(), Slot::Idle) {
            Slot::Idle => return,
            Slot::Open { token, task, .. } => {
                token.cancel();
                task
            }
        };

        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Mailbox task ended abnormally: {}", e);
            }
        }
        info!("Mailbox connection closed");
    }
}

impl Shared {
    async fn connect(&self) -> Result<(SubscriptionHandle, StreamingConnection), MailboxError> {
        let handle = self
            .service
            .subscribe(
                &self.snapshot.mail,
                &self.settings.folder,
                &[NotificationKind::NewMail],
            )
            .await?;
        let connection = self.service.open_streaming_connection(&handle).await?;
        Ok((handle, connection))
    }

    /// Wait out a pending transition. `true` iff the service is `Started`.
    async fn wait_until_started(&self, token: &CancellationToken) -> bool {
        let mut status = self.status.clone();
        loop {
            if token.is_cancelled() {
                return false;
            }
            let state = status.borrow_and_update().state;
            match state {
                ServiceState::Started => return true,
                ServiceState::Stopped => return false,
                ServiceState::Pending => {
                    tokio::select! {
                        _ = token.cancelled() => return false,
                        changed = status.changed() => {
                            if changed.is_err() {
                                return false;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn forward(
        &self,
        handle: &SubscriptionHandle,
        notification: MailNotification,
        token: &CancellationToken,
    ) {
        let bound = tokio::select! {
            _ = token.cancelled() => return,
            result = self.service.bind(handle, &notification.item_id) => result,
        };

        let item = match bound {
            Ok(item) => item,
            Err(e) => {
                MAILBOX_EVENTS.with_label_values(&["bind_failed"]).inc();
                warn!(item_id = %notification.item_id, "Could not load mail item: {}", e);
                return;
            }
        };

        if !self.snapshot.is_new_issue_subject(&item.subject) {
            MAILBOX_EVENTS.with_label_values(&["filtered"]).inc();
            debug!(item_id = %item.item_id, "Subject does not announce a new issue");
            return;
        }

        let item_id = item.item_id.clone();
        tokio::select! {
            _ = token.cancelled() => {}
            sent = self.events.send(CandidateEvent::from(item)) => match sent {
                Ok(()) => {
                    MAILBOX_EVENTS.with_label_values(&["forwarded"]).inc();
                    debug!(item_id = %item_id, "Forwarded candidate event");
                }
                Err(_) => {
                    MAILBOX_EVENTS.with_label_values(&["queue_closed"]).inc();
                    warn!(item_id = %item_id, "Event queue closed, dropping notification");
                }
            },
        }
    }

    async fn reconnect(
        &self,
        token: &CancellationToken,
    ) -> Option<(SubscriptionHandle, StreamingConnection)> {
        let max_attempts = self.settings.reconnect_max_attempts;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let delay = self
                .settings
                .reconnect_base_delay
                .saturating_mul(1u32 << (attempt - 1).min(16));

            tokio::select! {
                _ = token.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            if !self.wait_until_started(token).await {
                return None;
            }

            let result = tokio::select! {
                _ = token.cancelled() => return None,
                result = self.connect() => result,
            };

            match result {
                Ok(pair) => {
                    MAILBOX_RECONNECTS.with_label_values(&["success"]).inc();
                    info!(attempt, "Mailbox reconnected");
                    self.log.notify_info("Mailbox connection re-established");
                    return Some(pair);
                }
                Err(e) => {
                    MAILBOX_RECONNECTS.with_label_values(&["failure"]).inc();
                    warn!(attempt, max_attempts, "Mailbox reconnect failed: {}", e);
                    last_error = e.to_string();
                }
            }
        }

        MAILBOX_RECONNECTS.with_label_values(&["exhausted"]).inc();
        let fault = ListenerFault::ReconnectExhausted {
            attempts: max_attempts,
            last_error,
        };
        error!("{}", fault);
        self.log.notify_error(fault.to_string());
        if self.faults.try_send(fault).is_err() {
            warn!("Fault channel unavailable, nobody to stop the session");
        }
        None
    }
}

async fn pump(
    shared: Arc<Shared>,
    mut handle: SubscriptionHandle,
    mut connection: StreamingConnection,
    token: CancellationToken,
) {
    loop {
        let notification = tokio::select! {
            _ = token.cancelled() => break,
            notification = connection.notifications.recv() => notification,
        };

        let reason = match notification {
            Some(ConnectionNotification::Event(event)) => {
                shared.forward(&handle, event, &token).await;
                continue;
            }
            Some(ConnectionNotification::Error(message)) => {
                warn!("Mailbox connection error: {}", message);
                shared
                    .log
                    .notify_warning(format!("Mailbox connection error: {}", message));
                continue;
            }
            Some(ConnectionNotification::Disconnected { reason }) => {
                reason.unwrap_or_else(|| "remote closed the connection".to_string())
            }
            None => "notification stream ended".to_string(),
        };

        if !shared.wait_until_started(&token).await {
            info!(reason = %reason, "Mailbox disconnected while not running, not reconnecting");
            break;
        }

        warn!(reason = %reason, "Mailbox connection dropped, reconnecting");
        shared
            .log
            .notify_warning(format!("Mailbox connection dropped: {}", reason));

        match shared.reconnect(&token).await {
            Some((new_handle, new_connection)) => {
                handle = new_handle;
                connection = new_connection;
            }
            None => break,
        }
    }
    debug!("Mailbox notification loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockMailbox};
    use crate::mailbox::MailItem;

    struct Harness {
        mailbox: Arc<MockMailbox>,
        listener: MailboxListener,
        events: mpsc::Receiver<CandidateEvent>,
        faults: mpsc::Receiver<ListenerFault>,
        status: watch::Sender<ServiceStatus>,
    }

    fn harness(reconnect_max_attempts: u32) -> Harness {
        harness_with_delay(reconnect_max_attempts, Duration::from_millis(5))
    }

    fn harness_with_delay(reconnect_max_attempts: u32, reconnect_base_delay: Duration) -> Harness {
        let mailbox = Arc::new(MockMailbox::new());
        let (events_tx, events) = mpsc::channel(16);
        let (faults_tx, faults) = mpsc::channel(1);
        let (status, status_rx) = watch::channel(ServiceStatus::started("alice"));
        let listener = MailboxListener::new(
            mailbox.clone(),
            ListenerSettings {
                folder: "Inbox".to_string(),
                reconnect_max_attempts,
                reconnect_base_delay,
            },
            Arc::new(fixtures::snapshot(vec![])),
            events_tx,
            faults_tx,
            status_rx,
            LogDispatcher::disabled(),
        );
        Harness {
            mailbox,
            listener,
            events,
            faults,
            status,
        }
    }

    fn mail(id: &str, subject: &str) -> MailItem {
        MailItem {
            item_id: id.to_string(),
            subject: subject.to_string(),
            body: String::new(),
        }
    }

    async fn recv(events: &mut mpsc::Receiver<CandidateEvent>) -> Option<CandidateEvent> {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_forwards_only_matching_subjects() {
        let mut h = harness(3);
        h.listener
            .open_connection(&CancellationToken::new())
            .await
            .unwrap();

        assert!(h.mailbox.deliver(mail("m1", "Weekly newsletter")).await);
        assert!(h.mailbox.deliver(mail("m2", "New issue #42 registered")).await);

        let event = recv(&mut h.events).await.unwrap();
        assert_eq!(event.item_id, "m2");
        assert_eq!(event.subject, "New issue #42 registered");

        h.listener.close_connection().await;
    }

    #[tokio::test]
    async fn test_open_twice_fails() {
        let h = harness(3);
        let cancel = CancellationToken::new();
        h.listener.open_connection(&cancel).await.unwrap();
        assert!(matches!(
            h.listener.open_connection(&cancel).await,
            Err(MailboxError::AlreadyOpen)
        ));
        h.listener.close_connection().await;
        assert!(!h.listener.is_open());
        h.listener.open_connection(&cancel).await.unwrap();
        h.listener.close_connection().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let h = harness(3);
        h.listener.close_connection().await;
        h.listener
            .open_connection(&CancellationToken::new())
            .await
            .unwrap();
        h.listener.close_connection().await;
        h.listener.close_connection().await;
        assert!(!h.listener.is_open());
    }

    #[tokio::test]
    async fn test_reopens_after_disconnect_while_started() {
        let mut h = harness(3);
        h.listener
            .open_connection(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(h.mailbox.open_count().await, 1);

        h.mailbox.disconnect("server restart").await;
        assert!(h.mailbox.wait_for_opens(2, Duration::from_secs(2)).await);

        assert!(h.mailbox.deliver(mail("m3", "New issue #7")).await);
        assert_eq!(recv(&mut h.events).await.unwrap().item_id, "m3");

        h.listener.close_connection().await;
    }

    #[tokio::test]
    async fn test_no_reopen_after_close() {
        let h = harness(3);
        h.listener
            .open_connection(&CancellationToken::new())
            .await
            .unwrap();
        h.listener.close_connection().await;
        h.status.send_replace(ServiceStatus::stopped());

        h.mailbox.disconnect("late drop").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.mailbox.subscribe_count().await, 1);
    }

    #[tokio::test]
    async fn test_close_interrupts_pending_reconnect() {
        let h = harness_with_delay(3, Duration::from_secs(5));
        h.listener
            .open_connection(&CancellationToken::new())
            .await
            .unwrap();

        h.mailbox.disconnect("server restart").await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let closed = tokio::time::timeout(Duration::from_secs(1), h.listener.close_connection()).await;
        assert!(closed.is_ok(), "close waited for the reconnect backoff");
        assert!(!h.listener.is_open());
        assert_eq!(h.mailbox.subscribe_count().await, 1);
    }

    #[tokio::test]
    async fn test_no_reopen_when_service_stopped() {
        let h = harness(3);
        h.listener
            .open_connection(&CancellationToken::new())
            .await
            .unwrap();
        h.status.send_replace(ServiceStatus::stopped());

        h.mailbox.disconnect("drop").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.mailbox.subscribe_count().await, 1);
        h.listener.close_connection().await;
    }

    #[tokio::test]
    async fn test_exhausted_reconnects_raise_fault() {
        let mut h = harness(2);
        h.listener
            .open_connection(&CancellationToken::new())
            .await
            .unwrap();

        h.mailbox.fail_next_connects(10).await;
        h.mailbox.disconnect("gone").await;

        let fault = tokio::time::timeout(Duration::from_secs(2), h.faults.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(fault, ListenerFault::ReconnectExhausted { attempts: 2, .. }));
        assert_eq!(h.mailbox.subscribe_count().await, 3);

        h.listener.close_connection().await;
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_open() {
        let h = harness(3);
        h.mailbox.set_subscribe_delay(Duration::from_secs(30)).await;
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = h.listener.open_connection(&cancel).await;
        assert!(matches!(result, Err(MailboxError::Cancelled)));
        assert!(!h.listener.is_open());
    }
}
