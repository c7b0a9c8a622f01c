use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::activity::LogDispatcher;
use crate::classifier::IssueProcessor;
use crate::config::AutomationConfig;
use crate::mailbox::{ListenerSettings, MailboxListener, MailboxService};
use crate::metrics::{SERVICE_TRANSITIONS, START_FAILURES};
use crate::settings::{
    check_settings_integrity, integrity_issues, SettingsAggregator, SettingsSnapshot,
};
use crate::ticketing::TicketingApi;

use super::{ControlError, ServiceStatus, Worker, WorkerExit};

/// Collaborators the state machine wires into each session.
#[derive(Clone)]
pub struct EngineDeps {
    pub settings: SettingsAggregator,
    pub mailbox: Arc<dyn MailboxService>,
    pub ticketing: Arc<dyn TicketingApi>,
    pub log: LogDispatcher,
    pub automation: AutomationConfig,
}

struct Session {
    generation: u64,
    operator_id: String,
    snapshot: Arc<SettingsSnapshot>,
    listener: MailboxListener,
    worker_cancel: CancellationToken,
}

enum Slot {
    Idle,
    Starting {
        generation: u64,
        cancel: CancellationToken,
    },
    Running(Session),
}

struct Inner {
    deps: EngineDeps,
    processor: IssueProcessor,
    status: watch::Sender<ServiceStatus>,
    slot: Mutex<Slot>,
    generation: AtomicU64,
}

/// Owns the single automation session and gates every transition.
///
/// Mutations are serialized by one async mutex, which is never held across
/// the I/O of a start. Status reads go through a `watch` channel and never
/// wait on that mutex.
#[derive(Clone)]
pub struct LifecycleStateMachine {
    inner: Arc<Inner>,
}

impl LifecycleStateMachine {
    pub fn new(deps: EngineDeps) -> Self {
        let (status, _) = watch::channel(ServiceStatus::stopped());
        Self {
            inner: Arc::new(Inner {
                processor: IssueProcessor::new(deps.ticketing.clone(), deps.log.clone()),
                deps,
                status,
                slot: Mutex::new(Slot::Idle),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Current `{state, operator}` pair.
    pub fn status(&self) -> ServiceStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<ServiceStatus> {
        self.inner.status.subscribe()
    }

    /// Snapshot of the running session, if any.
    pub async fn snapshot(&self) -> Option<Arc<SettingsSnapshot>> {
        match &*self.inner.slot.lock().await {
            Slot::Running(session) => Some(session.snapshot.clone()),
            _ => None,
        }
    }

    pub async fn request_start(&self, operator_id: &str) -> Result<ServiceStatus, ControlError> {
        let (generation, cancel) = {
            let mut slot = self.inner.slot.lock().await;
            if !matches!(*slot, Slot::Idle) {
                return Err(ControlError::ServiceBusy);
            }
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let cancel = CancellationToken::new();
            *slot = Slot::Starting {
                generation,
                cancel: cancel.clone(),
            };
            self.inner.publish(ServiceStatus::pending(operator_id));
            (generation, cancel)
        };

        info!(operator_id = %operator_id, "Starting automation");
        let result = self.bring_up(generation, operator_id, &cancel).await;

        let mut slot = self.inner.slot.lock().await;
        let current = matches!(&*slot, Slot::Starting { generation: g, .. } if *g == generation);

        match result {
            Ok(session) if current => {
                *slot = Slot::Running(session);
                let status = ServiceStatus::started(operator_id);
                self.inner.publish(status.clone());
                info!(operator_id = %operator_id, "Automation started");
                self.inner
                    .deps
                    .log
                    .notify_success(format!("Automation started by {}", operator_id));
                Ok(status)
            }
            Ok(session) => {
                // Force-stopped while starting; the slot is no longer ours.
                session.teardown().await;
                START_FAILURES.with_label_values(&["cancelled"]).inc();
                Err(ControlError::Cancelled)
            }
            Err(e) => {
                if current {
                    *slot = Slot::Idle;
                    self.inner.publish(ServiceStatus::stopped());
                }
                START_FAILURES.with_label_values(&[e.kind()]).inc();
                warn!(operator_id = %operator_id, "Start failed: {}", e);
                self.inner
                    .deps
                    .log
                    .notify_error(format!("Start by {} failed: {}", operator_id, e));
                Err(e)
            }
        }
    }

    /// Load settings, open the mailbox and spawn the worker. Nothing here
    /// touches the slot.
    async fn bring_up(
        &self,
        generation: u64,
        operator_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Session, ControlError> {
        let deps = &self.inner.deps;

        let snapshot = Arc::new(deps.settings.load(operator_id)?);
        if !check_settings_integrity(&snapshot) {
            return Err(ControlError::ConfigurationInvalid(
                integrity_issues(&snapshot).join("; "),
            ));
        }
        if cancel.is_cancelled() {
            return Err(ControlError::Cancelled);
        }

        let (events_tx, events_rx) = mpsc::channel(deps.automation.event_buffer.max(1));
        let (faults_tx, faults_rx) = mpsc::channel(1);

        let listener = MailboxListener::new(
            deps.mailbox.clone(),
            ListenerSettings::from(&deps.automation),
            snapshot.clone(),
            events_tx,
            faults_tx,
            self.inner.status.subscribe(),
            deps.log.clone(),
        );
        listener.open_connection(cancel).await?;

        let worker_cancel = CancellationToken::new();
        let worker = Worker::new(
            self.inner.processor.clone(),
            snapshot.clone(),
            events_rx,
            faults_rx,
            Duration::from_secs(deps.automation.event_deadline_secs),
            deps.log.clone(),
            worker_cancel.clone(),
        );

        let machine = self.clone();
        tokio::spawn(async move {
            if let WorkerExit::Fault(fault) = worker.run().await {
                machine.fault_stop(generation, &fault.to_string()).await;
            }
        });

        Ok(Session {
            generation,
            operator_id: operator_id.to_string(),
            snapshot,
            listener,
            worker_cancel,
        })
    }

    pub async fn request_stop(&self, operator_id: &str) -> Result<ServiceStatus, ControlError> {
        let mut slot = self.inner.slot.lock().await;
        match &*slot {
            Slot::Idle => return Err(ControlError::NotRunning),
            Slot::Starting { .. } => return Err(ControlError::ServiceBusy),
            Slot::Running(session) if session.operator_id != operator_id => {
                return Err(ControlError::NotOwner)
            }
            Slot::Running(_) => {}
        }

        if let Slot::Running(session) = std::mem::replace(&mut *slot, Slot::Idle) {
            self.inner.shut_down(session).await;
        }
        info!(operator_id = %operator_id, "Automation stopped");
        self.inner
            .deps
            .log
            .notify_info(format!("Automation stopped by {}", operator_id));
        Ok(ServiceStatus::stopped())
    }

    /// Stop whatever is running regardless of owner. A pending start is
    /// cancelled and reverts to `Stopped`; with nothing running this is a
    /// no-op.
    pub async fn request_force_stop(&self) -> Result<ServiceStatus, ControlError> {
        let mut slot = self.inner.slot.lock().await;
        match std::mem::replace(&mut *slot, Slot::Idle) {
            Slot::Idle => return Ok(ServiceStatus::stopped()),
            Slot::Starting { cancel, .. } => {
                cancel.cancel();
                self.inner.publish(ServiceStatus::stopped());
                warn!("Pending start cancelled by force stop");
            }
            Slot::Running(session) => {
                let operator_id = session.operator_id.clone();
                self.inner.shut_down(session).await;
                warn!(operator_id = %operator_id, "Automation force-stopped");
            }
        }
        self.inner.deps.log.notify_warning("Automation force-stopped");
        Ok(ServiceStatus::stopped())
    }

    /// Stop the session `generation` after an unrecoverable fault. Later
    /// sessions are left alone.
    async fn fault_stop(&self, generation: u64, reason: &str) {
        let mut slot = self.inner.slot.lock().await;
        let current = matches!(&*slot, Slot::Running(s) if s.generation == generation);
        if !current {
            return;
        }
        if let Slot::Running(session) = std::mem::replace(&mut *slot, Slot::Idle) {
            self.inner.shut_down(session).await;
        }
        error!("Automation stopped after fault: {}", reason);
        self.inner
            .deps
            .log
            .notify_error(format!("Automation stopped: {}", reason));
    }
}

impl Inner {
    fn publish(&self, status: ServiceStatus) {
        SERVICE_TRANSITIONS
            .with_label_values(&[status.state.as_str()])
            .inc();
        self.deps.log.notify_status(&status);
        self.status.send_replace(status);
    }

    /// `Pending` while tearing down, then `Stopped`.
    async fn shut_down(&self, session: Session) {
        self.publish(ServiceStatus::pending(session.operator_id.clone()));
        session.teardown().await;
        self.publish(ServiceStatus::stopped());
    }
}

impl Session {
    /// Close the listener first so reconnects cannot race the stop, then end
    /// intake. Dispatched chains keep their own snapshot reference.
    async fn teardown(self) {
        self.listener.close_connection().await;
        self.worker_cancel.cancel();
    }
}
