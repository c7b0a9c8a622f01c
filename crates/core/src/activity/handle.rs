use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use super::ActivityEvent;
use crate::engine::ServiceStatus;

/// Envelope wrapping an activity event with the time it was raised.
#[derive(Debug, Clone)]
pub struct ActivityEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: ActivityEvent,
}

/// Fire-and-forget handle for pushing activity events.
///
/// Cheaply cloneable. The `notify_*` methods never block and never fail the
/// caller: a full or closed channel is logged and the event is dropped.
#[derive(Clone)]
pub struct LogDispatcher {
    tx: mpsc::Sender<ActivityEnvelope>,
}

impl LogDispatcher {
    pub fn new(tx: mpsc::Sender<ActivityEnvelope>) -> Self {
        Self { tx }
    }

    /// Dispatcher whose events go nowhere. Handy for tests and tools.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    /// Emit an event, waiting for channel capacity.
    pub async fn emit(&self, event: ActivityEvent) {
        let envelope = ActivityEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if let Err(e) = self.tx.send(envelope).await {
            tracing::debug!("Activity event dropped: {}", e);
        }
    }

    /// Try to emit an event without waiting.
    ///
    /// Returns true if the event was queued.
    pub fn try_emit(&self, event: ActivityEvent) -> bool {
        let envelope = ActivityEnvelope {
            timestamp: Utc::now(),
            event,
        };
        match self.tx.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Activity channel full, event dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Activity channel closed, event dropped");
                false
            }
        }
    }

    pub fn notify_status(&self, status: &ServiceStatus) {
        self.try_emit(ActivityEvent::Status {
            state: status.state,
            operator_id: status.operator_id.clone(),
        });
    }

    pub fn notify_info(&self, message: impl Into<String>) {
        self.try_emit(ActivityEvent::Info {
            message: message.into(),
        });
    }

    pub fn notify_warning(&self, message: impl Into<String>) {
        self.try_emit(ActivityEvent::Warning {
            message: message.into(),
        });
    }

    pub fn notify_error(&self, message: impl Into<String>) {
        self.try_emit(ActivityEvent::Error {
            message: message.into(),
        });
    }

    pub fn notify_success(&self, message: impl Into<String>) {
        self.try_emit(ActivityEvent::Success {
            message: message.into(),
        });
    }
}
