use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::activity::LogDispatcher;
use crate::classifier::IssueProcessor;
use crate::mailbox::{CandidateEvent, ListenerFault};
use crate::metrics::CHAIN_DURATION;
use crate::settings::SettingsSnapshot;

/// Why the worker loop returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Cancelled,
    Fault(ListenerFault),
    /// Every event sender is gone.
    QueueClosed,
}

/// Consumes candidate events for one session and runs one
/// classify-and-update chain per event.
///
/// Chains are spawned and outlive the loop: stopping the session stops
/// intake, while chains already dispatched run to completion (or to the
/// per-event deadline).
pub struct Worker {
    processor: IssueProcessor,
    snapshot: Arc<SettingsSnapshot>,
    events: mpsc::Receiver<CandidateEvent>,
    faults: mpsc::Receiver<ListenerFault>,
    deadline: Duration,
    log: LogDispatcher,
    cancel: CancellationToken,
}

impl Worker {
    pub fn new(
        processor: IssueProcessor,
        snapshot: Arc<SettingsSnapshot>,
        events: mpsc::Receiver<CandidateEvent>,
        faults: mpsc::Receiver<ListenerFault>,
        deadline: Duration,
        log: LogDispatcher,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            processor,
            snapshot,
            events,
            faults,
            deadline,
            log,
            cancel,
        }
    }

    pub async fn run(mut self) -> WorkerExit {
        info!(operator_id = %self.snapshot.operator_id, "Worker started");

        let exit = loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break WorkerExit::Cancelled,
                Some(fault) = self.faults.recv() => break WorkerExit::Fault(fault),
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break WorkerExit::QueueClosed,
                },
            }
        };

        info!(exit = ?exit, "Worker stopped");
        exit
    }

    fn dispatch(&self, event: CandidateEvent) {
        debug!(item_id = %event.item_id, "Dispatching candidate event");
        let processor = self.processor.clone();
        let snapshot = self.snapshot.clone();
        let deadline = self.deadline;
        let log = self.log.clone();

        tokio::spawn(async move {
            let chain = processor.handle(&snapshot, &event);
            if tokio::time::timeout(deadline, chain).await.is_err() {
                CHAIN_DURATION
                    .with_label_values(&["timed_out"])
                    .observe(deadline.as_secs_f64());
                error!(
                    item_id = %event.item_id,
                    deadline_secs = deadline.as_secs(),
                    "Processing exceeded its deadline; the issue may be partially updated"
                );
                log.notify_error(format!(
                    "Processing of mail {} exceeded {}s and was abandoned",
                    event.item_id,
                    deadline.as_secs()
                ));
            }
        });
    }
}
