use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::activity::LogDispatcher;
use crate::mailbox::CandidateEvent;
use crate::metrics::{CHAIN_DURATION, CLASSIFICATIONS};
use crate::pipeline::{PipelineError, PipelineReport, UpdatePipelineExecutor};
use crate::settings::SettingsSnapshot;
use crate::ticketing::{TicketingApi, TicketingError};

use super::classify;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Could not fetch issue {issue_id}: {source}")]
    Fetch {
        issue_id: String,
        #[source]
        source: TicketingError,
    },

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// What happened to one candidate event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The mail carries no issue id.
    NoIssueId,
    /// Another chain is already working on this issue.
    AlreadyInFlight { issue_id: String },
    /// No rule set matched; nothing was updated.
    ClassificationMiss { issue_id: String },
    Updated(PipelineReport),
}

impl ProcessOutcome {
    fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::NoIssueId => "no_issue_id",
            ProcessOutcome::AlreadyInFlight { .. } => "duplicate",
            ProcessOutcome::ClassificationMiss { .. } => "miss",
            ProcessOutcome::Updated(_) => "completed",
        }
    }
}

/// Removes its issue id from the in-flight set when dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<String>>>,
    issue_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.issue_id);
        }
    }
}

/// Turns a candidate mail event into remote updates: extract the issue id,
/// fetch the issue, classify it, run the winning pipeline.
///
/// Cheap to clone; clones share the in-flight set.
#[derive(Clone)]
pub struct IssueProcessor {
    ticketing: Arc<dyn TicketingApi>,
    executor: UpdatePipelineExecutor,
    log: LogDispatcher,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl IssueProcessor {
    pub fn new(ticketing: Arc<dyn TicketingApi>, log: LogDispatcher) -> Self {
        Self {
            executor: UpdatePipelineExecutor::new(ticketing.clone(), log.clone()),
            ticketing,
            log,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn claim(&self, issue_id: &str) -> Option<InFlightGuard> {
        let mut set = self.in_flight.lock().ok()?;
        if !set.insert(issue_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.in_flight.clone(),
            issue_id: issue_id.to_string(),
        })
    }

    /// Issue ids with a chain currently running.
    pub fn in_flight(&self) -> Vec<String> {
        self.in_flight
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Run the full chain for one event.
    pub async fn process(
        &self,
        snapshot: &SettingsSnapshot,
        event: &CandidateEvent,
    ) -> Result<ProcessOutcome, ClassifyError> {
        let Some(issue_id) = snapshot
            .extract_issue_id(&event.subject)
            .or_else(|| snapshot.extract_issue_id(&event.body))
        else {
            debug!(item_id = %event.item_id, "No issue id in notification, dropping");
            return Ok(ProcessOutcome::NoIssueId);
        };

        let Some(_guard) = self.claim(&issue_id) else {
            warn!(issue_id = %issue_id, "Issue is already being processed, dropping duplicate");
            return Ok(ProcessOutcome::AlreadyInFlight { issue_id });
        };

        let record = self
            .ticketing
            .get_issue(&snapshot.ticketing, &issue_id)
            .await
            .map_err(|source| ClassifyError::Fetch {
                issue_id: issue_id.clone(),
                source,
            })?;

        let Some(hit) = classify(&snapshot.catalog, &record) else {
            info!(issue_id = %issue_id, company = %record.company, "No issue type matched");
            self.log
                .notify_info(format!("Issue {} did not match any issue type", issue_id));
            return Ok(ProcessOutcome::ClassificationMiss { issue_id });
        };

        info!(
            issue_id = %issue_id,
            issue_type = %hit.profile.name,
            rule_set = hit.rule_set_id,
            "Issue classified"
        );
        CLASSIFICATIONS.with_label_values(&["matched"]).inc();

        let report = self
            .executor
            .execute(&snapshot.ticketing, &issue_id, hit.profile)
            .await?;

        Ok(ProcessOutcome::Updated(report))
    }

    /// [`process`](Self::process) with failures logged and absorbed, so one
    /// bad ticket never reaches the listener or the state machine.
    pub async fn handle(
        &self,
        snapshot: &SettingsSnapshot,
        event: &CandidateEvent,
    ) -> Option<ProcessOutcome> {
        let started = Instant::now();
        let result = self.process(snapshot, event).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(outcome) => {
                if !matches!(outcome, ProcessOutcome::Updated(_)) {
                    CLASSIFICATIONS.with_label_values(&[outcome.label()]).inc();
                }
                CHAIN_DURATION
                    .with_label_values(&[outcome.label()])
                    .observe(elapsed);
                Some(outcome)
            }
            Err(e) => {
                if matches!(e, ClassifyError::Fetch { .. }) {
                    CLASSIFICATIONS.with_label_values(&["fetch_failed"]).inc();
                }
                CHAIN_DURATION.with_label_values(&["failed"]).observe(elapsed);
                error!(item_id = %event.item_id, "Processing failed: {}", e);
                self.log.notify_error(e.to_string());
                None
            }
        }
    }
}
