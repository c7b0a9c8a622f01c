use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::activity::LogDispatcher;
use crate::metrics::{ISSUES_UPDATED, PIPELINE_STEPS};
use crate::settings::{IssueTypeProfile, TicketingCredentials};
use crate::ticketing::{TicketingApi, TicketingError, UpdateParams};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Issue type '{issue_type}' has no pipeline steps")]
    EmptyPipeline { issue_type: String },

    /// A step failed; later steps were not run. Steps before it stay applied
    /// on the remote side.
    #[error("Step {step_index} (order {execution_order}) for issue {issue_id} failed: {source}")]
    StepFailed {
        issue_id: String,
        step_index: usize,
        execution_order: i32,
        #[source]
        source: TicketingError,
    },
}

impl PipelineError {
    /// `true` when the remote side answered but did not confirm the update.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::StepFailed {
                source: TicketingError::Rejected { .. },
                ..
            }
        )
    }
}

/// Summary of a fully applied pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub issue_id: String,
    pub issue_type: String,
    pub steps_applied: usize,
}

/// Whether an update response confirms the change.
///
/// The body must mention "updated" (any case). A body saying "not updated"
/// is a rejection.
pub fn is_update_confirmed(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("updated") && !body.contains("not updated")
}

/// Runs an issue type's transition steps against the ticketing system.
#[derive(Clone)]
pub struct UpdatePipelineExecutor {
    ticketing: Arc<dyn TicketingApi>,
    log: LogDispatcher,
}

impl UpdatePipelineExecutor {
    pub fn new(ticketing: Arc<dyn TicketingApi>, log: LogDispatcher) -> Self {
        Self { ticketing, log }
    }

    /// Apply every step of `profile.pipeline` in execution order, halting at
    /// the first step that fails or is not confirmed.
    pub async fn execute(
        &self,
        creds: &TicketingCredentials,
        issue_id: &str,
        profile: &IssueTypeProfile,
    ) -> Result<PipelineReport, PipelineError> {
        if profile.pipeline.is_empty() {
            return Err(PipelineError::EmptyPipeline {
                issue_type: profile.name.clone(),
            });
        }

        let mut steps: Vec<_> = profile.pipeline.iter().collect();
        steps.sort_by_key(|s| s.execution_order);

        for (index, step) in steps.into_iter().enumerate() {
            let params = UpdateParams::from(step);
            let fail = |source: TicketingError| PipelineError::StepFailed {
                issue_id: issue_id.to_string(),
                step_index: index,
                execution_order: step.execution_order,
                source,
            };

            let body = match self.ticketing.update_issue(creds, issue_id, &params).await {
                Ok(body) => body,
                Err(e) => {
                    PIPELINE_STEPS.with_label_values(&["failed"]).inc();
                    error!(
                        issue_id = %issue_id,
                        step = index,
                        execution_order = step.execution_order,
                        "Pipeline step failed: {}",
                        e
                    );
                    return Err(fail(e));
                }
            };

            if !is_update_confirmed(&body) {
                PIPELINE_STEPS.with_label_values(&["rejected"]).inc();
                warn!(
                    issue_id = %issue_id,
                    step = index,
                    execution_order = step.execution_order,
                    "Pipeline step rejected by ticketing system"
                );
                return Err(fail(TicketingError::Rejected {
                    body: body.chars().take(200).collect(),
                }));
            }

            PIPELINE_STEPS.with_label_values(&["updated"]).inc();
            info!(
                issue_id = %issue_id,
                step = index,
                status = %step.status,
                "Pipeline step applied"
            );
        }

        ISSUES_UPDATED.inc();
        self.log.notify_success(format!(
            "Issue {} processed as '{}' ({} steps)",
            issue_id,
            profile.name,
            profile.pipeline.len()
        ));

        Ok(PipelineReport {
            issue_id: issue_id.to_string(),
            issue_type: profile.name.clone(),
            steps_applied: profile.pipeline.len(),
        })
    }
}
