use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::{IssueField, TransitionStep};

use super::retry::{RetryDecision, RetryableError};

/// Issue as returned by the ticketing system's `get` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIssueRecord {
    pub id: String,
    pub author: String,
    pub company: String,
    pub status: String,
    pub priority: String,
    pub assigned_group: String,
    pub assignee: String,
    pub short_description: String,
    pub description: String,
    pub time_created: String,
}

impl RemoteIssueRecord {
    /// Value of the field a rule targets. Missing fields read as empty.
    pub fn field(&self, field: IssueField) -> &str {
        match field {
            IssueField::Author => &self.author,
            IssueField::Company => &self.company,
            IssueField::Status => &self.status,
            IssueField::Priority => &self.priority,
            IssueField::AssignedGroup => &self.assigned_group,
            IssueField::Assignee => &self.assignee,
            IssueField::ShortDescription => &self.short_description,
            IssueField::Description => &self.description,
            IssueField::TimeCreated => &self.time_created,
        }
    }
}

/// Key/value pairs appended to an `update` query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateParams {
    pairs: Vec<(&'static str, String)>,
}

impl UpdateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.pairs.push((key, value.into()));
        self
    }

    pub fn pairs(&self) -> &[(&'static str, String)] {
        &self.pairs
    }
}

impl From<&TransitionStep> for UpdateParams {
    /// Only the fields the step sets end up in the query.
    fn from(step: &TransitionStep) -> Self {
        let mut params = UpdateParams::new();
        if let Some(minutes) = step.work_time {
            params = params.push("work_time", minutes.to_string());
        }
        params = params.push("status", step.status.clone());
        if let Some(group) = &step.assigned_group {
            params = params.push("assigned_group", group.clone());
        }
        if let Some(request_type) = &step.request_type {
            params = params.push("request_type", request_type.clone());
        }
        params
    }
}

#[derive(Debug, Error)]
pub enum TicketingError {
    /// Could not reach the ticketing system, or it answered with a
    /// transient status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success status or an unreadable body.
    #[error("ev_api failure{}: {detail}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    EvApiFailure { status: Option<u16>, detail: String },

    /// The update call returned success but the body does not confirm it.
    #[error("Update rejected: {body}")]
    Rejected { body: String },
}

impl TicketingError {
    /// Maps an HTTP status to an error: 5xx and 408 are transient.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = body.chars().take(200).collect::<String>();
        if status >= 500 || status == 408 {
            TicketingError::Transport(format!("HTTP {}: {}", status, detail))
        } else {
            TicketingError::EvApiFailure {
                status: Some(status),
                detail,
            }
        }
    }
}

impl RetryableError for TicketingError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            TicketingError::Transport(_) => RetryDecision::Retry,
            TicketingError::EvApiFailure { .. } | TicketingError::Rejected { .. } => {
                RetryDecision::NoRetry
            }
        }
    }
}
