use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::ServiceState;

/// Severity bucket of an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Status,
    Info,
    Warning,
    Error,
    Success,
}

impl ActivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityLevel::Status => "status",
            ActivityLevel::Info => "info",
            ActivityLevel::Warning => "warning",
            ActivityLevel::Error => "error",
            ActivityLevel::Success => "success",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status" => Some(ActivityLevel::Status),
            "info" => Some(ActivityLevel::Info),
            "warning" => Some(ActivityLevel::Warning),
            "error" => Some(ActivityLevel::Error),
            "success" => Some(ActivityLevel::Success),
            _ => None,
        }
    }
}

/// Activity event pushed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    Status {
        state: ServiceState,
        operator_id: Option<String>,
    },
    Info {
        message: String,
    },
    Warning {
        message: String,
    },
    Error {
        message: String,
    },
    Success {
        message: String,
    },
}

impl ActivityEvent {
    pub fn level(&self) -> ActivityLevel {
        match self {
            ActivityEvent::Status { .. } => ActivityLevel::Status,
            ActivityEvent::Info { .. } => ActivityLevel::Info,
            ActivityEvent::Warning { .. } => ActivityLevel::Warning,
            ActivityEvent::Error { .. } => ActivityLevel::Error,
            ActivityEvent::Success { .. } => ActivityLevel::Success,
        }
    }

    /// Human-readable one-liner.
    pub fn message(&self) -> String {
        match self {
            ActivityEvent::Status { state, operator_id } => match operator_id {
                Some(op) => format!("Service {} (operator {})", state.as_str(), op),
                None => format!("Service {}", state.as_str()),
            },
            ActivityEvent::Info { message }
            | ActivityEvent::Warning { message }
            | ActivityEvent::Error { message }
            | ActivityEvent::Success { message } => message.clone(),
        }
    }
}

/// A persisted activity event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub level: ActivityLevel,
    pub event: ActivityEvent,
}
