use thiserror::Error;

use super::{IssueTypeRecord, OperatorCredentials, RuleSetRecord, TicketingSettings, TransitionStep};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("No credentials stored for operator '{0}'")]
    CredentialsMissing(String),

    #[error("Configuration incomplete: {0}")]
    ConfigurationIncomplete(String),

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Persistent settings read by the aggregator at session start.
pub trait SettingsStore: Send + Sync {
    /// Decrypted credentials for one operator.
    fn credentials(&self, operator_id: &str) -> Result<Option<OperatorCredentials>, SettingsError>;

    fn ticketing_settings(&self) -> Result<Option<TicketingSettings>, SettingsError>;

    fn issue_types(&self) -> Result<Vec<IssueTypeRecord>, SettingsError>;

    fn transition_steps(&self, issue_type_id: i64) -> Result<Vec<TransitionStep>, SettingsError>;

    /// Rule sets owned by the issue type, each with its field rules.
    fn rule_sets(&self, issue_type_id: i64) -> Result<Vec<RuleSetRecord>, SettingsError>;
}
