use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mailbox::MailboxError;
use crate::settings::SettingsError;

use super::{ServiceState, ServiceStatus};

/// Typed failure of a control operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("Service is busy")]
    ServiceBusy,

    #[error("Service is owned by another operator")]
    NotOwner,

    #[error("Service is not running")]
    NotRunning,

    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("Credential failure: {0}")]
    CredentialFailure(String),

    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Start was cancelled")]
    Cancelled,
}

impl ControlError {
    /// Short stable label, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::ServiceBusy => "service_busy",
            ControlError::NotOwner => "not_owner",
            ControlError::NotRunning => "not_running",
            ControlError::ConfigurationInvalid(_) => "configuration_invalid",
            ControlError::CredentialFailure(_) => "credential_failure",
            ControlError::TransportUnavailable(_) => "transport_unavailable",
            ControlError::Cancelled => "cancelled",
        }
    }
}

impl From<SettingsError> for ControlError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::CredentialsMissing(_) => ControlError::CredentialFailure(e.to_string()),
            SettingsError::ConfigurationIncomplete(_) | SettingsError::InvalidPattern { .. } => {
                ControlError::ConfigurationInvalid(e.to_string())
            }
            SettingsError::Storage(_) => ControlError::TransportUnavailable(e.to_string()),
        }
    }
}

impl From<MailboxError> for ControlError {
    fn from(e: MailboxError) -> Self {
        match e {
            MailboxError::AuthenticationFailed(_) => ControlError::CredentialFailure(e.to_string()),
            MailboxError::Cancelled => ControlError::Cancelled,
            MailboxError::AlreadyOpen => ControlError::ServiceBusy,
            MailboxError::Unavailable(_) | MailboxError::ItemNotFound(_) => {
                ControlError::TransportUnavailable(e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Success,
    Failure,
}

/// Reply to start, stop and force-stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub request_status: RequestStatus,
    pub service_status: ServiceState,
    pub operator_id: Option<String>,
    pub description: String,
}

impl ControlResponse {
    pub fn success(status: &ServiceStatus, description: impl Into<String>) -> Self {
        Self {
            request_status: RequestStatus::Success,
            service_status: status.state,
            operator_id: status.operator_id.clone(),
            description: description.into(),
        }
    }

    /// `status` is the state after the failed request.
    pub fn failure(status: &ServiceStatus, error: &ControlError) -> Self {
        Self {
            request_status: RequestStatus::Failure,
            service_status: status.state,
            operator_id: status.operator_id.clone(),
            description: error.to_string(),
        }
    }
}

/// Reply to a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub service_status: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
}

impl From<ServiceStatus> for StatusResponse {
    fn from(status: ServiceStatus) -> Self {
        Self {
            service_status: status.state,
            operator_id: status.operator_id,
        }
    }
}
