//! Service lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the automation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Stopped,
    /// A start or stop transition is in progress.
    Pending,
    Started,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Stopped => "stopped",
            ServiceState::Pending => "pending",
            ServiceState::Started => "started",
        }
    }
}

/// Consistent `{state, operator}` pair.
///
/// The operator id is present iff the state is not `Stopped`; the
/// constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    pub state: ServiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
}

impl ServiceStatus {
    pub fn stopped() -> Self {
        Self {
            state: ServiceState::Stopped,
            operator_id: None,
        }
    }

    pub fn pending(operator_id: impl Into<String>) -> Self {
        Self {
            state: ServiceState::Pending,
            operator_id: Some(operator_id.into()),
        }
    }

    pub fn started(operator_id: impl Into<String>) -> Self {
        Self {
            state: ServiceState::Started,
            operator_id: Some(operator_id.into()),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.state == ServiceState::Stopped
    }

    pub fn is_started(&self) -> bool {
        self.state == ServiceState::Started
    }

    pub fn is_owned_by(&self, operator_id: &str) -> bool {
        self.operator_id.as_deref() == Some(operator_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_stopped_without_operator() {
        let status = ServiceStatus::default();
        assert!(status.is_stopped());
        assert!(status.operator_id.is_none());
    }

    #[test]
    fn test_operator_present_iff_not_stopped() {
        assert!(ServiceStatus::stopped().operator_id.is_none());
        assert_eq!(
            ServiceStatus::pending("alice").operator_id.as_deref(),
            Some("alice")
        );
        assert!(ServiceStatus::started("alice").is_owned_by("alice"));
        assert!(!ServiceStatus::started("alice").is_owned_by("bob"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_value(ServiceStatus::started("alice")).unwrap();
        assert_eq!(json["state"], "started");
        assert_eq!(json["operatorId"], "alice");

        let json = serde_json::to_value(ServiceStatus::stopped()).unwrap();
        assert_eq!(json["state"], "stopped");
        assert!(json.get("operatorId").is_none());
    }
}
