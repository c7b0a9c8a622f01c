use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Request information for authentication
#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

/// Capabilities checked at each control-operation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Start and stop a session owned by the caller.
    ServiceControl,
    /// Stop any session regardless of owner.
    ServiceForceStop,
    /// Read the current service status.
    ServiceStatus,
}

impl Permission {
    pub fn all() -> Vec<Permission> {
        vec![
            Permission::ServiceControl,
            Permission::ServiceForceStop,
            Permission::ServiceStatus,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ServiceControl => "service_control",
            Permission::ServiceForceStop => "service_force_stop",
            Permission::ServiceStatus => "service_status",
        }
    }
}

/// Authenticated identity. `user_id` is the operator id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub method: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    pub claims: HashMap<String, serde_json::Value>,
}

impl Identity {
    /// Identity used when authentication is disabled; holds every permission.
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            method: "none".to_string(),
            permissions: Permission::all(),
            claims: HashMap::new(),
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}
