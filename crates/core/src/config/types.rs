use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::auth::Permission;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ticketing: TicketingClientConfig,
    #[serde(default)]
    pub automation: AutomationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// Keys accepted when `method = "api_key"`. Each key maps to one operator.
    #[serde(default)]
    pub api_keys: Vec<ApiKeyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
}

/// A single API key and the operator it authenticates as.
#[derive(Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub operator_id: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl std::fmt::Debug for ApiKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyConfig")
            .field("key", &"<redacted>")
            .field("operator_id", &self.operator_id)
            .field("permissions", &self.permissions)
            .finish()
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("triage.db")
}

/// HTTP client tuning for the ticketing system API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TicketingClientConfig {
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Total attempts for a request hitting transient failures (default: 5)
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,
    /// Base delay of the decorrelated-jitter backoff (default: 1000)
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    /// Upper bound for a single backoff sleep (default: 30000)
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
}

fn default_timeout() -> u32 {
    30
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_base_delay() -> u64 {
    1000
}

fn default_retry_max_delay() -> u64 {
    30_000
}

impl Default for TicketingClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            retry_max_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
        }
    }
}

/// Automation engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AutomationConfig {
    /// Mailbox folder watched for new-issue notifications.
    #[serde(default = "default_mail_folder")]
    pub mail_folder: String,

    /// Capacity of the channel between the mailbox listener and the worker.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Reconnect attempts after an unexpected disconnect before the
    /// session is stopped.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_max_attempts: u32,

    /// First reconnect delay; doubles with each attempt.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_base_delay_ms: u64,

    /// Ceiling for one classify-and-update chain.
    #[serde(default = "default_event_deadline")]
    pub event_deadline_secs: u64,
}

fn default_mail_folder() -> String {
    "Inbox".to_string()
}

fn default_event_buffer() -> usize {
    256
}

fn default_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay() -> u64 {
    1000
}

fn default_event_deadline() -> u64 {
    300
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            mail_folder: default_mail_folder(),
            event_buffer: default_event_buffer(),
            reconnect_max_attempts: default_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_delay(),
            event_deadline_secs: default_event_deadline(),
        }
    }
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub ticketing: TicketingClientConfig,
    pub automation: AutomationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_keys_configured: usize,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: match config.auth.method {
                    AuthMethod::None => "none".to_string(),
                    AuthMethod::ApiKey => "api_key".to_string(),
                },
                api_keys_configured: config.auth.api_keys.len(),
            },
            server: config.server.clone(),
            database: config.database.clone(),
            ticketing: config.ticketing.clone(),
            automation: config.automation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none_auth() -> AuthConfig {
        AuthConfig {
            method: AuthMethod::None,
            api_keys: vec![],
        }
    }

    #[test]
    fn test_deserialize_valid_config_with_none_auth() {
        let toml = r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::None);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_defaults() {
        let toml = r#"
[auth]
method = "none"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "triage.db");
        assert_eq!(config.ticketing.timeout_secs, 30);
        assert_eq!(config.ticketing.retry_max_attempts, 5);
        assert_eq!(config.ticketing.retry_base_delay_ms, 1000);
        assert_eq!(config.automation.mail_folder, "Inbox");
        assert_eq!(config.automation.reconnect_max_attempts, 5);
        assert_eq!(config.automation.event_deadline_secs, 300);
    }

    #[test]
    fn test_deserialize_missing_auth_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_api_keys_with_permissions() {
        let toml = r#"
[auth]
method = "api_key"

[[auth.api_keys]]
key = "operator-key"
operator_id = "alice"
permissions = ["service_control", "service_status"]

[[auth.api_keys]]
key = "admin-key"
operator_id = "root"
permissions = ["service_control", "service_force_stop", "service_status"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.method, AuthMethod::ApiKey);
        assert_eq!(config.auth.api_keys.len(), 2);
        assert_eq!(
            config.auth.api_keys[1].permissions,
            vec![
                Permission::ServiceControl,
                Permission::ServiceForceStop,
                Permission::ServiceStatus
            ]
        );
    }

    #[test]
    fn test_api_key_debug_is_redacted() {
        let key = ApiKeyConfig {
            key: "super-secret".to_string(),
            operator_id: "alice".to_string(),
            permissions: vec![],
        };
        let debug = format!("{:?}", key);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("alice"));
    }

    #[test]
    fn test_sanitized_config() {
        let config = Config {
            auth: AuthConfig {
                method: AuthMethod::ApiKey,
                api_keys: vec![ApiKeyConfig {
                    key: "secret".to_string(),
                    operator_id: "alice".to_string(),
                    permissions: vec![Permission::ServiceControl],
                }],
            },
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            ticketing: TicketingClientConfig::default(),
            automation: AutomationConfig::default(),
        };
        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.auth.method, "api_key");
        assert_eq!(sanitized.auth.api_keys_configured, 1);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_sanitized_config_none_auth() {
        let config = Config {
            auth: none_auth(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            ticketing: TicketingClientConfig::default(),
            automation: AutomationConfig::default(),
        };
        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.auth.method, "none");
        assert_eq!(sanitized.auth.api_keys_configured, 0);
    }
}
