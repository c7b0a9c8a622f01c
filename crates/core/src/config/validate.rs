use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - API key auth has at least one non-empty key
/// - Retry and reconnect budgets are at least one attempt
/// - Event buffer and per-event deadline are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::ApiKey {
        if config.auth.api_keys.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.api_keys must not be empty when method = \"api_key\"".to_string(),
            ));
        }
        if let Some(entry) = config
            .auth
            .api_keys
            .iter()
            .find(|k| k.key.is_empty() || k.operator_id.is_empty())
        {
            return Err(ConfigError::ValidationError(format!(
                "auth.api_keys entry for operator '{}' has an empty key or operator_id",
                entry.operator_id
            )));
        }
    }

    if config.ticketing.retry_max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "ticketing.retry_max_attempts must be at least 1".to_string(),
        ));
    }

    if config.automation.reconnect_max_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "automation.reconnect_max_attempts must be at least 1".to_string(),
        ));
    }

    if config.automation.event_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "automation.event_buffer cannot be 0".to_string(),
        ));
    }

    if config.automation.event_deadline_secs == 0 {
        return Err(ConfigError::ValidationError(
            "automation.event_deadline_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        ApiKeyConfig, AuthConfig, AutomationConfig, DatabaseConfig, ServerConfig,
        TicketingClientConfig,
    };

    fn valid_config() -> Config {
        Config {
            auth: AuthConfig {
                method: AuthMethod::None,
                api_keys: vec![],
            },
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            ticketing: TicketingClientConfig::default(),
            automation: AutomationConfig::default(),
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid_config();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_api_key_without_keys_fails() {
        let mut config = valid_config();
        config.auth.method = AuthMethod::ApiKey;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_api_key_with_empty_key_fails() {
        let mut config = valid_config();
        config.auth.method = AuthMethod::ApiKey;
        config.auth.api_keys.push(ApiKeyConfig {
            key: String::new(),
            operator_id: "alice".to_string(),
            permissions: vec![],
        });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_retry_attempts_fails() {
        let mut config = valid_config();
        config.ticketing.retry_max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_reconnect_attempts_fails() {
        let mut config = valid_config();
        config.automation.reconnect_max_attempts = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_deadline_fails() {
        let mut config = valid_config();
        config.automation.event_deadline_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
