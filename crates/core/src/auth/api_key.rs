//! API Key authentication.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};
use crate::config::ApiKeyConfig;

/// Authenticator that validates requests against the configured API keys.
///
/// Each key identifies one operator and carries that operator's permissions.
/// Accepts the key in either:
/// - `Authorization: Bearer <key>` header
/// - `X-API-Key: <key>` header
pub struct ApiKeyAuthenticator {
    keys: Vec<ApiKeyConfig>,
}

impl ApiKeyAuthenticator {
    pub fn new(keys: Vec<ApiKeyConfig>) -> Self {
        Self { keys }
    }

    /// Extract API key from request headers.
    fn extract_key(&self, request: &AuthRequest) -> Option<String> {
        if let Some(auth_header) = request.headers.get("authorization") {
            if let Some(key) = auth_header.strip_prefix("Bearer ") {
                return Some(key.to_string());
            }
            if let Some(key) = auth_header.strip_prefix("bearer ") {
                return Some(key.to_string());
            }
        }

        if let Some(key) = request.headers.get("x-api-key") {
            return Some(key.clone());
        }

        None
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided_key = self
            .extract_key(request)
            .ok_or(AuthError::NotAuthenticated)?;

        // Compare against every key so timing does not reveal which one matched
        let mut matched: Option<&ApiKeyConfig> = None;
        for entry in &self.keys {
            if constant_time_eq(provided_key.as_bytes(), entry.key.as_bytes()) {
                matched = Some(entry);
            }
        }

        match matched {
            Some(entry) => Ok(Identity {
                user_id: entry.operator_id.clone(),
                method: "api_key".to_string(),
                permissions: entry.permissions.clone(),
                claims: std::collections::HashMap::new(),
            }),
            None => Err(AuthError::InvalidCredentials("Invalid API key".to_string())),
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
