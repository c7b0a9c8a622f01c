use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Header that names the operator when authentication is disabled.
pub const OPERATOR_HEADER: &str = "x-operator-id";

/// Authenticator that accepts all requests.
///
/// Must be explicitly configured - the system won't default to this.
/// The caller may name itself through the `X-Operator-Id` header so that
/// session ownership still works on an open deployment; without the header
/// the caller is `anonymous`.
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NoneAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let mut identity = Identity::anonymous();
        if let Some(operator) = request
            .headers
            .get(OPERATOR_HEADER)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
        {
            identity.user_id = operator.to_string();
        }
        Ok(identity)
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}
