//! Authentication and metrics middleware for API routes.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use triage_core::{check_capability, AuthError, AuthRequest, Identity, Permission};

use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Error body shared by the non-control endpoints.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

/// Authentication middleware that validates requests using the configured authenticator.
///
/// The resolved [`Identity`] is stored in the request extensions; its
/// `user_id` is the operator id handed to the engine. Unauthenticated
/// requests get a 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let headers: HashMap<String, String> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect();

    let source_ip = request
        .extensions()
        .get::<std::net::SocketAddr>()
        .map(|addr| addr.ip())
        .unwrap_or_else(|| std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST));

    let auth_request = AuthRequest { headers, source_ip };

    match state.authenticator().authenticate(&auth_request).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(AuthError::NotAuthenticated) => {
            AUTH_FAILURES_TOTAL
                .with_label_values(&["not_authenticated"])
                .inc();
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(AuthError::InvalidCredentials(_)) => {
            AUTH_FAILURES_TOTAL
                .with_label_values(&["invalid_credentials"])
                .inc();
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(_) => {
            AUTH_FAILURES_TOTAL
                .with_label_values(&["internal_error"])
                .inc();
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Extractor for the authenticated identity.
///
/// Falls back to the anonymous identity if the auth middleware did not run.
#[derive(Debug, Clone)]
pub struct AuthIdentity(pub Identity);

impl AuthIdentity {
    pub fn operator_id(&self) -> &str {
        &self.0.user_id
    }

    /// Capability gate in front of every engine call; 403 when missing.
    pub fn require(&self, permission: Permission) -> Result<(), Response> {
        check_capability(&self.0, permission).map_err(|e| {
            AUTH_FAILURES_TOTAL.with_label_values(&["forbidden"]).inc();
            ErrorResponse {
                error: e.to_string(),
            }
            .into_response_with(StatusCode::FORBIDDEN)
        })
    }
}

impl<S> FromRequestParts<S> for AuthIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let identity = parts
            .extensions
            .get::<Identity>()
            .cloned()
            .unwrap_or_else(Identity::anonymous);
        std::future::ready(Ok(AuthIdentity(identity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        http::{header, Request},
        middleware,
        routing::get,
        Router,
    };
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;
    use triage_core::{
        config::{ApiKeyConfig, AuthConfig, AuthMethod},
        create_authenticator, Config, LifecycleStateMachine, LogDispatcher, SettingsAggregator,
        SqliteActivityStore, SqliteSettingsStore, WebhookMailbox,
    };

    use crate::api::WsBroadcaster;

    async fn dummy_handler() -> &'static str {
        "OK"
    }

    async fn operator_handler(identity: AuthIdentity) -> String {
        identity.operator_id().to_string()
    }

    async fn force_stop_gate(identity: AuthIdentity) -> Response {
        match identity.require(Permission::ServiceForceStop) {
            Ok(()) => "allowed".into_response(),
            Err(response) => response,
        }
    }

    fn api_keys() -> Vec<ApiKeyConfig> {
        vec![
            ApiKeyConfig {
                key: "alice-key".to_string(),
                operator_id: "alice".to_string(),
                permissions: vec![Permission::ServiceControl, Permission::ServiceStatus],
            },
            ApiKeyConfig {
                key: "root-key".to_string(),
                operator_id: "root".to_string(),
                permissions: Permission::all(),
            },
        ]
    }

    fn create_test_state(method: AuthMethod) -> Arc<AppState> {
        let auth = AuthConfig {
            api_keys: if method == AuthMethod::ApiKey {
                api_keys()
            } else {
                vec![]
            },
            method,
        };
        let config = Config {
            auth: auth.clone(),
            server: Default::default(),
            database: Default::default(),
            ticketing: Default::default(),
            automation: Default::default(),
        };

        let mailbox = Arc::new(WebhookMailbox::new(8));
        let engine = LifecycleStateMachine::new(triage_core::EngineDeps {
            settings: SettingsAggregator::new(Arc::new(SqliteSettingsStore::in_memory().unwrap())),
            mailbox: mailbox.clone(),
            ticketing: Arc::new(triage_core::testing::MockTicketingApi::new()),
            log: LogDispatcher::disabled(),
            automation: Default::default(),
        });

        Arc::new(AppState::new(
            config,
            Arc::from(create_authenticator(&auth).unwrap()),
            engine,
            Arc::new(SqliteActivityStore::in_memory().unwrap()),
            mailbox,
            WsBroadcaster::default(),
        ))
    }

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/test", get(dummy_handler))
            .route("/whoami", get(operator_handler))
            .route("/force", get(force_stop_gate))
            .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state)
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_none_auth_allows_all() {
        let app = app(create_test_state(AuthMethod::None));

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_none_auth_uses_operator_header() {
        let app = app(create_test_state(AuthMethod::None));

        let request = Request::builder()
            .uri("/whoami")
            .header("X-Operator-Id", "carol")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(body_string(response).await, "carol");
    }

    #[tokio::test]
    async fn test_api_key_auth_valid() {
        let app = app(create_test_state(AuthMethod::ApiKey));

        let request = Request::builder()
            .uri("/whoami")
            .header(header::AUTHORIZATION, "Bearer alice-key")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "alice");
    }

    #[tokio::test]
    async fn test_api_key_auth_invalid() {
        let app = app(create_test_state(AuthMethod::ApiKey));

        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer wrong-key")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_api_key_auth_missing() {
        let app = app(create_test_state(AuthMethod::ApiKey));

        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_x_api_key_header() {
        let app = app(create_test_state(AuthMethod::ApiKey));

        let request = Request::builder()
            .uri("/whoami")
            .header("X-API-Key", "root-key")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(body_string(response).await, "root");
    }

    #[tokio::test]
    async fn test_missing_capability_is_forbidden() {
        let state = create_test_state(AuthMethod::ApiKey);

        let request = Request::builder()
            .uri("/force")
            .header(header::AUTHORIZATION, "Bearer alice-key")
            .body(Body::empty())
            .unwrap();
        let response = app(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = Request::builder()
            .uri("/force")
            .header(header::AUTHORIZATION, "Bearer root-key")
            .body(Body::empty())
            .unwrap();
        let response = app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
