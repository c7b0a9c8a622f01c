//! Common test utilities for in-process server tests.
//!
//! The fixture wires the real router, engine, webhook mailbox and SQLite
//! stores, with only the ticketing system mocked.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use triage_core::{
    config::{ApiKeyConfig, AuthConfig, AutomationConfig, DatabaseConfig, ServerConfig},
    create_activity_system, create_authenticator, ActivityStore, AuthMethod, Authenticator, Config, EngineDeps,
    LifecycleStateMachine, Permission, SettingsAggregator, SqliteActivityStore,
    SqliteSettingsStore, WebhookMailbox,
};

/// Re-export fixtures for test convenience
pub use triage_core::testing::{fixtures, MockTicketingApi};

/// Operator with start/stop and status rights. Has stored credentials.
pub const ALICE_KEY: &str = "alice-key";
/// Second ordinary operator. Has stored credentials.
pub const BOB_KEY: &str = "bob-key";
/// Supervisor with every permission and no stored credentials.
pub const ROOT_KEY: &str = "root-key";

/// Test fixture for in-process API testing.
pub struct TestFixture {
    pub router: Router,
    pub engine: LifecycleStateMachine,
    pub ticketing: Arc<MockTicketingApi>,
    pub mailbox: Arc<WebhookMailbox>,
    pub settings: Arc<SqliteSettingsStore>,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

fn api_key(key: &str, operator_id: &str, permissions: Vec<Permission>) -> ApiKeyConfig {
    ApiKeyConfig {
        key: key.to_string(),
        operator_id: operator_id.to_string(),
        permissions,
    }
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let operator = vec![Permission::ServiceControl, Permission::ServiceStatus];
        let config = Config {
            auth: AuthConfig {
                method: AuthMethod::ApiKey,
                api_keys: vec![
                    api_key(ALICE_KEY, "alice", operator.clone()),
                    api_key(BOB_KEY, "bob", operator),
                    api_key(ROOT_KEY, "root", Permission::all()),
                ],
            },
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            ticketing: Default::default(),
            automation: AutomationConfig {
                reconnect_base_delay_ms: 5,
                ..Default::default()
            },
        };

        let settings = Arc::new(
            SqliteSettingsStore::new(&db_path).expect("Failed to create settings store"),
        );
        fixtures::seed_settings(&settings, &["alice", "bob"], "http://tickets.test")
            .expect("Failed to seed settings");

        let activity_store: Arc<dyn ActivityStore> = Arc::new(
            SqliteActivityStore::new(&db_path).expect("Failed to create activity store"),
        );
        let (log, activity_writer) = create_activity_system(Arc::clone(&activity_store), 100);
        let ws_broadcaster = triage_server::api::WsBroadcaster::default();
        tokio::spawn(activity_writer.run());

        let ticketing = Arc::new(MockTicketingApi::new());
        let mailbox = Arc::new(WebhookMailbox::new(16));
        let engine = LifecycleStateMachine::new(EngineDeps {
            settings: SettingsAggregator::new(settings.clone()),
            mailbox: mailbox.clone(),
            ticketing: ticketing.clone(),
            log,
            automation: config.automation.clone(),
        });

        let authenticator: Arc<dyn Authenticator> =
            Arc::from(create_authenticator(&config.auth).expect("Failed to create authenticator"));

        let state = Arc::new(triage_server::state::AppState::new(
            config,
            authenticator,
            engine.clone(),
            activity_store,
            mailbox.clone(),
            ws_broadcaster,
        ));

        Self {
            router: triage_server::api::create_router(state),
            engine,
            ticketing,
            mailbox,
            settings,
            temp_dir,
        }
    }

    /// Send an unauthenticated GET request.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None, None).await
    }

    /// Send a GET request as the holder of `key`.
    pub async fn get_as(&self, key: &str, path: &str) -> TestResponse {
        self.request("GET", path, Some(key), None).await
    }

    /// Send a POST request without body as the holder of `key`.
    pub async fn post_as(&self, key: &str, path: &str) -> TestResponse {
        self.request("POST", path, Some(key), None).await
    }

    /// Send a POST request with JSON body as the holder of `key`.
    pub async fn post_json_as(&self, key: &str, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(key), Some(body)).await
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        key: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        if let Some(key) = key {
            request_builder = request_builder.header("Authorization", format!("Bearer {}", key));
        }

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }

    /// Poll `path` until `predicate` accepts the response body.
    pub async fn wait_for_json(
        &self,
        key: &str,
        path: &str,
        predicate: impl Fn(&Value) -> bool,
    ) -> bool {
        for _ in 0..100 {
            if predicate(&self.get_as(key, path).await.body) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
