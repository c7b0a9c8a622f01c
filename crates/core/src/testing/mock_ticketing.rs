//! Mock ticketing API for testing.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::settings::TicketingCredentials;
use crate::ticketing::{RemoteIssueRecord, TicketingApi, TicketingError, UpdateParams};

/// Mock implementation of the TicketingApi trait.
///
/// Issues are served from an in-memory map; unknown ids fail with an
/// HTTP 404 `EvApiFailure`. Updates answer "Issue updated" unless scripted
/// responses are queued with [`push_update_response`](Self::push_update_response).
#[derive(Clone)]
pub struct MockTicketingApi {
    issues: Arc<RwLock<HashMap<String, RemoteIssueRecord>>>,
    gets: Arc<RwLock<Vec<String>>>,
    updates: Arc<RwLock<Vec<(String, UpdateParams)>>>,
    update_responses: Arc<RwLock<VecDeque<Result<String, TicketingError>>>>,
    next_get_error: Arc<RwLock<Option<TicketingError>>>,
    latency: Arc<RwLock<Option<Duration>>>,
}

impl std::fmt::Debug for MockTicketingApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTicketingApi").finish_non_exhaustive()
    }
}

impl Default for MockTicketingApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTicketingApi {
    pub fn new() -> Self {
        Self {
            issues: Arc::new(RwLock::new(HashMap::new())),
            gets: Arc::new(RwLock::new(Vec::new())),
            updates: Arc::new(RwLock::new(Vec::new())),
            update_responses: Arc::new(RwLock::new(VecDeque::new())),
            next_get_error: Arc::new(RwLock::new(None)),
            latency: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn insert_issue(&self, record: RemoteIssueRecord) {
        self.issues.write().await.insert(record.id.clone(), record);
    }

    /// Queue the result of the next unscripted update call.
    pub async fn push_update_response(&self, response: Result<String, TicketingError>) {
        self.update_responses.write().await.push_back(response);
    }

    pub async fn fail_next_get(&self, error: TicketingError) {
        *self.next_get_error.write().await = Some(error);
    }

    /// Delay every `get_issue` call.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.write().await = Some(latency);
    }

    pub async fn recorded_gets(&self) -> Vec<String> {
        self.gets.read().await.clone()
    }

    pub async fn recorded_updates(&self) -> Vec<(String, UpdateParams)> {
        self.updates.read().await.clone()
    }

    /// Poll until at least `count` updates were recorded.
    pub async fn wait_for_updates(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.updates.read().await.len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl TicketingApi for MockTicketingApi {
    async fn get_issue(
        &self,
        _creds: &TicketingCredentials,
        issue_id: &str,
    ) -> Result<RemoteIssueRecord, TicketingError> {
        self.gets.write().await.push(issue_id.to_string());

        let latency = *self.latency.read().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(error) = self.next_get_error.write().await.take() {
            return Err(error);
        }

        self.issues
            .read()
            .await
            .get(issue_id)
            .cloned()
            .ok_or_else(|| TicketingError::EvApiFailure {
                status: Some(404),
                detail: format!("issue {} not found", issue_id),
            })
    }

    async fn update_issue(
        &self,
        _creds: &TicketingCredentials,
        issue_id: &str,
        params: &UpdateParams,
    ) -> Result<String, TicketingError> {
        self.updates
            .write()
            .await
            .push((issue_id.to_string(), params.clone()));

        self.update_responses
            .write()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(format!("Issue {} updated", issue_id)))
    }
}
