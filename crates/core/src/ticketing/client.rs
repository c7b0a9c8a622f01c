use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::TicketingClientConfig;
use crate::metrics::TICKETING_REQUESTS;
use crate::settings::TicketingCredentials;

use super::retry::{with_retry, RetryPolicy};
use super::{xml, RemoteIssueRecord, TicketingError, UpdateParams};

/// Remote ticketing system.
#[async_trait]
pub trait TicketingApi: Send + Sync {
    /// Fetch one issue.
    async fn get_issue(
        &self,
        creds: &TicketingCredentials,
        issue_id: &str,
    ) -> Result<RemoteIssueRecord, TicketingError>;

    /// Apply an update and return the raw response body. Judging whether the
    /// body confirms the update is the caller's job.
    async fn update_issue(
        &self,
        creds: &TicketingCredentials,
        issue_id: &str,
        params: &UpdateParams,
    ) -> Result<String, TicketingError>;
}

/// Client for the `ev_api.action` query-string API.
///
/// One pooled `reqwest` client is shared by every processing chain.
/// Credentials travel in the query string, so URLs are never logged and
/// transport errors are stripped of theirs.
pub struct EvApiClient {
    client: Client,
    retry: RetryPolicy,
}

impl EvApiClient {
    pub fn new(config: &TicketingClientConfig) -> Result<Self, TicketingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| TicketingError::Transport(e.without_url().to_string()))?;

        Ok(Self {
            client,
            retry: RetryPolicy::from(config),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_url(
        creds: &TicketingCredentials,
        statevar: &str,
        issue_id: &str,
        extra: &[(&'static str, String)],
    ) -> String {
        let mut url = format!(
            "{}/ev_api.action?user_id={}&password={}&statevar={}&id={}",
            creds.base_url.trim_end_matches('/'),
            urlencoding::encode(&creds.user_id),
            urlencoding::encode(&creds.password),
            statevar,
            urlencoding::encode(issue_id),
        );
        for (key, value) in extra {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    /// One GET, mapped to a body or a classified error.
    async fn send(&self, url: &str, operation: &'static str) -> Result<String, TicketingError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            TICKETING_REQUESTS
                .with_label_values(&[operation, "transport_error"])
                .inc();
            TicketingError::Transport(e.without_url().to_string())
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TicketingError::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            TICKETING_REQUESTS
                .with_label_values(&[operation, "http_error"])
                .inc();
            return Err(TicketingError::from_status(status.as_u16(), &body));
        }

        TICKETING_REQUESTS.with_label_values(&[operation, "ok"]).inc();
        Ok(body)
    }
}

#[async_trait]
impl TicketingApi for EvApiClient {
    async fn get_issue(
        &self,
        creds: &TicketingCredentials,
        issue_id: &str,
    ) -> Result<RemoteIssueRecord, TicketingError> {
        let url = &Self::build_url(creds, "get", issue_id, &[]);
        debug!(issue_id = %issue_id, "Fetching issue");

        let body = with_retry(&self.retry, "get_issue", move || self.send(url, "get")).await?;
        xml::parse_issue(&body, issue_id)
    }

    async fn update_issue(
        &self,
        creds: &TicketingCredentials,
        issue_id: &str,
        params: &UpdateParams,
    ) -> Result<String, TicketingError> {
        let url = &Self::build_url(creds, "update", issue_id, params.pairs());
        debug!(issue_id = %issue_id, params = params.pairs().len(), "Updating issue");

        with_retry(&self.retry, "update_issue", move || self.send(url, "update")).await
    }
}
