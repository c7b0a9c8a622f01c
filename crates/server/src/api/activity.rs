use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use triage_core::{ActivityFilter, ActivityLevel, ActivityRecord, Permission};

use super::middleware::{AuthIdentity, ErrorResponse};
use crate::state::AppState;

/// Maximum allowed limit for activity queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for activity queries
const DEFAULT_LIMIT: i64 = 100;

/// Query parameters for the activity endpoint
#[derive(Debug, Deserialize)]
pub struct ActivityQueryParams {
    /// Filter by level (status, info, warning, error, success)
    pub level: Option<String>,
    /// Records after this timestamp (ISO 8601)
    pub from: Option<DateTime<Utc>>,
    /// Records before this timestamp (ISO 8601)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of records to return (default 100, max 1000)
    pub limit: Option<i64>,
    /// Pagination offset (default 0)
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ActivityQueryResponse {
    /// Records, newest first
    pub events: Vec<ActivityRecord>,
    /// Total number of matching records
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

fn store_error(context: &str, e: impl std::fmt::Display) -> Response {
    ErrorResponse {
        error: format!("{}: {}", context, e),
    }
    .into_response_with(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Query the activity log.
pub async fn query_activity(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
    Query(params): Query<ActivityQueryParams>,
) -> Response {
    if let Err(response) = identity.require(Permission::ServiceStatus) {
        return response;
    }

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut base_filter = ActivityFilter::new();

    if let Some(ref level) = params.level {
        match ActivityLevel::parse(level) {
            Some(level) => base_filter = base_filter.with_level(level),
            None => {
                return ErrorResponse {
                    error: format!("Unknown activity level: {}", level),
                }
                .into_response_with(StatusCode::BAD_REQUEST)
            }
        }
    }

    if params.from.is_some() || params.to.is_some() {
        base_filter = base_filter.with_time_range(params.from, params.to);
    }

    let query_filter = base_filter.clone().with_limit(limit).with_offset(offset);

    let events = match state.activity_store().query(&query_filter) {
        Ok(events) => events,
        Err(e) => return store_error("Failed to query activity", e),
    };

    let total = match state.activity_store().count(&base_filter) {
        Ok(count) => count,
        Err(e) => return store_error("Failed to count activity", e),
    };

    Json(ActivityQueryResponse {
        events,
        total,
        limit,
        offset,
    })
    .into_response()
}
