use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{ActivityLevel, ActivityRecord};

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Filter for querying the activity log
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub level: Option<ActivityLevel>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl ActivityFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_level(mut self, level: ActivityLevel) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_time_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Activity log storage
pub trait ActivityStore: Send + Sync {
    /// Insert a record, returns the assigned ID
    fn insert(&self, record: &ActivityRecord) -> Result<i64, ActivityError>;

    /// Query records, newest first
    fn query(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>, ActivityError>;

    /// Count matching records
    fn count(&self, filter: &ActivityFilter) -> Result<i64, ActivityError>;
}
