use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{ActivityError, ActivityEvent, ActivityFilter, ActivityLevel, ActivityRecord, ActivityStore};

/// SQLite-backed activity log
pub struct SqliteActivityStore {
    conn: Mutex<Connection>,
}

impl SqliteActivityStore {
    /// Open (or create) the activity log in the given database file
    pub fn new(path: &Path) -> Result<Self, ActivityError> {
        let conn = Connection::open(path).map_err(|e| ActivityError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory activity log (useful for testing)
    pub fn in_memory() -> Result<Self, ActivityError> {
        let conn =
            Connection::open_in_memory().map_err(|e| ActivityError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), ActivityError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS activity_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                data TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_activity_log_timestamp ON activity_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_activity_log_level ON activity_log(level);
            "#,
        )
        .map_err(|e| ActivityError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, ActivityError> {
        self.conn
            .lock()
            .map_err(|_| ActivityError::Database("connection lock poisoned".to_string()))
    }

    fn build_where_clause(filter: &ActivityFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(level) = filter.level {
            conditions.push("level = ?");
            params.push(Box::new(level.as_str().to_string()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("timestamp >= ?");
            params.push(Box::new(from.to_rfc3339()));
        }

        if let Some(ref to) = filter.to {
            conditions.push("timestamp <= ?");
            params.push(Box::new(to.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl ActivityStore for SqliteActivityStore {
    fn insert(&self, record: &ActivityRecord) -> Result<i64, ActivityError> {
        let conn = self.lock()?;

        let data_json = serde_json::to_string(&record.event)
            .map_err(|e| ActivityError::Serialization(e.to_string()))?;

        conn.execute(
            "INSERT INTO activity_log (timestamp, level, message, data) VALUES (?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.level.as_str(),
                record.event.message(),
                data_json,
            ],
        )
        .map_err(|e| ActivityError::Database(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &ActivityFilter) -> Result<Vec<ActivityRecord>, ActivityError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT id, timestamp, level, data FROM activity_log {} ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| ActivityError::Database(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let id: i64 = row.get(0)?;
                let timestamp: String = row.get(1)?;
                let level: String = row.get(2)?;
                let data: String = row.get(3)?;
                Ok((id, timestamp, level, data))
            })
            .map_err(|e| ActivityError::Database(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, timestamp_str, level_str, data_json) =
                row.map_err(|e| ActivityError::Database(e.to_string()))?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_str)
                .map_err(|e| ActivityError::Database(format!("Invalid timestamp: {}", e)))?
                .into();
            let level = ActivityLevel::parse(&level_str).ok_or_else(|| {
                ActivityError::Serialization(format!("Unknown level: {}", level_str))
            })?;
            let event: ActivityEvent = serde_json::from_str(&data_json)
                .map_err(|e| ActivityError::Serialization(e.to_string()))?;

            records.push(ActivityRecord {
                id,
                timestamp,
                level,
                event,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &ActivityFilter) -> Result<i64, ActivityError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM activity_log {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| ActivityError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(event: ActivityEvent) -> ActivityRecord {
        ActivityRecord {
            id: 0,
            timestamp: Utc::now(),
            level: event.level(),
            event,
        }
    }

    fn info(message: &str) -> ActivityRecord {
        record(ActivityEvent::Info {
            message: message.to_string(),
        })
    }

    fn error(message: &str) -> ActivityRecord {
        record(ActivityEvent::Error {
            message: message.to_string(),
        })
    }

    #[test]
    fn test_insert_and_query() {
        let store = SqliteActivityStore::in_memory().unwrap();

        let id = store.insert(&info("Listener opened")).unwrap();
        assert!(id > 0);

        let results = store.query(&ActivityFilter::new()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].level, ActivityLevel::Info);
        assert_eq!(results[0].event.message(), "Listener opened");
    }

    #[test]
    fn test_query_by_level() {
        let store = SqliteActivityStore::in_memory().unwrap();
        store.insert(&info("a")).unwrap();
        store.insert(&error("b")).unwrap();
        store.insert(&error("c")).unwrap();

        let errors = store
            .query(&ActivityFilter::new().with_level(ActivityLevel::Error))
            .unwrap();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|r| r.level == ActivityLevel::Error));
    }

    #[test]
    fn test_newest_first() {
        let store = SqliteActivityStore::in_memory().unwrap();
        let now = Utc::now();

        let mut old = info("old");
        old.timestamp = now - Duration::minutes(5);
        store.insert(&old).unwrap();
        let mut new = info("new");
        new.timestamp = now;
        store.insert(&new).unwrap();

        let results = store.query(&ActivityFilter::new()).unwrap();
        assert_eq!(results[0].event.message(), "new");
        assert_eq!(results[1].event.message(), "old");
    }

    #[test]
    fn test_query_with_time_range() {
        let store = SqliteActivityStore::in_memory().unwrap();
        let now = Utc::now();

        let mut old = info("old");
        old.timestamp = now - Duration::hours(2);
        store.insert(&old).unwrap();
        store.insert(&info("recent")).unwrap();

        let filter = ActivityFilter::new().with_time_range(Some(now - Duration::hours(1)), None);
        assert_eq!(store.query(&filter).unwrap().len(), 1);
    }

    #[test]
    fn test_pagination_and_count() {
        let store = SqliteActivityStore::in_memory().unwrap();
        for i in 0..5 {
            store.insert(&info(&format!("event {}", i))).unwrap();
        }

        let page = store
            .query(&ActivityFilter::new().with_limit(2).with_offset(4))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(store.count(&ActivityFilter::new()).unwrap(), 5);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("activity.db");

        let store = SqliteActivityStore::new(&db_path).unwrap();
        store.insert(&info("persisted")).unwrap();
        assert!(db_path.exists());

        drop(store);
        let reopened = SqliteActivityStore::new(&db_path).unwrap();
        assert_eq!(reopened.count(&ActivityFilter::new()).unwrap(), 1);
    }
}
