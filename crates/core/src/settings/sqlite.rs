use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::{
    FieldRuleRecord, IssueField, IssueTypeRecord, OperatorCredentials, RuleSetRecord,
    SettingsError, SettingsStore, TicketingSettings, TransitionStep,
};

/// SQLite-backed settings store.
///
/// Credential columns hold whatever the provisioning side wrote; values are
/// returned as stored.
pub struct SqliteSettingsStore {
    conn: Mutex<Connection>,
}

fn storage(e: rusqlite::Error) -> SettingsError {
    SettingsError::Storage(e.to_string())
}

impl SqliteSettingsStore {
    pub fn new(path: &Path) -> Result<Self, SettingsError> {
        let conn = Connection::open(path).map_err(storage)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, SettingsError> {
        let conn = Connection::open_in_memory().map_err(storage)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SettingsError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS operator_credentials (
                operator_id TEXT PRIMARY KEY,
                ticketing_user TEXT NOT NULL,
                ticketing_password TEXT NOT NULL,
                mail_address TEXT NOT NULL,
                mail_password TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ticketing_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                base_url TEXT NOT NULL,
                new_issue_subject_pattern TEXT NOT NULL,
                issue_number_pattern TEXT NOT NULL,
                issue_fields TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS issue_types (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transition_steps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                issue_type_id INTEGER NOT NULL REFERENCES issue_types(id),
                work_time INTEGER,
                status TEXT NOT NULL,
                assigned_group TEXT,
                request_type TEXT,
                execution_order INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rule_sets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                issue_type_id INTEGER NOT NULL REFERENCES issue_types(id)
            );

            CREATE TABLE IF NOT EXISTS field_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rule_set_id INTEGER NOT NULL REFERENCES rule_sets(id),
                field TEXT NOT NULL,
                pattern TEXT NOT NULL,
                is_regex INTEGER NOT NULL,
                is_negative INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transition_steps_type ON transition_steps(issue_type_id);
            CREATE INDEX IF NOT EXISTS idx_rule_sets_type ON rule_sets(issue_type_id);
            CREATE INDEX IF NOT EXISTS idx_field_rules_set ON field_rules(rule_set_id);
            "#,
        )
        .map_err(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SettingsError> {
        self.conn
            .lock()
            .map_err(|_| SettingsError::Storage("connection lock poisoned".to_string()))
    }

    /// Insert or replace an operator's credentials.
    pub fn put_credentials(&self, creds: &OperatorCredentials) -> Result<(), SettingsError> {
        let conn = self.lock()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO operator_credentials
               (operator_id, ticketing_user, ticketing_password, mail_address, mail_password)
               VALUES (?, ?, ?, ?, ?)"#,
            params![
                creds.operator_id,
                creds.ticketing_user,
                creds.ticketing_password,
                creds.mail_address,
                creds.mail_password,
            ],
        )
        .map_err(storage)?;
        Ok(())
    }

    pub fn put_ticketing_settings(&self, settings: &TicketingSettings) -> Result<(), SettingsError> {
        let fields = serde_json::to_string(&settings.issue_fields)
            .map_err(|e| SettingsError::Storage(e.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO ticketing_settings
               (id, base_url, new_issue_subject_pattern, issue_number_pattern, issue_fields)
               VALUES (1, ?, ?, ?, ?)"#,
            params![
                settings.base_url,
                settings.new_issue_subject_pattern,
                settings.issue_number_pattern,
                fields,
            ],
        )
        .map_err(storage)?;
        Ok(())
    }

    /// Returns the new issue type id.
    pub fn insert_issue_type(&self, name: &str) -> Result<i64, SettingsError> {
        let conn = self.lock()?;
        conn.execute("INSERT INTO issue_types (name) VALUES (?)", params![name])
            .map_err(storage)?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_transition_step(
        &self,
        issue_type_id: i64,
        step: &TransitionStep,
    ) -> Result<i64, SettingsError> {
        let conn = self.lock()?;
        conn.execute(
            r#"INSERT INTO transition_steps
               (issue_type_id, work_time, status, assigned_group, request_type, execution_order)
               VALUES (?, ?, ?, ?, ?, ?)"#,
            params![
                issue_type_id,
                step.work_time,
                step.status,
                step.assigned_group,
                step.request_type,
                step.execution_order,
            ],
        )
        .map_err(storage)?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a rule set and its rules atomically. Returns the rule set id.
    pub fn insert_rule_set(
        &self,
        issue_type_id: i64,
        rules: &[FieldRuleRecord],
    ) -> Result<i64, SettingsError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(storage)?;
        tx.execute(
            "INSERT INTO rule_sets (issue_type_id) VALUES (?)",
            params![issue_type_id],
        )
        .map_err(storage)?;
        let rule_set_id = tx.last_insert_rowid();
        for rule in rules {
            tx.execute(
                r#"INSERT INTO field_rules (rule_set_id, field, pattern, is_regex, is_negative)
                   VALUES (?, ?, ?, ?, ?)"#,
                params![
                    rule_set_id,
                    rule.field.as_str(),
                    rule.pattern,
                    rule.is_regex,
                    rule.is_negative,
                ],
            )
            .map_err(storage)?;
        }
        tx.commit().map_err(storage)?;
        Ok(rule_set_id)
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn credentials(&self, operator_id: &str) -> Result<Option<OperatorCredentials>, SettingsError> {
        let conn = self.lock()?;
        conn.query_row(
            r#"SELECT operator_id, ticketing_user, ticketing_password, mail_address, mail_password
               FROM operator_credentials WHERE operator_id = ?"#,
            params![operator_id],
            |row| {
                Ok(OperatorCredentials {
                    operator_id: row.get(0)?,
                    ticketing_user: row.get(1)?,
                    ticketing_password: row.get(2)?,
                    mail_address: row.get(3)?,
                    mail_password: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(storage)
    }

    fn ticketing_settings(&self) -> Result<Option<TicketingSettings>, SettingsError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"SELECT base_url, new_issue_subject_pattern, issue_number_pattern, issue_fields
                   FROM ticketing_settings WHERE id = 1"#,
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(storage)?;

        let Some((base_url, subject, number, fields_json)) = row else {
            return Ok(None);
        };

        let issue_fields: Vec<IssueField> = serde_json::from_str(&fields_json).map_err(|e| {
            SettingsError::ConfigurationIncomplete(format!("issue field list is unreadable: {}", e))
        })?;

        Ok(Some(TicketingSettings {
            base_url,
            new_issue_subject_pattern: subject,
            issue_number_pattern: number,
            issue_fields,
        }))
    }

    fn issue_types(&self) -> Result<Vec<IssueTypeRecord>, SettingsError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name FROM issue_types ORDER BY id")
            .map_err(storage)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(IssueTypeRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .map_err(storage)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    fn transition_steps(&self, issue_type_id: i64) -> Result<Vec<TransitionStep>, SettingsError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"SELECT work_time, status, assigned_group, request_type, execution_order
                   FROM transition_steps WHERE issue_type_id = ?
                   ORDER BY execution_order, id"#,
            )
            .map_err(storage)?;
        let rows = stmt
            .query_map(params![issue_type_id], |row| {
                Ok(TransitionStep {
                    work_time: row.get(0)?,
                    status: row.get(1)?,
                    assigned_group: row.get(2)?,
                    request_type: row.get(3)?,
                    execution_order: row.get(4)?,
                })
            })
            .map_err(storage)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(storage)
    }

    fn rule_sets(&self, issue_type_id: i64) -> Result<Vec<RuleSetRecord>, SettingsError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id FROM rule_sets WHERE issue_type_id = ? ORDER BY id")
            .map_err(storage)?;
        let ids = stmt
            .query_map(params![issue_type_id], |row| row.get::<_, i64>(0))
            .map_err(storage)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(storage)?;

        let mut rule_stmt = conn
            .prepare(
                r#"SELECT field, pattern, is_regex, is_negative
                   FROM field_rules WHERE rule_set_id = ? ORDER BY id"#,
            )
            .map_err(storage)?;

        let mut rule_sets = Vec::with_capacity(ids.len());
        for id in ids {
            let raw = rule_stmt
                .query_map(params![id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                })
                .map_err(storage)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(storage)?;

            let mut rules = Vec::with_capacity(raw.len());
            for (field, pattern, is_regex, is_negative) in raw {
                let field = IssueField::parse(&field).ok_or_else(|| {
                    SettingsError::ConfigurationIncomplete(format!(
                        "rule set {} targets unknown field '{}'",
                        id, field
                    ))
                })?;
                rules.push(FieldRuleRecord {
                    field,
                    pattern,
                    is_regex,
                    is_negative,
                });
            }

            rule_sets.push(RuleSetRecord {
                id,
                owner_id: issue_type_id,
                rules,
            });
        }

        Ok(rule_sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(operator: &str) -> OperatorCredentials {
        OperatorCredentials {
            operator_id: operator.to_string(),
            ticketing_user: "svc-triage".to_string(),
            ticketing_password: "pw".to_string(),
            mail_address: "desk@example.com".to_string(),
            mail_password: "mail-pw".to_string(),
        }
    }

    #[test]
    fn test_credentials_round_trip_and_replace() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        assert!(store.credentials("alice").unwrap().is_none());

        store.put_credentials(&credentials("alice")).unwrap();
        let mut updated = credentials("alice");
        updated.ticketing_password = "rotated".to_string();
        store.put_credentials(&updated).unwrap();

        let loaded = store.credentials("alice").unwrap().unwrap();
        assert_eq!(loaded.ticketing_password, "rotated");
        assert!(store.credentials("bob").unwrap().is_none());
    }

    #[test]
    fn test_ticketing_settings_single_row() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        assert!(store.ticketing_settings().unwrap().is_none());

        let settings = TicketingSettings {
            base_url: "http://tickets.local".to_string(),
            new_issue_subject_pattern: "New issue".to_string(),
            issue_number_pattern: r"#(\d+)".to_string(),
            issue_fields: vec![IssueField::Company, IssueField::Description],
        };
        store.put_ticketing_settings(&settings).unwrap();
        store.put_ticketing_settings(&settings).unwrap();

        assert_eq!(store.ticketing_settings().unwrap(), Some(settings));
    }

    #[test]
    fn test_issue_type_with_steps_and_rule_sets() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        let outage = store.insert_issue_type("Outage").unwrap();
        let other = store.insert_issue_type("Other").unwrap();

        store
            .insert_transition_step(outage, &TransitionStep::new(2, "in_work").with_assigned_group("L1"))
            .unwrap();
        store
            .insert_transition_step(outage, &TransitionStep::new(1, "registered"))
            .unwrap();

        let first = store
            .insert_rule_set(
                outage,
                &[
                    FieldRuleRecord::contains(IssueField::Company, "Acme"),
                    FieldRuleRecord::regex(IssueField::Description, "server down").negated(),
                ],
            )
            .unwrap();
        store.insert_rule_set(other, &[]).unwrap();

        let types = store.issue_types().unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(types[0].name, "Outage");

        let steps = store.transition_steps(outage).unwrap();
        assert_eq!(steps[0].status, "registered");
        assert_eq!(steps[1].assigned_group.as_deref(), Some("L1"));

        let rule_sets = store.rule_sets(outage).unwrap();
        assert_eq!(rule_sets.len(), 1);
        assert_eq!(rule_sets[0].id, first);
        assert_eq!(rule_sets[0].owner_id, outage);
        assert_eq!(rule_sets[0].rules.len(), 2);
        assert!(rule_sets[0].rules[1].is_regex);
        assert!(rule_sets[0].rules[1].is_negative);
    }

    #[test]
    fn test_unknown_field_in_storage_is_reported() {
        let store = SqliteSettingsStore::in_memory().unwrap();
        let id = store.insert_issue_type("Broken").unwrap();
        let rule_set = store.insert_rule_set(id, &[]).unwrap();
        store
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO field_rules (rule_set_id, field, pattern, is_regex, is_negative) VALUES (?, 'colour', 'red', 0, 0)",
                params![rule_set],
            )
            .unwrap();

        let result = store.rule_sets(id);
        assert!(matches!(result, Err(SettingsError::ConfigurationIncomplete(_))));
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");
        {
            let store = SqliteSettingsStore::new(&path).unwrap();
            store.put_credentials(&credentials("alice")).unwrap();
        }
        let store = SqliteSettingsStore::new(&path).unwrap();
        assert!(store.credentials("alice").unwrap().is_some());
    }
}
