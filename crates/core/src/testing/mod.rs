//! Testing utilities and mock implementations.
//!
//! Mocks for the two external collaborators (ticketing API and mailbox) plus
//! fixtures for snapshots, events and seeded settings stores, so the whole
//! engine can be exercised without real infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use triage_core::testing::{fixtures, MockMailbox, MockTicketingApi};
//!
//! let mailbox = MockMailbox::new();
//! let ticketing = MockTicketingApi::new();
//! ticketing.insert_issue(fixtures::acme_outage_issue("42")).await;
//!
//! // Start the engine with these, then:
//! mailbox.deliver(fixtures::new_issue_mail("m1", "42")).await;
//! ```

mod mock_mailbox;
mod mock_ticketing;

pub use mock_mailbox::MockMailbox;
pub use mock_ticketing::MockTicketingApi;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;
    use regex_lite::Regex;

    use crate::mailbox::{CandidateEvent, MailItem};
    use crate::settings::{
        FieldRuleRecord, IssueField, IssueTypeCatalog, IssueTypeProfile, MailCredentials,
        OperatorCredentials, RuleSet, RuleSetRecord, SettingsError, SettingsSnapshot,
        SqliteSettingsStore, TicketingCredentials, TicketingSettings, TransitionStep,
    };
    use crate::ticketing::RemoteIssueRecord;

    pub const NEW_ISSUE_SUBJECT: &str = "^New issue";
    pub const ISSUE_NUMBER: &str = r"#(\d+)";

    pub fn ticketing_credentials() -> TicketingCredentials {
        TicketingCredentials {
            base_url: "http://tickets.test".to_string(),
            user_id: "svc-triage".to_string(),
            password: "ticket-secret".to_string(),
        }
    }

    pub fn mail_credentials() -> MailCredentials {
        MailCredentials {
            address: "helpdesk@example.com".to_string(),
            password: "mail-secret".to_string(),
        }
    }

    /// An issue type whose rule sets get ids `id * 100 + n`.
    pub fn profile(
        id: i64,
        name: &str,
        pipeline: Vec<TransitionStep>,
        rule_sets: Vec<Vec<FieldRuleRecord>>,
    ) -> IssueTypeProfile {
        IssueTypeProfile {
            id,
            name: name.to_string(),
            pipeline,
            rule_sets: rule_sets
                .into_iter()
                .enumerate()
                .map(|(n, rules)| {
                    RuleSet::compile(&RuleSetRecord {
                        id: id * 100 + n as i64,
                        owner_id: id,
                        rules,
                    })
                    .map_err(|(pattern, e)| format!("{}: {}", pattern, e))
                    .unwrap()
                })
                .collect(),
        }
    }

    /// Snapshot for operator `alice` with the default patterns and every
    /// issue field known.
    pub fn snapshot(profiles: Vec<IssueTypeProfile>) -> SettingsSnapshot {
        SettingsSnapshot {
            operator_id: "alice".to_string(),
            ticketing: ticketing_credentials(),
            mail: mail_credentials(),
            new_issue_subject: Regex::new(NEW_ISSUE_SUBJECT).unwrap(),
            issue_number: Regex::new(ISSUE_NUMBER).unwrap(),
            issue_fields: IssueField::all().to_vec(),
            catalog: IssueTypeCatalog::new(profiles),
            loaded_at: Utc::now(),
        }
    }

    pub fn new_issue_mail(item_id: &str, issue_id: &str) -> MailItem {
        MailItem {
            item_id: item_id.to_string(),
            subject: format!("New issue #{} registered", issue_id),
            body: format!("Issue #{} was registered in the service desk.", issue_id),
        }
    }

    pub fn new_issue_event(issue_id: &str) -> CandidateEvent {
        CandidateEvent::from(new_issue_mail(&format!("mail-{}", issue_id), issue_id))
    }

    /// Record that the seeded "Outage" type selects.
    pub fn acme_outage_issue(id: &str) -> RemoteIssueRecord {
        RemoteIssueRecord {
            id: id.to_string(),
            author: "j.doe".to_string(),
            company: "Acme Corp".to_string(),
            status: "new".to_string(),
            priority: "High".to_string(),
            short_description: "Mail server unreachable".to_string(),
            description: "Since 9:00 the mail server down alarm is on".to_string(),
            time_created: "2024-03-01 09:12".to_string(),
            ..Default::default()
        }
    }

    pub fn operator_credentials(operator_id: &str) -> OperatorCredentials {
        OperatorCredentials {
            operator_id: operator_id.to_string(),
            ticketing_user: "svc-triage".to_string(),
            ticketing_password: "ticket-secret".to_string(),
            mail_address: "helpdesk@example.com".to_string(),
            mail_password: "mail-secret".to_string(),
        }
    }

    /// Seed credentials for `operators`, the global ticketing settings and
    /// one "Outage" issue type (Acme company + "server down" description,
    /// two-step pipeline). Returns the issue type id.
    pub fn seed_settings(
        store: &SqliteSettingsStore,
        operators: &[&str],
        base_url: &str,
    ) -> Result<i64, SettingsError> {
        for operator in operators {
            store.put_credentials(&operator_credentials(operator))?;
        }
        store.put_ticketing_settings(&TicketingSettings {
            base_url: base_url.to_string(),
            new_issue_subject_pattern: NEW_ISSUE_SUBJECT.to_string(),
            issue_number_pattern: ISSUE_NUMBER.to_string(),
            issue_fields: IssueField::all().to_vec(),
        })?;

        let outage = store.insert_issue_type("Outage")?;
        store.insert_transition_step(outage, &TransitionStep::new(1, "registered"))?;
        store.insert_transition_step(
            outage,
            &TransitionStep::new(2, "in_work").with_assigned_group("L1"),
        )?;
        store.insert_rule_set(
            outage,
            &[
                FieldRuleRecord::contains(IssueField::Company, "Acme"),
                FieldRuleRecord::regex(IssueField::Description, "server down"),
            ],
        )?;
        Ok(outage)
    }
}
