use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use regex_lite::Regex;
use tracing::{debug, warn};

use super::{
    IssueTypeCatalog, IssueTypeProfile, MailCredentials, RuleSet, SettingsError, SettingsSnapshot,
    SettingsStore, TicketingCredentials,
};

/// Builds [`SettingsSnapshot`]s from a [`SettingsStore`].
#[derive(Clone)]
pub struct SettingsAggregator {
    store: Arc<dyn SettingsStore>,
}

impl SettingsAggregator {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Load everything one session needs for `operator_id`.
    ///
    /// Fails with `CredentialsMissing` when the operator has no stored
    /// credentials and `ConfigurationIncomplete` when the global ticketing
    /// settings are absent. Patterns are compiled here; a bad one fails with
    /// `InvalidPattern`. Structural checks are left to
    /// [`check_settings_integrity`].
    pub fn load(&self, operator_id: &str) -> Result<SettingsSnapshot, SettingsError> {
        let creds = self
            .store
            .credentials(operator_id)?
            .ok_or_else(|| SettingsError::CredentialsMissing(operator_id.to_string()))?;

        let ticketing = self.store.ticketing_settings()?.ok_or_else(|| {
            SettingsError::ConfigurationIncomplete("ticketing settings are not configured".to_string())
        })?;

        let new_issue_subject = compile(&ticketing.new_issue_subject_pattern)?;
        let issue_number = compile(&ticketing.issue_number_pattern)?;

        let mut profiles = Vec::new();
        for issue_type in self.store.issue_types()? {
            let pipeline = self.store.transition_steps(issue_type.id)?;
            let rule_sets = self
                .store
                .rule_sets(issue_type.id)?
                .iter()
                .map(|record| {
                    RuleSet::compile(record).map_err(|(pattern, e)| SettingsError::InvalidPattern {
                        pattern,
                        reason: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            profiles.push(IssueTypeProfile {
                id: issue_type.id,
                name: issue_type.name,
                pipeline,
                rule_sets,
            });
        }

        let catalog = IssueTypeCatalog::new(profiles);
        debug!(
            operator_id = %operator_id,
            issue_types = catalog.len(),
            "Loaded settings snapshot"
        );

        Ok(SettingsSnapshot {
            operator_id: operator_id.to_string(),
            ticketing: TicketingCredentials {
                base_url: ticketing.base_url.trim_end_matches('/').to_string(),
                user_id: creds.ticketing_user,
                password: creds.ticketing_password,
            },
            mail: MailCredentials {
                address: creds.mail_address,
                password: creds.mail_password,
            },
            new_issue_subject,
            issue_number,
            issue_fields: ticketing.issue_fields,
            catalog,
            loaded_at: Utc::now(),
        })
    }
}

fn compile(pattern: &str) -> Result<Regex, SettingsError> {
    Regex::new(pattern).map_err(|e| SettingsError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Structural problems that make a snapshot unusable. Empty when the
/// snapshot is fit to run.
pub fn integrity_issues(snapshot: &SettingsSnapshot) -> Vec<String> {
    let mut issues = Vec::new();

    let base_url = &snapshot.ticketing.base_url;
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        issues.push(format!("ticketing base URL '{}' is not an http(s) URL", base_url));
    }

    if snapshot.issue_number.captures_len() < 2 {
        issues.push("issue-number pattern has no capture group".to_string());
    }

    if snapshot.catalog.is_empty() {
        issues.push("no issue types configured".to_string());
    }

    let known: HashSet<_> = snapshot.issue_fields.iter().copied().collect();

    for profile in snapshot.catalog.profiles() {
        let label = format!("issue type '{}' ({})", profile.name, profile.id);

        if profile.pipeline.is_empty() {
            issues.push(format!("{} has an empty pipeline", label));
        }

        let mut orders = HashSet::new();
        for step in &profile.pipeline {
            if !orders.insert(step.execution_order) {
                issues.push(format!(
                    "{} has duplicate execution order {}",
                    label, step.execution_order
                ));
            }
            if step.status.trim().is_empty() {
                issues.push(format!(
                    "{} step {} has an empty status",
                    label, step.execution_order
                ));
            }
        }

        if profile.rule_sets.is_empty() {
            warn!(issue_type = %profile.name, "Issue type has no rule sets and can never be selected");
        }

        for rule_set in &profile.rule_sets {
            if rule_set.rules.is_empty() {
                issues.push(format!("{} rule set {} has no rules", label, rule_set.id));
            }
            for rule in &rule_set.rules {
                if !known.contains(&rule.field) {
                    issues.push(format!(
                        "{} rule set {} targets field '{}' which is not a known issue field",
                        label, rule_set.id, rule.field
                    ));
                }
            }
        }
    }

    issues
}

/// `true` iff the snapshot has no integrity issues.
pub fn check_settings_integrity(snapshot: &SettingsSnapshot) -> bool {
    let issues = integrity_issues(snapshot);
    for issue in &issues {
        warn!(operator_id = %snapshot.operator_id, "Settings integrity: {}", issue);
    }
    issues.is_empty()
}
