use chrono::{DateTime, Utc};
use regex_lite::Regex;

use super::{
    FieldRuleRecord, IssueField, MailCredentials, RuleSetRecord, TicketingCredentials,
    TransitionStep,
};

#[derive(Debug, Clone)]
enum Matcher {
    Contains(String),
    Regex(Regex),
}

/// A field rule with its pattern compiled.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub field: IssueField,
    pub pattern: String,
    pub is_regex: bool,
    pub is_negative: bool,
    matcher: Matcher,
}

impl FieldRule {
    pub fn compile(record: &FieldRuleRecord) -> Result<Self, regex_lite::Error> {
        let matcher = if record.is_regex {
            Matcher::Regex(Regex::new(&record.pattern)?)
        } else {
            Matcher::Contains(record.pattern.clone())
        };
        Ok(Self {
            field: record.field,
            pattern: record.pattern.clone(),
            is_regex: record.is_regex,
            is_negative: record.is_negative,
            matcher,
        })
    }

    /// Base predicate, before negation. Substring matching is case-sensitive.
    pub fn predicate(&self, value: &str) -> bool {
        match &self.matcher {
            Matcher::Contains(needle) => value.contains(needle.as_str()),
            Matcher::Regex(re) => re.is_match(value),
        }
    }

    /// `predicate XOR is_negative`.
    pub fn evaluate(&self, value: &str) -> bool {
        self.predicate(value) != self.is_negative
    }
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    pub id: i64,
    pub owner_id: i64,
    pub rules: Vec<FieldRule>,
}

impl RuleSet {
    pub fn compile(record: &RuleSetRecord) -> Result<Self, (String, regex_lite::Error)> {
        let rules = record
            .rules
            .iter()
            .map(|r| FieldRule::compile(r).map_err(|e| (r.pattern.clone(), e)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            id: record.id,
            owner_id: record.owner_id,
            rules,
        })
    }
}

#[derive(Debug, Clone)]
pub struct IssueTypeProfile {
    pub id: i64,
    pub name: String,
    /// Ascending execution order.
    pub pipeline: Vec<TransitionStep>,
    /// Ascending id; this is the classification priority.
    pub rule_sets: Vec<RuleSet>,
}

/// Issue types in classification order.
#[derive(Debug, Clone, Default)]
pub struct IssueTypeCatalog {
    profiles: Vec<IssueTypeProfile>,
}

impl IssueTypeCatalog {
    /// Sorts profiles by id, their rule sets by id and their pipelines by
    /// execution order, so scans over the catalog are deterministic.
    pub fn new(mut profiles: Vec<IssueTypeProfile>) -> Self {
        profiles.sort_by_key(|p| p.id);
        for profile in &mut profiles {
            profile.rule_sets.sort_by_key(|r| r.id);
            profile.pipeline.sort_by_key(|s| s.execution_order);
        }
        Self { profiles }
    }

    pub fn profiles(&self) -> &[IssueTypeProfile] {
        &self.profiles
    }

    pub fn get(&self, id: i64) -> Option<&IssueTypeProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Immutable per-session configuration. Built once at start, shared behind
/// an `Arc` by every processing chain, dropped on stop.
#[derive(Debug, Clone)]
pub struct SettingsSnapshot {
    pub operator_id: String,
    pub ticketing: TicketingCredentials,
    pub mail: MailCredentials,
    pub new_issue_subject: Regex,
    pub issue_number: Regex,
    pub issue_fields: Vec<IssueField>,
    pub catalog: IssueTypeCatalog,
    pub loaded_at: DateTime<Utc>,
}

impl SettingsSnapshot {
    /// Issue id from the first capture group of the issue-number pattern.
    pub fn extract_issue_id(&self, text: &str) -> Option<String> {
        self.issue_number
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|id| !id.is_empty())
    }

    pub fn is_new_issue_subject(&self, subject: &str) -> bool {
        self.new_issue_subject.is_match(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, is_regex: bool, is_negative: bool) -> FieldRule {
        FieldRule::compile(&FieldRuleRecord {
            field: IssueField::Company,
            pattern: pattern.to_string(),
            is_regex,
            is_negative,
        })
        .unwrap()
    }

    #[test]
    fn test_contains_is_case_sensitive() {
        let r = rule("Acme", false, false);
        assert!(r.evaluate("Acme Corp"));
        assert!(!r.evaluate("acme corp"));
    }

    #[test]
    fn test_negation_inverts_predicate() {
        for (value, expected) in [("Acme Corp", false), ("Globex", true)] {
            let r = rule("Acme", false, true);
            assert_eq!(r.evaluate(value), expected);
            assert_eq!(r.predicate(value), !expected);
        }

        let r = rule(r"^\d+$", true, true);
        assert!(!r.evaluate("12345"));
        assert!(r.evaluate("abc"));
    }

    #[test]
    fn test_invalid_regex_fails_to_compile() {
        let record = FieldRuleRecord::regex(IssueField::Description, "(unclosed");
        assert!(FieldRule::compile(&record).is_err());
    }

    #[test]
    fn test_catalog_sorts_profiles_rule_sets_and_pipeline() {
        let profile = |id: i64, rule_set_ids: &[i64], orders: &[i32]| IssueTypeProfile {
            id,
            name: format!("type-{}", id),
            pipeline: orders
                .iter()
                .map(|o| TransitionStep::new(*o, "s"))
                .collect(),
            rule_sets: rule_set_ids
                .iter()
                .map(|r| RuleSet {
                    id: *r,
                    owner_id: id,
                    rules: vec![],
                })
                .collect(),
        };

        let catalog = IssueTypeCatalog::new(vec![
            profile(7, &[3, 1], &[2, 1]),
            profile(2, &[9, 4], &[5]),
        ]);

        let ids: Vec<i64> = catalog.profiles().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 7]);
        let type7 = catalog.get(7).unwrap();
        assert_eq!(
            type7.rule_sets.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(
            type7
                .pipeline
                .iter()
                .map(|s| s.execution_order)
                .collect::<Vec<_>>(),
            vec![1, 2]
        );
    }
}
