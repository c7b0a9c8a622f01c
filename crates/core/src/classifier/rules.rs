use crate::settings::{IssueTypeCatalog, IssueTypeProfile, RuleSet};
use crate::ticketing::RemoteIssueRecord;

/// A rule set matches iff every rule in it holds for the record.
pub fn rule_set_matches(rule_set: &RuleSet, record: &RemoteIssueRecord) -> bool {
    rule_set
        .rules
        .iter()
        .all(|rule| rule.evaluate(record.field(rule.field)))
}

/// The issue type selected for a record and the rule set that selected it.
#[derive(Debug, Clone, Copy)]
pub struct Classification<'a> {
    pub profile: &'a IssueTypeProfile,
    pub rule_set_id: i64,
}

/// First issue type, by ascending id, with a matching rule set (also by
/// ascending id). `None` is a classification miss.
pub fn classify<'a>(
    catalog: &'a IssueTypeCatalog,
    record: &RemoteIssueRecord,
) -> Option<Classification<'a>> {
    catalog.profiles().iter().find_map(|profile| {
        profile
            .rule_sets
            .iter()
            .find(|rule_set| rule_set_matches(rule_set, record))
            .map(|rule_set| Classification {
                profile,
                rule_set_id: rule_set.id,
            })
    })
}
