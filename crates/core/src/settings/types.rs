use serde::{Deserialize, Serialize};

/// Fields of a remote issue that rules may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueField {
    Author,
    Company,
    Status,
    Priority,
    AssignedGroup,
    Assignee,
    ShortDescription,
    Description,
    TimeCreated,
}

impl IssueField {
    pub fn all() -> &'static [IssueField] {
        &[
            IssueField::Author,
            IssueField::Company,
            IssueField::Status,
            IssueField::Priority,
            IssueField::AssignedGroup,
            IssueField::Assignee,
            IssueField::ShortDescription,
            IssueField::Description,
            IssueField::TimeCreated,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueField::Author => "author",
            IssueField::Company => "company",
            IssueField::Status => "status",
            IssueField::Priority => "priority",
            IssueField::AssignedGroup => "assigned_group",
            IssueField::Assignee => "assignee",
            IssueField::ShortDescription => "short_description",
            IssueField::Description => "description",
            IssueField::TimeCreated => "time_created",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|f| f.as_str() == s)
    }
}

impl std::fmt::Display for IssueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login for the ticketing system's query-string API.
#[derive(Clone, PartialEq, Eq)]
pub struct TicketingCredentials {
    pub base_url: String,
    pub user_id: String,
    pub password: String,
}

impl std::fmt::Debug for TicketingCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketingCredentials")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login for the watched mailbox.
#[derive(Clone, PartialEq, Eq)]
pub struct MailCredentials {
    pub address: String,
    pub password: String,
}

impl std::fmt::Debug for MailCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailCredentials")
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Stored per-operator credentials. The ticketing base URL is global and
/// joined in by the aggregator.
#[derive(Clone, PartialEq, Eq)]
pub struct OperatorCredentials {
    pub operator_id: String,
    pub ticketing_user: String,
    pub ticketing_password: String,
    pub mail_address: String,
    pub mail_password: String,
}

impl std::fmt::Debug for OperatorCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorCredentials")
            .field("operator_id", &self.operator_id)
            .field("ticketing_user", &self.ticketing_user)
            .field("ticketing_password", &"<redacted>")
            .field("mail_address", &self.mail_address)
            .field("mail_password", &"<redacted>")
            .finish()
    }
}

/// Global ticketing settings shared by every operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketingSettings {
    pub base_url: String,
    /// Mail subjects matching this pattern announce a new issue.
    pub new_issue_subject_pattern: String,
    /// First capture group yields the issue id.
    pub issue_number_pattern: String,
    /// Fields rules are allowed to target.
    pub issue_fields: Vec<IssueField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueTypeRecord {
    pub id: i64,
    pub name: String,
}

/// One remote state change. Unset optional fields are left out of the
/// update query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionStep {
    pub work_time: Option<u32>,
    pub status: String,
    pub assigned_group: Option<String>,
    pub request_type: Option<String>,
    pub execution_order: i32,
}

impl TransitionStep {
    pub fn new(execution_order: i32, status: impl Into<String>) -> Self {
        Self {
            work_time: None,
            status: status.into(),
            assigned_group: None,
            request_type: None,
            execution_order,
        }
    }

    pub fn with_assigned_group(mut self, group: impl Into<String>) -> Self {
        self.assigned_group = Some(group.into());
        self
    }

    pub fn with_request_type(mut self, request_type: impl Into<String>) -> Self {
        self.request_type = Some(request_type.into());
        self
    }

    pub fn with_work_time(mut self, minutes: u32) -> Self {
        self.work_time = Some(minutes);
        self
    }
}

/// Uncompiled field rule as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRuleRecord {
    pub field: IssueField,
    pub pattern: String,
    pub is_regex: bool,
    pub is_negative: bool,
}

impl FieldRuleRecord {
    pub fn contains(field: IssueField, pattern: impl Into<String>) -> Self {
        Self {
            field,
            pattern: pattern.into(),
            is_regex: false,
            is_negative: false,
        }
    }

    pub fn regex(field: IssueField, pattern: impl Into<String>) -> Self {
        Self {
            field,
            pattern: pattern.into(),
            is_regex: true,
            is_negative: false,
        }
    }

    pub fn negated(mut self) -> Self {
        self.is_negative = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSetRecord {
    pub id: i64,
    /// Issue type this rule set routes to.
    pub owner_id: i64,
    pub rules: Vec<FieldRuleRecord>,
}
