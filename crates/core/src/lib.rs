pub mod activity;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod mailbox;
pub mod metrics;
pub mod pipeline;
pub mod settings;
pub mod testing;
pub mod ticketing;

pub use activity::{
    create_activity_system, ActivityError, ActivityEvent, ActivityFilter, ActivityLevel,
    ActivityRecord, ActivityStore, ActivityWriter, LogDispatcher, SqliteActivityStore,
};
pub use auth::{
    check_capability, create_authenticator, AuthError, AuthRequest, Authenticator, Identity,
    NoneAuthenticator, Permission,
};
pub use classifier::{classify, ClassifyError, IssueProcessor, ProcessOutcome};
pub use config::{
    load_config, load_config_from_str, validate_config, AuthMethod, Config, ConfigError,
    SanitizedConfig,
};
pub use engine::{
    ControlError, ControlResponse, EngineDeps, LifecycleStateMachine, RequestStatus,
    ServiceState, ServiceStatus, StatusResponse,
};
pub use mailbox::{
    CandidateEvent, InboundMail, IngestReceipt, MailboxError, MailboxListener, MailboxService,
    WebhookMailbox,
};
pub use pipeline::{PipelineError, UpdatePipelineExecutor};
pub use settings::{
    check_settings_integrity, SettingsAggregator, SettingsError, SettingsSnapshot, SettingsStore,
    SqliteSettingsStore,
};
pub use ticketing::{EvApiClient, RemoteIssueRecord, TicketingApi, TicketingError};
