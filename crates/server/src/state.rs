use std::sync::Arc;

use triage_core::{
    ActivityStore, Authenticator, Config, LifecycleStateMachine, SanitizedConfig, WebhookMailbox,
};

use crate::api::WsBroadcaster;

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    engine: LifecycleStateMachine,
    activity_store: Arc<dyn ActivityStore>,
    mailbox: Arc<WebhookMailbox>,
    ws_broadcaster: WsBroadcaster,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        engine: LifecycleStateMachine,
        activity_store: Arc<dyn ActivityStore>,
        mailbox: Arc<WebhookMailbox>,
        ws_broadcaster: WsBroadcaster,
    ) -> Self {
        Self {
            config,
            authenticator,
            engine,
            activity_store,
            mailbox,
            ws_broadcaster,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn engine(&self) -> &LifecycleStateMachine {
        &self.engine
    }

    pub fn activity_store(&self) -> &dyn ActivityStore {
        self.activity_store.as_ref()
    }

    pub fn mailbox(&self) -> &WebhookMailbox {
        &self.mailbox
    }

    pub fn ws_broadcaster(&self) -> &WsBroadcaster {
        &self.ws_broadcaster
    }
}
