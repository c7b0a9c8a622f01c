//! Service control endpoints: start, stop, force-stop and status.
//!
//! Every handler checks the caller's capability before touching the engine.
//! Control replies always carry the engine's state after the request, also
//! on failure.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};
use triage_core::{
    ControlError, ControlResponse, LifecycleStateMachine, Permission, ServiceStatus,
    StatusResponse,
};

use super::middleware::AuthIdentity;
use crate::state::AppState;

/// HTTP status for a failed control request.
pub fn control_error_status(error: &ControlError) -> StatusCode {
    match error {
        ControlError::ServiceBusy
        | ControlError::NotOwner
        | ControlError::NotRunning
        | ControlError::Cancelled => StatusCode::CONFLICT,
        ControlError::ConfigurationInvalid(_) | ControlError::CredentialFailure(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ControlError::TransportUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn control_reply(
    engine: &LifecycleStateMachine,
    operation: &'static str,
    result: Result<ServiceStatus, ControlError>,
    description: &str,
) -> Response {
    match result {
        Ok(status) => {
            info!(operation, state = status.state.as_str(), "Control request succeeded");
            Json(ControlResponse::success(&status, description)).into_response()
        }
        Err(e) => {
            warn!(operation, kind = e.kind(), error = %e, "Control request failed");
            (
                control_error_status(&e),
                Json(ControlResponse::failure(&engine.status(), &e)),
            )
                .into_response()
        }
    }
}

/// Start a session owned by the caller.
pub async fn start_service(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
) -> Response {
    if let Err(response) = identity.require(Permission::ServiceControl) {
        return response;
    }

    let engine = state.engine();
    let result = engine.request_start(identity.operator_id()).await;
    control_reply(engine, "start", result, "Service started")
}

/// Stop the caller's own session.
pub async fn stop_service(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
) -> Response {
    if let Err(response) = identity.require(Permission::ServiceControl) {
        return response;
    }

    let engine = state.engine();
    let result = engine.request_stop(identity.operator_id()).await;
    control_reply(engine, "stop", result, "Service stopped")
}

/// Stop whatever is running, regardless of owner.
pub async fn force_stop_service(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
) -> Response {
    if let Err(response) = identity.require(Permission::ServiceForceStop) {
        return response;
    }

    info!(operator_id = %identity.operator_id(), "Force stop requested");
    let engine = state.engine();
    let result = engine.request_force_stop().await;
    control_reply(engine, "force_stop", result, "Service force-stopped")
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    identity: AuthIdentity,
) -> Response {
    if let Err(response) = identity.require(Permission::ServiceStatus) {
        return response;
    }

    Json(StatusResponse::from(state.engine().status())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_error_status_mapping() {
        assert_eq!(
            control_error_status(&ControlError::ServiceBusy),
            StatusCode::CONFLICT
        );
        assert_eq!(
            control_error_status(&ControlError::NotOwner),
            StatusCode::CONFLICT
        );
        assert_eq!(
            control_error_status(&ControlError::NotRunning),
            StatusCode::CONFLICT
        );
        assert_eq!(
            control_error_status(&ControlError::Cancelled),
            StatusCode::CONFLICT
        );
        assert_eq!(
            control_error_status(&ControlError::ConfigurationInvalid("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            control_error_status(&ControlError::CredentialFailure("x".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            control_error_status(&ControlError::TransportUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
