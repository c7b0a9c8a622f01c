use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{activity, handlers, mailbox, middleware as mw, service, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Everything except health requires an authenticated operator
    let protected = Router::new()
        .route("/config", get(handlers::get_config))
        // Service control
        .route("/service/start", post(service::start_service))
        .route("/service/stop", post(service::stop_service))
        .route("/service/force-stop", post(service::force_stop_service))
        .route("/service/status", get(service::get_status))
        // Activity log
        .route("/activity", get(activity::query_activity))
        .route("/ws", get(ws::ws_handler))
        // Webhook mailbox
        .route("/mailbox/notifications", post(mailbox::ingest_notification))
        .route("/metrics", get(handlers::metrics))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            mw::auth_middleware,
        ));

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(mw::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
