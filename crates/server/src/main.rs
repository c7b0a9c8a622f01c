use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_core::{
    create_activity_system, create_authenticator, load_config, validate_config, ActivityRecord,
    ActivityStore,
    Authenticator, EngineDeps, EvApiClient, LifecycleStateMachine, SettingsAggregator,
    SqliteActivityStore, SqliteSettingsStore, TicketingApi, WebhookMailbox,
};

use triage_server::api::{create_router, WsBroadcaster};
use triage_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the activity event channel
const ACTIVITY_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let json = std::env::var("TRIAGE_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> Result<()> {
    init_logging();

    let config_path = std::env::var("TRIAGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Auth method: {:?}", config.auth.method);
    info!("Database path: {:?}", config.database.path);

    // Fingerprint of the effective config for the activity log
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    let authenticator: Arc<dyn Authenticator> = Arc::from(
        create_authenticator(&config.auth).context("Failed to create authenticator")?,
    );
    info!("Using authenticator: {}", authenticator.method_name());

    let activity_store: Arc<dyn ActivityStore> = Arc::new(
        SqliteActivityStore::new(&config.database.path)
            .context("Failed to create activity store")?,
    );
    let settings_store = Arc::new(
        SqliteSettingsStore::new(&config.database.path)
            .context("Failed to open settings store")?,
    );
    info!("Stores initialized");

    let ticketing: Arc<dyn TicketingApi> = Arc::new(
        EvApiClient::new(&config.ticketing).context("Failed to create ticketing client")?,
    );
    let mailbox = Arc::new(WebhookMailbox::new(config.automation.event_buffer));

    // Live activity goes to WebSocket clients as it is persisted
    let ws_broadcaster = WsBroadcaster::default();
    let (log, activity_writer) =
        create_activity_system(Arc::clone(&activity_store), ACTIVITY_BUFFER_SIZE);
    let broadcaster = ws_broadcaster.clone();
    let activity_writer =
        activity_writer.with_listener(Arc::new(move |record: &ActivityRecord| broadcaster.activity(record)));
    let writer_handle = tokio::spawn(activity_writer.run());

    log.notify_info(format!(
        "triaged {} started (config {})",
        VERSION, config_hash_short
    ));

    let engine = LifecycleStateMachine::new(EngineDeps {
        settings: SettingsAggregator::new(settings_store),
        mailbox: mailbox.clone(),
        ticketing,
        log: log.clone(),
        automation: config.automation.clone(),
    });
    let status_forwarder = ws_broadcaster.spawn_status_forwarder(engine.subscribe());

    let state = Arc::new(AppState::new(
        config.clone(),
        authenticator,
        engine.clone(),
        activity_store,
        mailbox,
        ws_broadcaster,
    ));

    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if let Err(e) = engine.request_force_stop().await {
        warn!("Force stop on shutdown failed: {}", e);
    }
    log.notify_info("triaged shutting down");

    // The writer drains once every dispatcher clone is gone; engine clones
    // may live on in finishing chains, so bound the wait.
    drop(engine);
    drop(log);
    status_forwarder.abort();
    if tokio::time::timeout(std::time::Duration::from_secs(5), writer_handle)
        .await
        .is_err()
    {
        warn!("Activity writer did not drain in time");
    } else {
        info!("Activity writer stopped");
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
