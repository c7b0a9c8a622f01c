//! Prometheus metrics for the automation engine.
//!
//! Covers:
//! - Mailbox listener (forwarded/dropped events, reconnects)
//! - Classification outcomes
//! - Update pipeline steps and chain duration
//! - Ticketing API requests and retries
//! - Service lifecycle transitions

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Mailbox
// =============================================================================

/// Mailbox notifications by outcome.
pub static MAILBOX_EVENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_mailbox_events_total", "Mailbox notifications seen"),
        &["outcome"], // "forwarded", "filtered", "bind_failed", "queue_closed"
    )
    .unwrap()
});

/// Reconnect attempts after an unexpected disconnect, by result.
pub static MAILBOX_RECONNECTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_mailbox_reconnects_total",
            "Mailbox reconnect attempts",
        ),
        &["result"], // "success", "failure", "exhausted"
    )
    .unwrap()
});

// =============================================================================
// Classification
// =============================================================================

pub static CLASSIFICATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_classifications_total",
            "Classification attempts by outcome",
        ),
        &["outcome"], // "matched", "miss", "no_issue_id", "duplicate", "fetch_failed"
    )
    .unwrap()
});

// =============================================================================
// Update pipeline
// =============================================================================

pub static PIPELINE_STEPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_pipeline_steps_total", "Pipeline steps executed"),
        &["result"], // "updated", "rejected", "failed"
    )
    .unwrap()
});

/// Duration of one classify-and-update chain.
pub static CHAIN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "triage_chain_duration_seconds",
            "Duration of a classify-and-update chain",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["result"], // "completed", "miss", "failed", "timed_out"
    )
    .unwrap()
});

/// Chains that finished every pipeline step.
pub static ISSUES_UPDATED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_issues_updated_total",
        "Issues driven through their full pipeline",
    )
    .unwrap()
});

// =============================================================================
// Ticketing API
// =============================================================================

pub static TICKETING_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_ticketing_requests_total",
            "Requests sent to the ticketing API",
        ),
        &["operation", "result"], // "get"/"update", "ok"/"http_error"/"transport_error"
    )
    .unwrap()
});

pub static TICKETING_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_ticketing_retries_total",
            "Retries of ticketing API calls after transient failures",
        ),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Service lifecycle
// =============================================================================

pub static SERVICE_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_service_transitions_total",
            "Service lifecycle transitions",
        ),
        &["to"], // "pending", "started", "stopped"
    )
    .unwrap()
});

/// Failed start attempts by reason.
pub static START_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_start_failures_total", "Failed start attempts"),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Mailbox
        Box::new(MAILBOX_EVENTS.clone()),
        Box::new(MAILBOX_RECONNECTS.clone()),
        // Classification
        Box::new(CLASSIFICATIONS.clone()),
        // Pipeline
        Box::new(PIPELINE_STEPS.clone()),
        Box::new(CHAIN_DURATION.clone()),
        Box::new(ISSUES_UPDATED.clone()),
        // Ticketing
        Box::new(TICKETING_REQUESTS.clone()),
        Box::new(TICKETING_RETRIES.clone()),
        // Lifecycle
        Box::new(SERVICE_TRANSITIONS.clone()),
        Box::new(START_FAILURES.clone()),
    ]
}
