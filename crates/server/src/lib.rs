//! HTTP control surface of the triage engine.

pub mod api;
pub mod metrics;
pub mod state;
