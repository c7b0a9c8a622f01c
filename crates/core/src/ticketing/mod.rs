//! Ticketing system client: the `ev_api.action` HTTP API, its XML issue
//! bodies, and the retry policy for transient failures.

mod client;
pub mod retry;
mod types;
mod xml;

pub use client::*;
pub use retry::{RetryDecision, RetryPolicy, RetryableError};
pub use types::*;
pub use xml::parse_issue;
