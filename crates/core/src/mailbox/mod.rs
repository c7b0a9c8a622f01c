//! Mailbox subscription: the collaborator contract, the per-session
//! listener, and the webhook-fed adapter.

mod listener;
mod types;
mod webhook;

pub use listener::*;
pub use types::*;
pub use webhook::*;
