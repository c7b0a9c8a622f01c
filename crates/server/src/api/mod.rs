pub mod activity;
pub mod handlers;
pub mod mailbox;
pub mod middleware;
pub mod routes;
pub mod service;
pub mod ws;

pub use routes::create_router;
pub use ws::{WsBroadcaster, WsMessage};
