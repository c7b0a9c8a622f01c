//! Activity log: the one-way sink for engine status and progress messages.
//!
//! Producers hold a [`LogDispatcher`] and never wait on the consumer. An
//! [`ActivityWriter`] task persists every record and forwards it to live
//! listeners (the server streams them over WebSocket).

mod events;
mod handle;
mod sqlite;
mod store;
mod writer;

pub use events::*;
pub use handle::*;
pub use sqlite::*;
pub use store::*;
pub use writer::*;
