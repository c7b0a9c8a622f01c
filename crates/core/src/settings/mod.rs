//! Per-operator settings: persistent store, aggregation into an immutable
//! session snapshot, and integrity checks run before a session starts.

mod aggregator;
mod snapshot;
mod sqlite;
mod store;
mod types;

pub use aggregator::*;
pub use snapshot::*;
pub use sqlite::*;
pub use store::*;
pub use types::*;
