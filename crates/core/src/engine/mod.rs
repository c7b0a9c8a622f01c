//! The automation engine: lifecycle state machine, per-session worker and
//! the control-surface types.

mod control;
mod machine;
mod state;
mod worker;

pub use control::*;
pub use machine::*;
pub use state::*;
pub use worker::*;
