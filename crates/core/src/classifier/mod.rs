//! Rule-based classification of incoming issues.

mod processor;
mod rules;

pub use processor::*;
pub use rules::*;
