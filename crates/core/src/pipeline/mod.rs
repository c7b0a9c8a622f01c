//! Ordered remote transitions for a classified issue.

mod executor;

pub use executor::*;
