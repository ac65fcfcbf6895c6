//! Tracing and logging setup shared by services and test harnesses.

pub mod tracing;

pub use self::tracing::{init as init_with_default_filter, init_for_tests};
