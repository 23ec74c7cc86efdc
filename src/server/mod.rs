// The Greet service
pub mod greet;

// Call metrics and logging setup
pub mod metrics;

pub use metrics::{CallTimer, Metrics, MetricsSnapshot, UNKNOWN_METHOD, init_logging};
