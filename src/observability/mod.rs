//! Logs and metrics.
//!
//! Log lines of one request share its `x-request-id`. Metric macros are
//! no-ops until `metrics::init_metrics` installs the Prometheus recorder.

pub mod logging;
pub mod metrics;
