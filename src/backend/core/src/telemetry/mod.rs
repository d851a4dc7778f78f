//! Telemetry: structured logging for the decision engine.
//!
//! Decisions and store failures are emitted as `tracing` events; the
//! `authz_decisions_total` and `authz_errors_total` counters go through the
//! `metrics` facade and are exported by whichever recorder the host installs.

pub mod logging;

pub use logging::{init_logging, LogFormat, LoggingConfig, SpanEventConfig};
