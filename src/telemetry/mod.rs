//! Telemetry: structured logging and per-session call measurement.

mod logging;
mod measurement;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use measurement::{CallSummary, MeasurementContext, MeasurementSnapshot};
