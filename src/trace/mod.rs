//! Recorded call traces: storage, replay verification, and maintenance.

mod cleanup;
mod record;
mod replay;
mod services;
mod store;

pub use cleanup::{cleanup_records, cleanup_trace, CleanupReport};
pub use record::{CallSide, TraceEvent, TraceRecord};
pub use replay::{Mismatch, ReplayEngine, ReplayError, ReplayReport};
pub use services::{collect_services, list_test_services};
pub use store::{read_trace, rewrite_trace, write_trace, TraceError, TracePair, TraceReader, TraceWriter};
