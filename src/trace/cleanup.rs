//! In-place trace cleanup.
//!
//! A call between two processes that are both instrumented is recorded twice:
//! once on the client side and once on the server (or passthrough) side. For
//! every interface with server-side records the client-side copies are
//! dropped. Records left without their ENTRY/EXIT partner are dropped too.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use super::record::{CallSide, TraceRecord};
use super::store::{read_trace, rewrite_trace, TraceError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub kept: usize,
    pub removed_client_duplicates: usize,
    pub removed_unpaired: usize,
}

impl CleanupReport {
    pub fn removed(&self) -> usize {
        self.removed_client_duplicates + self.removed_unpaired
    }
}

/// Clean the trace at `path`, rewriting it only when something was removed.
pub fn cleanup_trace(path: &Path) -> Result<CleanupReport, TraceError> {
    let records = read_trace(path)?;
    let (kept, report) = cleanup_records(records);
    if report.removed() > 0 {
        rewrite_trace(path, &kept)?;
    }
    info!(
        trace = %path.display(),
        kept = report.kept,
        removed = report.removed(),
        "trace cleaned"
    );
    Ok(report)
}

pub fn cleanup_records(records: Vec<TraceRecord>) -> (Vec<TraceRecord>, CleanupReport) {
    let mut report = CleanupReport::default();

    let served: HashSet<String> = records
        .iter()
        .filter(|r| matches!(r.event.side(), CallSide::Server | CallSide::Passthrough))
        .map(TraceRecord::fq_name)
        .collect();

    let deduped: Vec<TraceRecord> = records
        .into_iter()
        .filter(|r| {
            let duplicate = r.event.side() == CallSide::Client && served.contains(&r.fq_name());
            if duplicate {
                report.removed_client_duplicates += 1;
            }
            !duplicate
        })
        .collect();

    let mut kept = Vec::with_capacity(deduped.len());
    let mut iter = deduped.into_iter().peekable();
    while let Some(record) = iter.next() {
        let closes = iter.peek().is_some_and(|next| closes_pair(&record, next));
        if closes {
            kept.push(record);
            if let Some(next) = iter.next() {
                kept.push(next);
            }
        } else {
            debug!(event = %record.event, function = %record.func_msg.name, "dropping unpaired record");
            report.removed_unpaired += 1;
        }
    }

    report.kept = kept.len();
    (kept, report)
}

fn closes_pair(entry: &TraceRecord, exit: &TraceRecord) -> bool {
    entry.event.matching_exit() == Some(exit.event)
        && entry.fq_name() == exit.fq_name()
        && entry.func_msg.name == exit.func_msg.name
}
