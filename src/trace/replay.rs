//! Trace replay and verification.
//!
//! Each ENTRY/EXIT pair in a trace is redispatched through a
//! [`DriverRegistry`] and the actual result is compared with the recorded
//! one. Lookup, dispatch and result-parse failures abort the replay.
//! Verification mismatches and malformed pairs are logged and the replay
//! carries on, so a single run surfaces every mismatch in the trace.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use super::record::TraceRecord;
use super::store::{TracePair, TraceError, TraceReader};
use crate::drivers::{CallOutput, DriverRegistry, FunctionMessage, ServiceInstanceKey};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error(transparent)]
    Store(#[from] TraceError),

    #[error("No driver for {key} (pair {pair})")]
    Unresolved { key: ServiceInstanceKey, pair: usize },

    #[error("Call {function} on {key} returned {output:?} (pair {pair})")]
    Invocation {
        key: ServiceInstanceKey,
        function: String,
        output: String,
        pair: usize,
    },

    #[error("Unparseable result for {function} (pair {pair}): {source}")]
    ResultParse {
        function: String,
        pair: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One verification failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    pub pair: usize,
    pub service: ServiceInstanceKey,
    pub function: String,
    pub expected: FunctionMessage,
    pub actual: FunctionMessage,
}

/// Outcome of a replay that ran to the end of the trace.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayReport {
    pub pairs_replayed: usize,
    pub pairs_skipped: usize,
    pub default_fallbacks: usize,
    pub mismatches: Vec<Mismatch>,
}

impl ReplayReport {
    /// True when every replayed pair verified.
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Replays traces against a registry of loaded drivers.
pub struct ReplayEngine<'r, R: ?Sized> {
    registry: &'r mut R,
    service_names: HashMap<String, String>,
}

impl<'r, R: DriverRegistry + ?Sized> ReplayEngine<'r, R> {
    pub fn new(registry: &'r mut R) -> Self {
        Self {
            registry,
            service_names: HashMap::new(),
        }
    }

    /// Map fully-qualified interface names to service instance names.
    /// Interfaces missing from the map use `"default"`.
    pub fn with_service_names(mut self, service_names: HashMap<String, String>) -> Self {
        self.service_names = service_names;
        self
    }

    pub fn replay_file(&mut self, path: &Path) -> Result<ReplayReport, ReplayError> {
        let _span = info_span!("replay", trace = %path.display()).entered();
        let reader = TraceReader::open(path)?;
        self.replay(reader)
    }

    pub fn replay<T: Read>(&mut self, mut reader: TraceReader<T>) -> Result<ReplayReport, ReplayError> {
        let mut report = ReplayReport::default();
        let mut pair_index = 0usize;

        while let Some(pair) = reader.next_pair()? {
            let (call, expected) = match pair {
                TracePair::Complete { call, result } => (call, result),
                TracePair::Dangling(record) => {
                    warn!(pair = pair_index, event = %record.event, "trace ends with an unpaired record");
                    break;
                }
            };

            if !is_matched_pair(&call, &expected) {
                warn!(
                    pair = pair_index,
                    call_event = %call.event,
                    result_event = %expected.event,
                    "skipping malformed record pair"
                );
                report.pairs_skipped += 1;
                pair_index += 1;
                continue;
            }

            self.replay_pair(pair_index, &call, &expected, &mut report)?;
            report.pairs_replayed += 1;
            pair_index += 1;
        }

        info!(
            replayed = report.pairs_replayed,
            skipped = report.pairs_skipped,
            mismatches = report.mismatches.len(),
            "replay finished"
        );
        Ok(report)
    }

    fn replay_pair(
        &mut self,
        pair: usize,
        call: &TraceRecord,
        expected: &TraceRecord,
        report: &mut ReplayReport,
    ) -> Result<(), ReplayError> {
        let key = self.service_key(call, report);
        let Some(driver_id) = self.registry.resolve(&key) else {
            return Err(ReplayError::Unresolved { key, pair });
        };

        let function = call.func_msg.name.clone();
        debug!(pair, service = %key, %function, %driver_id, "replaying call");

        let output = self.registry.invoke(driver_id, &call.func_msg);
        let parsed = match CallOutput::classify(&output) {
            CallOutput::Text(text) => Some(FunctionMessage::from_text(text)),
            CallOutput::Void | CallOutput::Error => None,
        };
        let Some(parsed) = parsed else {
            return Err(ReplayError::Invocation { key, function, output, pair });
        };
        let actual = parsed.map_err(|source| ReplayError::ResultParse {
            function: function.clone(),
            pair,
            source,
        })?;

        if !self.registry.verify(driver_id, &expected.func_msg, &actual) {
            warn!(
                pair,
                service = %key,
                %function,
                expected = %expected.func_msg.to_text(),
                actual = %actual.to_text(),
                "result verification failed"
            );
            report.mismatches.push(Mismatch {
                pair,
                service: key,
                function,
                expected: expected.func_msg.clone(),
                actual,
            });
        }
        Ok(())
    }

    fn service_key(&self, record: &TraceRecord, report: &mut ReplayReport) -> ServiceInstanceKey {
        let fq_name = record.fq_name();
        let instance = match self.service_names.get(&fq_name) {
            Some(name) => name.clone(),
            None => {
                info!(interface = %fq_name, "no service name mapped, using default instance");
                report.default_fallbacks += 1;
                ServiceInstanceKey::DEFAULT_INSTANCE.to_string()
            }
        };
        ServiceInstanceKey::new(
            record.package.clone(),
            record.version_string(),
            record.interface.clone(),
            instance,
        )
    }
}

fn is_matched_pair(call: &TraceRecord, result: &TraceRecord) -> bool {
    call.event.matching_exit() == Some(result.event)
}
