//! Enumerate the services a trace exercises, without dispatching anything.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use super::store::{TraceError, TraceReader};

/// Sorted, deduplicated `package@version::interface` names referenced by the trace at `path`.
pub fn list_test_services(path: &Path) -> Result<BTreeSet<String>, TraceError> {
    collect_services(TraceReader::open(path)?)
}

pub fn collect_services<R: Read>(reader: TraceReader<R>) -> Result<BTreeSet<String>, TraceError> {
    let mut services = BTreeSet::new();
    for record in reader {
        services.insert(record?.fq_name());
    }
    Ok(services)
}
