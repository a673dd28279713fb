//! Integration tests for trace files: storage, service listing, and cleanup.

use std::fs;
use std::path::Path;

use serde_json::json;

use hal_test_agent::drivers::FunctionMessage;
use hal_test_agent::ipc::encode_frame;
use hal_test_agent::trace::{
    cleanup_trace, list_test_services, read_trace, rewrite_trace, write_trace, TraceError,
    TraceEvent, TracePair, TraceReader, TraceRecord,
};

fn rec(event: TraceEvent, package: &str, version: f32, iface: &str, name: &str) -> TraceRecord {
    TraceRecord::new(event, package, version, iface, FunctionMessage::call(name, vec![json!(1)]))
}

fn light(event: TraceEvent, name: &str) -> TraceRecord {
    rec(event, "android.hardware.light", 2.0, "ILight", name)
}

fn events(path: &Path) -> Vec<TraceEvent> {
    read_trace(path).unwrap().into_iter().map(|r| r.event).collect()
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[test]
fn test_write_then_read_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("light.trace");
    let records = vec![
        light(TraceEvent::ServerApiEntry, "setLight"),
        light(TraceEvent::ServerApiExit, "setLight"),
    ];

    write_trace(&path, &records).unwrap();
    assert_eq!(read_trace(&path).unwrap(), records);
}

#[test]
fn test_records_are_framed_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("light.trace");
    let record = light(TraceEvent::PassthroughEntry, "getSupportedTypes");
    write_trace(&path, std::slice::from_ref(&record)).unwrap();

    let bytes = fs::read(&path).unwrap();
    let json = serde_json::to_vec(&record).unwrap();
    assert_eq!(bytes, encode_frame(&json));

    let text = String::from_utf8(json).unwrap();
    assert!(text.contains("\"PASSTHROUGH_ENTRY\""));
}

#[test]
fn test_reader_pairs_and_dangling_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("light.trace");
    write_trace(
        &path,
        &[
            light(TraceEvent::ServerApiEntry, "a"),
            light(TraceEvent::ServerApiExit, "a"),
            light(TraceEvent::ServerApiEntry, "b"),
        ],
    )
    .unwrap();

    let mut reader = TraceReader::open(&path).unwrap();
    assert!(matches!(reader.next_pair().unwrap(), Some(TracePair::Complete { .. })));
    match reader.next_pair().unwrap() {
        Some(TracePair::Dangling(record)) => assert_eq!(record.func_msg.name, "b"),
        other => panic!("unexpected: {:?}", other),
    }
    assert!(reader.next_pair().unwrap().is_none());
    assert_eq!(reader.records_read(), 3);
}

#[test]
fn test_truncated_file_reports_record_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("light.trace");
    write_trace(&path, &[light(TraceEvent::ServerApiEntry, "a")]).unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(b"400\n{\"event\":");
    fs::write(&path, bytes).unwrap();

    let err = read_trace(&path).unwrap_err();
    assert!(matches!(err, TraceError::Frame { records: 1, .. }));
}

#[test]
fn test_rewrite_replaces_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("light.trace");
    write_trace(
        &path,
        &[
            light(TraceEvent::ServerApiEntry, "a"),
            light(TraceEvent::ServerApiExit, "a"),
        ],
    )
    .unwrap();

    let replacement = vec![light(TraceEvent::ClientApiEntry, "z")];
    rewrite_trace(&path, &replacement).unwrap();

    assert_eq!(read_trace(&path).unwrap(), replacement);
    // Only the trace itself remains; the temp file was renamed over it.
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

// ---------------------------------------------------------------------------
// Service listing
// ---------------------------------------------------------------------------

#[test]
fn test_list_test_services_sorted_and_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.trace");
    write_trace(
        &path,
        &[
            rec(TraceEvent::ServerApiEntry, "android.hardware.vibrator", 1.0, "IVibrator", "on"),
            rec(TraceEvent::ServerApiExit, "android.hardware.vibrator", 1.0, "IVibrator", "on"),
            light(TraceEvent::ServerApiEntry, "setLight"),
            light(TraceEvent::ServerApiExit, "setLight"),
            rec(TraceEvent::ServerApiEntry, "android.hardware.vibrator", 1.1, "IVibrator", "perform"),
        ],
    )
    .unwrap();

    let services: Vec<String> = list_test_services(&path).unwrap().into_iter().collect();
    assert_eq!(
        services,
        vec![
            "android.hardware.light@2.0::ILight".to_string(),
            "android.hardware.vibrator@1.0::IVibrator".to_string(),
            "android.hardware.vibrator@1.1::IVibrator".to_string(),
        ]
    );
}

#[test]
fn test_list_test_services_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = list_test_services(&dir.path().join("absent.trace")).unwrap_err();
    assert!(matches!(err, TraceError::Open { .. }));
}

// ---------------------------------------------------------------------------
// Cleanup
// ---------------------------------------------------------------------------

#[test]
fn test_cleanup_rewrites_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("light.trace");
    write_trace(
        &path,
        &[
            light(TraceEvent::ClientApiEntry, "setLight"),
            light(TraceEvent::ServerApiEntry, "setLight"),
            light(TraceEvent::ServerApiExit, "setLight"),
            light(TraceEvent::ClientApiExit, "setLight"),
            light(TraceEvent::ServerApiEntry, "getSupportedTypes"),
        ],
    )
    .unwrap();

    let report = cleanup_trace(&path).unwrap();
    assert_eq!(report.removed_client_duplicates, 2);
    assert_eq!(report.removed_unpaired, 1);
    assert_eq!(report.kept, 2);
    assert_eq!(
        events(&path),
        vec![TraceEvent::ServerApiEntry, TraceEvent::ServerApiExit]
    );
}

#[test]
fn test_cleanup_of_clean_trace_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("light.trace");
    write_trace(
        &path,
        &[
            light(TraceEvent::ClientApiEntry, "setLight"),
            light(TraceEvent::ClientApiExit, "setLight"),
        ],
    )
    .unwrap();
    let before = fs::read(&path).unwrap();

    let report = cleanup_trace(&path).unwrap();
    assert_eq!(report.removed(), 0);
    assert_eq!(report.kept, 2);
    assert_eq!(fs::read(&path).unwrap(), before);
}
