//! Integration tests for trace replay and verification.
//!
//! Traces are built in memory and replayed against a stub registry that
//! logs every resolve, invoke and verify in order, so tests can assert both
//! the report and exactly which calls reached the drivers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;

use serde_json::{json, Value};

use hal_test_agent::drivers::{
    DriverId, DriverRegistry, FunctionCallMessage, FunctionMessage, FunctionResultMessage,
    ServiceInstanceKey, ERROR_RESULT, VOID_RESULT,
};
use hal_test_agent::trace::{
    write_trace, ReplayEngine, ReplayError, TraceError, TraceEvent, TraceReader, TraceRecord,
    TraceWriter,
};

// ---------------------------------------------------------------------------
// Stub registry
// ---------------------------------------------------------------------------

const PACKAGE: &str = "vendor.test.calc";
const INTERFACE: &str = "ICalc";
const FQ_NAME: &str = "vendor.test.calc@1.0::ICalc";

type Responder = Box<dyn FnMut(&FunctionCallMessage) -> String>;

/// One registry operation, as seen by the stub.
#[derive(Debug, Clone, PartialEq)]
enum Call {
    Resolve(ServiceInstanceKey),
    Invoke {
        id: DriverId,
        function: String,
        args: Vec<Value>,
    },
    Verify {
        expected: Vec<Value>,
        actual: Vec<Value>,
        matched: bool,
    },
}

struct StubRegistry {
    drivers: HashMap<ServiceInstanceKey, DriverId>,
    responder: Responder,
    calls: RefCell<Vec<Call>>,
}

impl StubRegistry {
    /// A registry serving `instance` of the calc interface with `responder`.
    fn serving(instance: &str, responder: impl FnMut(&FunctionCallMessage) -> String + 'static) -> Self {
        let mut drivers = HashMap::new();
        drivers.insert(calc_key(instance), DriverId(7));
        Self {
            drivers,
            responder: Box::new(responder),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Sums integer arguments, like a real `add`.
    fn adder() -> Self {
        Self::serving("default", |call| {
            let sum: i64 = call.args.iter().filter_map(Value::as_i64).sum();
            FunctionMessage::result(call.name.clone(), vec![json!(sum)]).to_text()
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Arguments of every dispatched call, in order.
    fn invoked_args(&self) -> Vec<Vec<Value>> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Invoke { args, .. } => Some(args.clone()),
                _ => None,
            })
            .collect()
    }
}

impl DriverRegistry for StubRegistry {
    fn resolve(&self, key: &ServiceInstanceKey) -> Option<DriverId> {
        self.calls.borrow_mut().push(Call::Resolve(key.clone()));
        self.drivers.get(key).copied()
    }

    fn invoke(&mut self, id: DriverId, call: &FunctionCallMessage) -> String {
        self.calls.borrow_mut().push(Call::Invoke {
            id,
            function: call.name.clone(),
            args: call.args.clone(),
        });
        (self.responder)(call)
    }

    fn verify(
        &self,
        _id: DriverId,
        expected: &FunctionResultMessage,
        actual: &FunctionResultMessage,
    ) -> bool {
        let matched = expected.name == actual.name && expected.return_values == actual.return_values;
        self.calls.borrow_mut().push(Call::Verify {
            expected: expected.return_values.clone(),
            actual: actual.return_values.clone(),
            matched,
        });
        matched
    }
}

fn calc_key(instance: &str) -> ServiceInstanceKey {
    ServiceInstanceKey::new(PACKAGE, "1.0", INTERFACE, instance)
}

// ---------------------------------------------------------------------------
// Trace helpers
// ---------------------------------------------------------------------------

fn entry(name: &str, args: Vec<Value>) -> TraceRecord {
    TraceRecord::new(
        TraceEvent::ServerApiEntry,
        PACKAGE,
        1.0,
        INTERFACE,
        FunctionMessage::call(name, args),
    )
}

fn exit(name: &str, returns: Vec<Value>) -> TraceRecord {
    TraceRecord::new(
        TraceEvent::ServerApiExit,
        PACKAGE,
        1.0,
        INTERFACE,
        FunctionMessage::result(name, returns),
    )
}

fn trace_of(records: &[TraceRecord]) -> Vec<u8> {
    let mut writer = TraceWriter::new(Vec::new());
    for record in records {
        writer.append(record).unwrap();
    }
    writer.finish().unwrap()
}

fn reader(bytes: &[u8]) -> TraceReader<Cursor<Vec<u8>>> {
    TraceReader::new(Cursor::new(bytes.to_vec()))
}

fn add_trace() -> Vec<u8> {
    trace_of(&[entry("f", vec![json!(1), json!(2)]), exit("f", vec![json!(3)])])
}

// ---------------------------------------------------------------------------
// Successful replays
// ---------------------------------------------------------------------------

#[test]
fn test_end_to_end_single_call() {
    let mut registry = StubRegistry::adder();
    let report = ReplayEngine::new(&mut registry).replay(reader(&add_trace())).unwrap();

    assert_eq!(report.pairs_replayed, 1);
    assert_eq!(report.pairs_skipped, 0);
    assert!(report.is_clean());
    assert_eq!(
        registry.calls(),
        vec![
            Call::Resolve(calc_key("default")),
            Call::Invoke {
                id: DriverId(7),
                function: "f".to_string(),
                args: vec![json!(1), json!(2)],
            },
            Call::Verify {
                expected: vec![json!(3)],
                actual: vec![json!(3)],
                matched: true,
            },
        ]
    );
}

#[test]
fn test_empty_trace_replays_nothing() {
    let mut registry = StubRegistry::adder();
    let report = ReplayEngine::new(&mut registry).replay(reader(&[])).unwrap();

    assert_eq!(report.pairs_replayed, 0);
    assert!(registry.calls().is_empty());
}

#[test]
fn test_replay_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("calc.trace");
    write_trace(
        &path,
        &[
            entry("f", vec![json!(1), json!(2)]),
            exit("f", vec![json!(3)]),
            entry("g", vec![json!(10), json!(-4)]),
            exit("g", vec![json!(6)]),
        ],
    )
    .unwrap();

    let mut registry = StubRegistry::adder();
    let report = ReplayEngine::new(&mut registry).replay_file(&path).unwrap();
    assert_eq!(report.pairs_replayed, 2);
    assert!(report.is_clean());
}

#[test]
fn test_replay_is_deterministic() {
    let trace = trace_of(&[
        entry("f", vec![json!(1), json!(2)]),
        exit("f", vec![json!(3)]),
        entry("f", vec![json!(5)]),
        exit("f", vec![json!(99)]),
        entry("f", vec![]),
        exit("f", vec![json!(0)]),
    ]);

    let mut first = StubRegistry::adder();
    let mut second = StubRegistry::adder();
    let report_a = ReplayEngine::new(&mut first).replay(reader(&trace)).unwrap();
    let report_b = ReplayEngine::new(&mut second).replay(reader(&trace)).unwrap();

    assert_eq!(report_a, report_b);
    assert_eq!(first.calls(), second.calls());
    assert_eq!(report_a.mismatches.len(), 1);

    // Resolve, invoke and verify once per pair, in trace order.
    let calls = first.calls();
    assert_eq!(calls.len(), 9);
    for pair in calls.chunks(3) {
        assert!(matches!(pair[0], Call::Resolve(_)));
        assert!(matches!(pair[1], Call::Invoke { .. }));
        assert!(matches!(pair[2], Call::Verify { .. }));
    }
    assert_eq!(
        calls[5],
        Call::Verify {
            expected: vec![json!(99)],
            actual: vec![json!(5)],
            matched: false,
        }
    );
}

// ---------------------------------------------------------------------------
// Service instance selection
// ---------------------------------------------------------------------------

#[test]
fn test_missing_mapping_falls_back_to_default() {
    let mut registry = StubRegistry::adder();
    let report = ReplayEngine::new(&mut registry).replay(reader(&add_trace())).unwrap();

    assert_eq!(report.default_fallbacks, 1);
    assert_eq!(registry.calls()[0], Call::Resolve(calc_key("default")));
    assert_eq!(registry.invoked_args().len(), 1);
}

#[test]
fn test_mapped_service_instance_is_used() {
    let mut registry = StubRegistry::serving("primary", |call| {
        FunctionMessage::result(call.name.clone(), vec![json!(3)]).to_text()
    });
    let names = HashMap::from([(FQ_NAME.to_string(), "primary".to_string())]);

    let report = ReplayEngine::new(&mut registry)
        .with_service_names(names)
        .replay(reader(&add_trace()))
        .unwrap();

    assert_eq!(report.default_fallbacks, 0);
    assert_eq!(report.pairs_replayed, 1);
    assert_eq!(registry.calls()[0], Call::Resolve(calc_key("primary")));
}

#[test]
fn test_unresolved_service_stops_before_dispatch() {
    let mut registry = StubRegistry::adder();
    let names = HashMap::from([(FQ_NAME.to_string(), "secondary".to_string())]);

    let err = ReplayEngine::new(&mut registry)
        .with_service_names(names)
        .replay(reader(&add_trace()))
        .unwrap_err();

    match err {
        ReplayError::Unresolved { key, pair } => {
            assert_eq!(key.instance, "secondary");
            assert_eq!(pair, 0);
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(registry.calls(), vec![Call::Resolve(calc_key("secondary"))]);
}

#[test]
fn test_unresolved_later_pair_stops_dispatch() {
    let other = |event: TraceEvent, message: FunctionMessage| {
        TraceRecord::new(event, "vendor.test.other", 1.0, "IOther", message)
    };
    let trace = trace_of(&[
        entry("f", vec![json!(1), json!(2)]),
        exit("f", vec![json!(3)]),
        other(TraceEvent::ServerApiEntry, FunctionMessage::call("g", vec![json!(1)])),
        other(TraceEvent::ServerApiExit, FunctionMessage::result("g", vec![json!(1)])),
        entry("f", vec![json!(4)]),
        exit("f", vec![json!(4)]),
    ]);

    let mut registry = StubRegistry::adder();
    let err = ReplayEngine::new(&mut registry).replay(reader(&trace)).unwrap_err();

    match err {
        ReplayError::Unresolved { key, pair } => {
            assert_eq!(key.interface, "IOther");
            assert_eq!(pair, 1);
        }
        other => panic!("unexpected: {:?}", other),
    }

    // Pair 0 went through in full; nothing followed the failed lookup.
    let calls = registry.calls();
    assert_eq!(calls.len(), 4);
    assert!(matches!(calls[1], Call::Invoke { ref function, .. } if function == "f"));
    assert!(matches!(calls[2], Call::Verify { matched: true, .. }));
    assert_eq!(
        calls[3],
        Call::Resolve(ServiceInstanceKey::new("vendor.test.other", "1.0", "IOther", "default"))
    );
    assert_eq!(registry.invoked_args(), vec![vec![json!(1), json!(2)]]);
}

// ---------------------------------------------------------------------------
// Fatal vs advisory outcomes
// ---------------------------------------------------------------------------

#[test]
fn test_verification_mismatch_is_advisory() {
    let mut registry = StubRegistry::serving("default", |call| {
        FunctionMessage::result(call.name.clone(), vec![json!(4)]).to_text()
    });
    let trace = trace_of(&[
        entry("f", vec![json!(1), json!(2)]),
        exit("f", vec![json!(3)]),
        entry("f", vec![json!(2), json!(2)]),
        exit("f", vec![json!(4)]),
    ]);

    let report = ReplayEngine::new(&mut registry).replay(reader(&trace)).unwrap();

    assert_eq!(report.pairs_replayed, 2);
    assert_eq!(report.mismatches.len(), 1);
    let mismatch = &report.mismatches[0];
    assert_eq!(mismatch.pair, 0);
    assert_eq!(mismatch.function, "f");
    assert_eq!(mismatch.expected.return_values, vec![json!(3)]);
    assert_eq!(mismatch.actual.return_values, vec![json!(4)]);
}

#[test]
fn test_void_result_is_fatal() {
    let mut registry = StubRegistry::serving("default", |_| VOID_RESULT.to_string());
    let trace = trace_of(&[
        entry("f", vec![]),
        exit("f", vec![]),
        entry("g", vec![]),
        exit("g", vec![]),
    ]);

    let err = ReplayEngine::new(&mut registry).replay(reader(&trace)).unwrap_err();
    assert!(matches!(err, ReplayError::Invocation { ref output, .. } if output == VOID_RESULT));
    // Nothing after the failing pair was dispatched, and nothing was verified.
    assert_eq!(registry.invoked_args().len(), 1);
    assert!(!registry.calls().iter().any(|c| matches!(c, Call::Verify { .. })));
}

#[test]
fn test_error_result_is_fatal() {
    let mut registry = StubRegistry::serving("default", |_| ERROR_RESULT.to_string());
    let err = ReplayEngine::new(&mut registry).replay(reader(&add_trace())).unwrap_err();

    match err {
        ReplayError::Invocation { function, output, .. } => {
            assert_eq!(function, "f");
            assert_eq!(output, ERROR_RESULT);
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn test_unparseable_result_is_fatal() {
    let mut registry = StubRegistry::serving("default", |_| "not a message".to_string());
    let err = ReplayEngine::new(&mut registry).replay(reader(&add_trace())).unwrap_err();
    assert!(matches!(err, ReplayError::ResultParse { pair: 0, .. }));
}

#[test]
fn test_corrupt_record_is_fatal() {
    let mut bytes = add_trace();
    bytes.extend_from_slice(b"5\n{oops");

    let mut registry = StubRegistry::adder();
    let err = ReplayEngine::new(&mut registry).replay(reader(&bytes)).unwrap_err();
    assert!(matches!(err, ReplayError::Store(_)));
}

#[test]
fn test_missing_trace_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = StubRegistry::adder();
    let err = ReplayEngine::new(&mut registry)
        .replay_file(&dir.path().join("absent.trace"))
        .unwrap_err();
    assert!(matches!(err, ReplayError::Store(TraceError::Open { .. })));
}

// ---------------------------------------------------------------------------
// Malformed pairing
// ---------------------------------------------------------------------------

#[test]
fn test_entry_entry_pair_is_skipped() {
    let trace = trace_of(&[
        entry("f", vec![json!(1)]),
        entry("f", vec![json!(2)]),
        entry("f", vec![json!(3), json!(4)]),
        exit("f", vec![json!(7)]),
    ]);

    let mut registry = StubRegistry::adder();
    let report = ReplayEngine::new(&mut registry).replay(reader(&trace)).unwrap();

    assert_eq!(report.pairs_skipped, 1);
    assert_eq!(report.pairs_replayed, 1);
    assert!(report.is_clean());
    assert_eq!(registry.invoked_args(), vec![vec![json!(3), json!(4)]]);
}

#[test]
fn test_mismatched_exit_kind_is_skipped() {
    let client_exit = TraceRecord::new(
        TraceEvent::ClientApiExit,
        PACKAGE,
        1.0,
        INTERFACE,
        FunctionMessage::result("f", vec![json!(3)]),
    );
    let trace = trace_of(&[entry("f", vec![json!(1), json!(2)]), client_exit]);

    let mut registry = StubRegistry::adder();
    let report = ReplayEngine::new(&mut registry).replay(reader(&trace)).unwrap();

    assert_eq!(report.pairs_skipped, 1);
    assert!(registry.calls().is_empty());
}

#[test]
fn test_trailing_unpaired_record_ends_replay() {
    let trace = trace_of(&[
        entry("f", vec![json!(1), json!(2)]),
        exit("f", vec![json!(3)]),
        entry("f", vec![json!(9)]),
    ]);

    let mut registry = StubRegistry::adder();
    let report = ReplayEngine::new(&mut registry).replay(reader(&trace)).unwrap();

    assert_eq!(report.pairs_replayed, 1);
    assert_eq!(registry.invoked_args().len(), 1);
}
