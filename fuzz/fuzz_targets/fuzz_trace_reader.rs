//! Fuzz target for trace file decoding.
//!
//! The reader must stop on the first error and never loop on bad input.

#![no_main]

use std::io::Cursor;

use hal_test_agent::trace::TraceReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut records = 0usize;
    for record in TraceReader::new(Cursor::new(data)) {
        if record.is_err() {
            break;
        }
        records += 1;
        assert!(records <= data.len());
    }
});
