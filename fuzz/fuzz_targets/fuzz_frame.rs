//! Fuzz target for frame header and payload parsing.
//!
//! Arbitrary byte streams must only ever yield frames or errors. Run with
//! `-malloc_limit_mb` raised: a valid header may announce a very large payload.

#![no_main]

use std::io::Cursor;

use hal_test_agent::ipc::recv_frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut cursor = Cursor::new(data);
    while let Ok(frame) = recv_frame(&mut cursor) {
        assert!(frame.len() <= data.len());
    }
});
