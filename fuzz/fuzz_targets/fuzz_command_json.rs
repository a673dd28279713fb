//! Fuzz target for agent command decoding.

#![no_main]

use hal_test_agent::ipc::{decode_command, encode_command};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must encode again.
    if let Ok(command) = decode_command(data) {
        let _ = encode_command(&command).expect("decoded command failed to encode");
    }
});
