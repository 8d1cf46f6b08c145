#![no_main]

use libfuzzer_sys::fuzz_target;
use netsentry_capture::neighbor::parse_neighbor_table;
use netsentry_capture::route::parse_default_gateway;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Both readers parse kernel-controlled /proc text; a malformed or
        // adversarial row must produce an error, never a panic.
        let _ = parse_neighbor_table(text);
        let _ = parse_default_gateway(text);
    }
});
