#![no_main]

use libfuzzer_sys::fuzz_target;
use netsentry_capture::classify::classify_frame;

fuzz_target!(|data: &[u8]| {
    // Must never panic regardless of how malformed or truncated the frame is.
    let _ = classify_frame(data, std::time::SystemTime::now());
});
