#![no_main]

use csync_runtime::burst::{SEPARATOR, escape, split_payload, unescape};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Arbitrary input must never panic the unescaper.
    let _ = unescape(data);
    let _ = split_payload(data);

    let wire = escape(data);
    assert!(!wire.contains(SEPARATOR));
    assert_eq!(unescape(&wire).ok().as_deref(), Some(data));
});
