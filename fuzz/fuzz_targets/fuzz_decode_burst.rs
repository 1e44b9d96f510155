#![no_main]

use csync_codec::JsonCodec;
use csync_core::ConnectorTracker;
use csync_harness::fixtures;
use csync_runtime::decode::InvocationDecoder;
use csync_runtime::dispatch::dispatch_burst;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let mut tracker = ConnectorTracker::new();
    let Ok(window) = tracker.set_root(fixtures::window("fuzz")) else {
        return;
    };
    for connector in [fixtures::text_field(), fixtures::button(), fixtures::panel()] {
        let _ = tracker.attach(&window, connector);
    }
    let codec = JsonCodec::default();
    let errors = fixtures::RecordingErrorHandler::new();

    let Ok(decoded) = InvocationDecoder::new(&codec, &tracker).decode_burst(data) else {
        return;
    };
    let outcome = dispatch_burst(&mut tracker, decoded, &*errors);
    assert!(!outcome.inconsistent || outcome.rejected > 0);
});
