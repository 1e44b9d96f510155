#![no_main]

use arbitrary::Arbitrary;
use csync_harness::{Harness, fixtures};
use csync_runtime::burst::join_payload;
use csync_runtime::{DeploymentConfig, UidlRequest};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Request<'a> {
    use_token: bool,
    repaint_all: bool,
    bursts: Vec<&'a str>,
}

fuzz_target!(|input: Request<'_>| {
    let harness = Harness::new(DeploymentConfig::default());
    for connector in [fixtures::text_field(), fixtures::button(), fixtures::upload()] {
        let _ = harness.attach(None, connector);
    }
    let mut client = harness.client();
    if client.init().is_err() {
        return;
    }

    let token = if input.use_token {
        client.token().unwrap_or_default().to_owned()
    } else {
        String::from("x")
    };
    let payload = join_payload(&token, input.bursts.iter().copied());
    let request = UidlRequest::new(harness.root, payload).repaint_all(input.repaint_all);
    if let Ok(response) = harness.manager.handle_uidl_request(&harness.session, &request) {
        assert!(response.body.starts_with("for(;;);[{"));
    }
});
