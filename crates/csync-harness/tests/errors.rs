//! Handler failures are routed, never fatal to the request.

use csync_codec::Value;
use csync_core::ErrorOrigin;
use csync_harness::fixtures::{self, BUTTON_SERVER_RPC, ErrorRecord};
use csync_harness::{Harness, burst, legacy, rpc};
use csync_runtime::DeploymentConfig;
use pretty_assertions::assert_eq;

#[test]
fn unhandled_failure_reaches_the_session_handler() {
    let harness = Harness::new(DeploymentConfig::default());
    let button = harness.attach(None, fixtures::button()).unwrap();
    let mut client = harness.client();
    client.init().unwrap();

    let message = client
        .send(&[&burst([
            rpc(&button, BUTTON_SERVER_RPC, "click", "[-1]"),
            rpc(&button, BUTTON_SERVER_RPC, "click", "[2]"),
        ])])
        .unwrap();

    assert_eq!(
        harness.errors.records(),
        vec![ErrorRecord {
            origin: ErrorOrigin::Invocation,
            connector: Some(button.clone()),
            message: "negative click count -1".into(),
        }]
    );
    assert_eq!(message.state(&button)["clicks"], 2);
    assert_eq!(message.rpc().len(), 1);
}

#[test]
fn connector_handler_takes_its_own_errors() {
    let harness = Harness::new(DeploymentConfig::default());
    let button = harness.attach(None, fixtures::button_handling_errors()).unwrap();
    let mut client = harness.client();
    client.init().unwrap();

    let message = client
        .send(&[&burst([rpc(&button, BUTTON_SERVER_RPC, "click", "[-3]")])])
        .unwrap();

    assert!(harness.errors.records().is_empty());
    assert_eq!(message.state(&button)["lastError"], "negative click count -3");
    assert!(!message.has("rpc"));
}

#[test]
fn failing_variable_change_is_reported_with_origin() {
    let harness = Harness::new(DeploymentConfig::default());
    let field = harness.attach(None, fixtures::text_field()).unwrap();
    let mut client = harness.client();
    client.init().unwrap();

    client
        .send(&[&burst([
            legacy(&field, "bogus", r#"["s","x"]"#),
        ])])
        .unwrap();
    client
        .send(&[&burst([legacy(&field, "text", r#"["s","fine"]"#)])])
        .unwrap();

    let records = harness.errors.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].origin, ErrorOrigin::Invocation);
    assert_eq!(records[0].connector.as_ref(), Some(&field));
    assert!(records[0].message.starts_with("unknown variable"), "{}", records[0].message);

    let text = harness.with_tracker(|tracker| {
        tracker
            .get(&field)
            .and_then(|c| c.state())
            .and_then(|s| s.get("text"))
            .cloned()
    });
    assert_eq!(text, Some(Value::from("fine")));
}

#[test]
fn undecodable_parameter_is_skipped_without_an_error_event() {
    let harness = Harness::new(DeploymentConfig::default());
    let button = harness.attach(None, fixtures::button()).unwrap();
    let mut client = harness.client();
    client.init().unwrap();

    let message = client
        .send(&[&burst([rpc(&button, BUTTON_SERVER_RPC, "click", r#"["many"]"#)])])
        .unwrap();

    assert!(harness.errors.records().is_empty());
    assert!(message.state_ids().is_empty());
}
