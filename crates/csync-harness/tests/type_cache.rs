//! Type tags, the per-root client type cache and connector dependencies.

use std::sync::Arc;

use csync_harness::{Harness, fixtures};
use csync_runtime::{DeploymentConfig, DirectoryResourceProvider};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

fn mapping(message: &csync_harness::Message) -> Value {
    Value::Object(message.type_mappings())
}

#[test]
fn first_response_maps_types_and_supertypes() {
    let harness = Harness::new(DeploymentConfig::default());
    let field = harness.attach(None, fixtures::text_field()).unwrap();

    let message = harness.client().init().unwrap();

    assert_eq!(message.type_tag(&harness.window), Some("0"));
    assert_eq!(message.type_tag(&field), Some("1"));
    assert_eq!(
        mapping(&message),
        json!({"csync.ui.Window": 0, "csync.ui.AbstractComponent": 2, "csync.ui.TextField": 1})
    );
    assert_eq!(message.field("typeInheritanceMap"), &json!({"0": 2, "1": 2}));
}

#[test]
fn known_types_are_not_mapped_again() {
    let harness = Harness::new(DeploymentConfig::default());
    harness.attach(None, fixtures::text_field()).unwrap();
    let mut client = harness.client();
    client.init().unwrap();

    let second = harness.attach(None, fixtures::text_field()).unwrap();
    let message = client.send(&[]).unwrap();
    assert_eq!(message.type_tag(&second), Some("1"));
    assert!(!message.has("typeMappings"));
    assert!(!message.has("typeInheritanceMap"));

    harness.attach(None, fixtures::label("new")).unwrap();
    let message = client.send(&[]).unwrap();
    assert_eq!(mapping(&message), json!({"csync.ui.Label": 3}));
    assert_eq!(message.field("typeInheritanceMap"), &json!({"3": 2}));
}

#[test]
fn repaint_maps_everything_with_stable_tags() {
    let harness = Harness::new(DeploymentConfig::default());
    harness.attach(None, fixtures::text_field()).unwrap();
    let mut client = harness.client();
    let first = client.init().unwrap();

    let repainted = client.repaint().unwrap();
    assert_eq!(mapping(&repainted), mapping(&first));
    assert_eq!(repainted.meta()["repaintAll"], true);
}

#[test]
fn tags_are_shared_by_roots_of_a_session() {
    let harness = Harness::new(DeploymentConfig::default());
    let second = {
        let mut state = harness.session.lock().unwrap();
        let id = state.add_root(fixtures::window("Second")).unwrap();
        let window = state.root(id).unwrap().tracker.root().cloned().unwrap();
        state
            .root_mut(id)
            .unwrap()
            .tracker
            .attach(&window, fixtures::label("there"))
            .unwrap();
        id
    };
    harness.attach(None, fixtures::label("here")).unwrap();

    let first = harness.client().init().unwrap();
    let other = csync_harness::TestClient::new(&harness.manager, &harness.session, second)
        .init()
        .unwrap();

    assert_eq!(
        first.type_mappings().get("csync.ui.Label"),
        other.type_mappings().get("csync.ui.Label")
    );
}

#[test]
fn dependencies_are_sent_supertypes_first_with_the_type() {
    let harness = Harness::new(DeploymentConfig::default());
    harness.attach(None, fixtures::text_field()).unwrap();
    let mut client = harness.client();

    let message = client.init().unwrap();
    assert_eq!(
        message.field("scriptDependencies"),
        &json!([
            "connector:///window.js",
            "https://cdn.example.org/input-mask.js",
            "connector:///textfield.js"
        ])
    );
    assert_eq!(message.field("styleDependencies"), &json!(["connector:///window.css"]));

    harness.attach(None, fixtures::text_field()).unwrap();
    let message = client.send(&[]).unwrap();
    assert!(!message.has("scriptDependencies"));
    assert!(!message.has("styleDependencies"));
}

#[test]
fn declared_dependencies_are_served() {
    let dir = tempfile::tempdir().unwrap();
    let package = dir.path().join("csync/ui");
    std::fs::create_dir_all(&package).unwrap();
    std::fs::write(package.join("textfield.js"), b"mask();").unwrap();

    let provider = Arc::new(DirectoryResourceProvider::new(dir.path()));
    let harness = Harness::with_manager(DeploymentConfig::default(), |manager| {
        manager.with_resource_provider(provider)
    });
    harness.attach(None, fixtures::text_field()).unwrap();

    let before = harness
        .manager
        .serve_connector_resource(&harness.session, "textfield.js")
        .unwrap();
    assert_eq!(before.status, 404);

    harness.client().init().unwrap();

    let served = harness
        .manager
        .serve_connector_resource(&harness.session, "textfield.js")
        .unwrap();
    assert!(served.is_ok());
    assert_eq!(served.body, b"mask();");
    assert!(served.content_type.is_some_and(|mime| mime.contains("javascript")));
    assert_eq!(served.cache_seconds, Some(3600));

    let missing = harness
        .manager
        .serve_connector_resource(&harness.session, "window.css")
        .unwrap();
    assert_eq!(missing.status, 404);
    let external = harness
        .manager
        .serve_connector_resource(&harness.session, "input-mask.js")
        .unwrap();
    assert_eq!(external.status, 404);
}

#[test]
fn legacy_paint_inlines_theme_resources() {
    struct Templates;
    impl csync_runtime::ThemeResourceProvider for Templates {
        fn theme_resource(&self, theme: &str, name: &str) -> Option<String> {
            (theme == "base" && name == "layouts/main.html").then(|| "<div/>".to_owned())
        }
    }

    let harness = Harness::with_manager(DeploymentConfig::default(), |manager| {
        manager.with_theme_resources(Arc::new(Templates))
    });
    let layout = harness.attach(None, fixtures::legacy_layout("main")).unwrap();
    let missing = harness.attach(None, fixtures::legacy_layout("gone")).unwrap();

    let message = harness.client().init().unwrap();

    assert_eq!(message.field("resources"), &json!({"layouts/main.html": "<div/>"}));
    let changes = message.field("changes").as_array().unwrap();
    let pids: Vec<&str> = changes
        .iter()
        .filter_map(|c| c[1]["pid"].as_str())
        .collect();
    assert_eq!(pids, vec![layout.as_str(), missing.as_str()]);
    assert!(!message.state_ids().contains(&layout.to_string()));
    assert_eq!(message.type_mappings().get("csync.legacy.CustomLayout"), Some(&json!(1)));
}
