#![forbid(unsafe_code)]

//! Response body construction.
//!
//! [`ResponseWriter::write`] renders one round trip for one root into a
//! string, in this order:
//!
//! ```text
//! "changes":[...], "state":{...}, "types":{...}, "hierarchy":{...},
//! ["rpc" : [...], ] "meta" : {...}, "resources" : {...}
//! [, "typeMappings" : {...}, "typeInheritanceMap" : {...}]
//! [, "scriptDependencies": [...]] [, "styleDependencies": [...]]
//! , "locales":[...] [, "timings":[total, last]]
//! ```
//!
//! Framing (`for(;;);[{` … `}]` and the security key) is added by the
//! caller.
//!
//! # Invariants
//!
//! 1. **Dirty and visible only**: `state`, `types` and `hierarchy` cover
//!    exactly the dirty visible connectors, in attach order.
//! 2. **All or nothing**: on error nothing is appended to the output.
//! 3. **Mapped once**: a type appears in `typeMappings` only the first time
//!    its root's client sees it, until a repaint clears the client cache.
//! 4. **Clean after**: a successful write leaves every connector clean.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unknown root | Stale request | `SessionError::UnknownRoot` |
//! | State or RPC parameter does not encode | Connector bug | `PaintError::Codec` |
//! | Legacy paint fails | Connector bug | `PaintError` from the connector |
//! | Theme resource missing | Theme packaging | Omitted + `error!` |

use std::iter;

use csync_codec::{ConnectorId, JsonCodec, JsonValue};
use csync_core::{Capabilities, ConnectorTracker, ConnectorType, PaintError, PaintTarget};
use csync_i18n::LocaleCatalog;
use serde_json::{Map, json};

use crate::config::SystemMessages;
use crate::error::{RequestError, SessionError};
use crate::locale::render_pending;
use crate::resources::ThemeResourceProvider;
use crate::session::{RootState, SessionState};

/// Seconds added to the session timeout before the client redirects.
const TIMED_REDIRECT_GRACE_SECS: u32 = 15;

/// Finds connectors with invalid layouts on request of the client's debug
/// console.
pub trait LayoutAnalyzer: Send + Sync {
    /// Entries for `meta.invalidLayouts`.
    fn invalid_layouts(&self, tracker: &ConnectorTracker) -> Vec<JsonValue>;
}

/// Per-request choices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Send everything and reset the client cache.
    pub repaint_all: bool,
    pub analyze_layouts: bool,
    /// Connector for the client to highlight, honoured on repaint only.
    pub highlight: Option<ConnectorId>,
    /// `[session age ms, last request ms]`.
    pub timings: Option<[u64; 2]>,
}

/// Renders response bodies.
pub struct ResponseWriter<'a> {
    codec: &'a JsonCodec,
    catalog: &'a LocaleCatalog,
    theme: &'a dyn ThemeResourceProvider,
    theme_name: &'a str,
    messages: &'a SystemMessages,
    layout: Option<&'a dyn LayoutAnalyzer>,
}

impl<'a> ResponseWriter<'a> {
    #[must_use]
    pub fn new(
        codec: &'a JsonCodec,
        catalog: &'a LocaleCatalog,
        theme: &'a dyn ThemeResourceProvider,
        theme_name: &'a str,
        messages: &'a SystemMessages,
    ) -> Self {
        Self {
            codec,
            catalog,
            theme,
            theme_name,
            messages,
            layout: None,
        }
    }

    #[must_use]
    pub fn with_layout_analyzer(mut self, layout: Option<&'a dyn LayoutAnalyzer>) -> Self {
        self.layout = layout;
        self
    }

    /// Append the body of one round trip for `root_id` to `out`.
    ///
    /// # Errors
    ///
    /// See the module-level failure table. `out` is untouched on error.
    pub fn write(
        &self,
        out: &mut String,
        session: &mut SessionState,
        root_id: u32,
        options: &WriteOptions,
    ) -> Result<(), RequestError> {
        let timeout = session.session_timeout_secs();
        let locale = session.locale().to_owned();
        let SessionState {
            roots,
            types,
            locales,
            resources,
            timeout_sent,
            ..
        } = session;
        let RootState { tracker, cache, .. } = roots
            .get_mut(&root_id)
            .ok_or(SessionError::UnknownRoot(root_id))?;
        let repaint = options.repaint_all;

        if repaint {
            cache.clear();
            tracker.mark_all_dirty();
            locales.reset(&locale);
        }

        let dirty = tracker.dirty_visible_connectors();
        tracing::debug!("Found {} dirty connectors to paint", dirty.len());
        tracker.before_client_response(&dirty, repaint);

        // ── Connector payload ──

        let mut changes = Vec::new();
        let mut paint_resources: Vec<String> = Vec::new();
        let mut states = Map::new();
        let mut type_tags = Map::new();
        let mut hierarchy = Map::new();
        let mut used: Vec<&'static ConnectorType> = Vec::new();

        for id in &dirty {
            let Some(connector) = tracker.get(id) else {
                continue;
            };
            let ty = connector.connector_type();
            let tag = types.tag_for(ty).to_string();
            if !used.contains(&ty) {
                used.push(ty);
            }
            let caps = connector.capabilities();

            if caps.contains(Capabilities::LEGACY_PAINT) {
                let mut target = PaintTarget::new();
                connector.paint(&mut target)?;
                let (element, requested) = target.into_element(&tag);
                changes.push(json!(["change", {"format": "uidl", "pid": id.as_str()}, element]));
                for name in requested {
                    if !paint_resources.contains(&name) {
                        paint_resources.push(name);
                    }
                }
            }

            if caps.contains(Capabilities::HAS_STATE) {
                if let Some(shared) = connector.state() {
                    let encoded = shared
                        .encode(self.codec, repaint, &*tracker)
                        .map_err(|source| PaintError::Codec {
                            connector: Some(id.clone()),
                            source,
                        })?;
                    states.insert(id.to_string(), encoded);
                }
            }

            type_tags.insert(id.to_string(), JsonValue::String(tag));
            let children = tracker
                .visible_children(id)
                .into_iter()
                .map(|child| JsonValue::String(child.to_string()))
                .collect();
            hierarchy.insert(id.to_string(), JsonValue::Array(children));
        }

        let mut rpc = Vec::new();
        for call in tracker.pending_rpc(&dirty) {
            let params = call
                .params
                .iter()
                .zip(&call.param_types)
                .map(|(value, ty)| self.codec.encode(value, None, ty, &*tracker))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| PaintError::Codec {
                    connector: Some(call.connector_id.clone()),
                    source,
                })?;
            rpc.push(json!([call.connector_id.as_str(), call.interface, call.method, params]));
        }
        // Queued calls survive a failed response.
        tracker.drain_pending_rpc(&dirty);

        // ── Meta and resources ──

        let mut meta = Map::new();
        if repaint {
            meta.insert("repaintAll".to_owned(), JsonValue::Bool(true));
            if options.analyze_layouts {
                if let Some(layout) = self.layout {
                    let invalid = layout.invalid_layouts(tracker);
                    meta.insert("invalidLayouts".to_owned(), JsonValue::Array(invalid));
                }
            }
            if let Some(highlight) = &options.highlight {
                meta.insert("hl".to_owned(), JsonValue::String(highlight.to_string()));
            }
        }
        if self.messages.wants_timed_redirect() {
            if repaint || *timeout_sent != Some(timeout) {
                let url = self.messages.session_expired_url.as_deref().unwrap_or("");
                meta.insert(
                    "timedRedirect".to_owned(),
                    json!({"interval": timeout + TIMED_REDIRECT_GRACE_SECS, "url": url}),
                );
            }
            *timeout_sent = Some(timeout);
        }

        let mut inlined = Map::new();
        for name in paint_resources {
            match self.theme.theme_resource(self.theme_name, &name) {
                Some(text) => {
                    inlined.insert(name, JsonValue::String(text));
                }
                None => tracing::error!(
                    resource = %name,
                    theme = self.theme_name,
                    "theme resource requested by paint not found"
                ),
            }
        }

        // ── Type mappings and dependencies ──

        let mut mappings = Map::new();
        let mut new_types: Vec<&'static ConnectorType> = Vec::new();
        for ty in used.iter().flat_map(|ty| iter::once(*ty).chain(ty.ancestors())) {
            if cache.cache(ty) {
                mappings.insert(ty.name().to_owned(), JsonValue::from(types.tag_for(ty)));
                new_types.push(ty);
            }
        }
        let mut inheritance = Map::new();
        if !mappings.is_empty() {
            for ty in used.iter().flat_map(|ty| iter::once(*ty).chain(ty.ancestors())) {
                if let Some(supertype) = ty.supertype() {
                    let key = types.tag_for(ty).to_string();
                    let parent = types.tag_for(supertype);
                    inheritance.entry(key).or_insert(JsonValue::from(parent));
                }
            }
        }

        new_types.sort_by_key(|ty| ty.depth());
        let mut scripts = Vec::new();
        let mut styles = Vec::new();
        for &ty in &new_types {
            scripts.extend(ty.scripts().iter().map(|uri| resources.register(uri, ty)));
            styles.extend(ty.styles().iter().map(|uri| resources.register(uri, ty)));
        }

        let locale_data = render_pending(locales, self.catalog);

        // ── Assembly ──

        let mut body = String::with_capacity(256);
        body.push_str("\"changes\":");
        body.push_str(&JsonValue::Array(changes).to_string());
        body.push_str(", \"state\":");
        body.push_str(&JsonValue::Object(states).to_string());
        body.push_str(", \"types\":");
        body.push_str(&JsonValue::Object(type_tags).to_string());
        body.push_str(", \"hierarchy\":");
        body.push_str(&JsonValue::Object(hierarchy).to_string());
        body.push_str(", ");
        if !rpc.is_empty() {
            body.push_str("\"rpc\" : ");
            body.push_str(&JsonValue::Array(rpc).to_string());
            body.push_str(", ");
        }
        body.push_str("\"meta\" : ");
        body.push_str(&JsonValue::Object(meta).to_string());
        body.push_str(", \"resources\" : ");
        body.push_str(&JsonValue::Object(inlined).to_string());
        if !mappings.is_empty() {
            body.push_str(", \"typeMappings\" : ");
            body.push_str(&JsonValue::Object(mappings).to_string());
            body.push_str(", \"typeInheritanceMap\" : ");
            body.push_str(&JsonValue::Object(inheritance).to_string());
        }
        if !scripts.is_empty() {
            body.push_str(", \"scriptDependencies\": ");
            body.push_str(&json!(scripts).to_string());
        }
        if !styles.is_empty() {
            body.push_str(", \"styleDependencies\": ");
            body.push_str(&json!(styles).to_string());
        }
        body.push_str(", \"locales\":");
        body.push_str(&JsonValue::Array(locale_data).to_string());
        if let Some([total, last]) = options.timings {
            body.push_str(&format!(", \"timings\":[{total}, {last}]"));
        }

        tracker.mark_all_clean();
        out.push_str(&body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeploymentConfig;
    use crate::resources::NoThemeResources;
    use crate::session::Session;
    use csync_codec::{BeanType, TypeDescriptor};
    use csync_core::{ClientRpcCall, Connector, SharedState};
    use std::sync::Arc;

    static BASE: ConnectorType = ConnectorType::new("test.AbstractComponent");
    static ROOT: ConnectorType = ConnectorType::new("test.Root")
        .extends(&BASE)
        .with_scripts(&["root.js"]);
    static LABEL: ConnectorType = ConnectorType::new("test.Label")
        .extends(&BASE)
        .with_styles(&["connector://label.css", "https://cdn.example.org/fonts.css"]);
    static LEGACY: ConnectorType = ConnectorType::new("test.LegacyWidget");

    // ── Test connectors ──

    struct Node {
        ty: &'static ConnectorType,
        caps: Capabilities,
        visible: bool,
        state: Option<SharedState>,
    }

    impl Node {
        fn root() -> Box<dyn Connector> {
            Box::new(Self {
                ty: &ROOT,
                caps: Capabilities::CONTAINER | Capabilities::ROOT,
                visible: true,
                state: None,
            })
        }

        fn label(text: &str) -> Box<dyn Connector> {
            let ty = BeanType::new("test.LabelState").property("text", TypeDescriptor::String);
            let mut state = SharedState::new(Arc::new(ty));
            state.set("text", text).unwrap();
            Box::new(Self {
                ty: &LABEL,
                caps: Capabilities::LEAF_COMPONENT,
                visible: true,
                state: Some(state),
            })
        }

        fn hidden_panel() -> Box<dyn Connector> {
            Box::new(Self {
                ty: &BASE,
                caps: Capabilities::CONTAINER,
                visible: false,
                state: None,
            })
        }

        fn legacy() -> Box<dyn Connector> {
            Box::new(Self {
                ty: &LEGACY,
                caps: Capabilities::COMPONENT | Capabilities::LEGACY_PAINT,
                visible: true,
                state: None,
            })
        }
    }

    impl Connector for Node {
        fn connector_type(&self) -> &'static ConnectorType {
            self.ty
        }
        fn capabilities(&self) -> Capabilities {
            self.caps
        }
        fn is_visible(&self) -> bool {
            self.visible
        }
        fn state(&self) -> Option<&SharedState> {
            self.state.as_ref()
        }
        fn paint(&self, target: &mut PaintTarget) -> Result<(), PaintError> {
            target.add_attribute("caption", "Legacy");
            target.use_resource("layouts/legacy.html");
            Ok(())
        }
    }

    struct Theme;

    impl ThemeResourceProvider for Theme {
        fn theme_resource(&self, theme: &str, name: &str) -> Option<String> {
            (name == "layouts/legacy.html").then(|| format!("<div>{theme}</div>"))
        }
    }

    struct Fixture {
        session: Session,
        root_id: u32,
        codec: JsonCodec,
        catalog: LocaleCatalog,
        messages: SystemMessages,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_messages(SystemMessages::default())
        }

        fn with_messages(messages: SystemMessages) -> Self {
            let config = DeploymentConfig {
                default_locale: Some("en_US".into()),
                ..DeploymentConfig::default()
            };
            let session = Session::new(&config);
            let root_id = session.lock().unwrap().add_root(Node::root()).unwrap();
            Self {
                session,
                root_id,
                codec: JsonCodec::default(),
                catalog: LocaleCatalog::builtin(),
                messages,
            }
        }

        fn attach(&self, parent: Option<&ConnectorId>, connector: Box<dyn Connector>) -> ConnectorId {
            let mut state = self.session.lock().unwrap();
            let tracker = &mut state.root_mut(self.root_id).unwrap().tracker;
            let parent = parent.cloned().or_else(|| tracker.root().cloned()).unwrap();
            tracker.attach(&parent, connector).unwrap()
        }

        fn write_with(&self, theme: &dyn ThemeResourceProvider, options: &WriteOptions) -> JsonValue {
            let writer = ResponseWriter::new(&self.codec, &self.catalog, theme, "base", &self.messages);
            let mut out = String::new();
            let mut state = self.session.lock().unwrap();
            writer.write(&mut out, &mut state, self.root_id, options).unwrap();
            serde_json::from_str(&format!("{{{out}}}")).unwrap()
        }

        fn write(&self, repaint_all: bool) -> JsonValue {
            let options = WriteOptions {
                repaint_all,
                ..WriteOptions::default()
            };
            self.write_with(&NoThemeResources, &options)
        }
    }

    fn keys(value: &JsonValue) -> Vec<String> {
        value.as_object().unwrap().keys().cloned().collect()
    }

    #[test]
    fn field_order() {
        let fixture = Fixture::new();
        fixture.attach(None, Node::label("hi"));
        let body = fixture.write(true);
        assert_eq!(
            keys(&body),
            [
                "changes",
                "state",
                "types",
                "hierarchy",
                "meta",
                "resources",
                "typeMappings",
                "typeInheritanceMap",
                "scriptDependencies",
                "styleDependencies",
                "locales",
            ]
        );
        assert_eq!(body["meta"], json!({"repaintAll": true}));
        assert_eq!(body["locales"][0]["name"], "en_US");
    }

    #[test]
    fn repaint_sends_full_state_and_hierarchy() {
        let fixture = Fixture::new();
        let label = fixture.attach(None, Node::label("hi"));
        let body = fixture.write(true);
        assert_eq!(body["state"][label.as_str()], json!({"text": "hi"}));
        assert_eq!(body["hierarchy"]["0"], json!([label.as_str()]));
        assert_eq!(body["hierarchy"][label.as_str()], json!([]));
        assert_eq!(body["types"]["0"], "0");
        assert_eq!(body["types"][label.as_str()], "1");
    }

    #[test]
    fn hidden_subtree_is_not_sent() {
        let fixture = Fixture::new();
        let panel = fixture.attach(None, Node::hidden_panel());
        let label = fixture.attach(Some(&panel), Node::label("secret"));
        let body = fixture.write(false);
        for section in ["state", "types", "hierarchy"] {
            assert!(body[section].get(label.as_str()).is_none(), "{section}");
            assert!(body[section].get(panel.as_str()).is_none(), "{section}");
        }
        assert_eq!(body["hierarchy"]["0"], json!([]));
    }

    #[test]
    fn types_are_mapped_once_until_repaint() {
        let fixture = Fixture::new();
        fixture.attach(None, Node::label("a"));
        let first = fixture.write(true);
        assert_eq!(
            first["typeMappings"],
            json!({"test.Root": 0, "test.Label": 1, "test.AbstractComponent": 2})
        );
        assert_eq!(first["typeInheritanceMap"], json!({"0": 2, "1": 2}));
        assert_eq!(first["scriptDependencies"], json!(["connector:///root.js"]));
        assert_eq!(
            first["styleDependencies"],
            json!(["connector:///label.css", "https://cdn.example.org/fonts.css"])
        );

        fixture.attach(None, Node::label("b"));
        let second = fixture.write(false);
        assert!(second.get("typeMappings").is_none());
        assert!(second.get("typeInheritanceMap").is_none());
        assert!(second.get("locales").is_some_and(|l| l == &json!([])));

        let third = fixture.write(true);
        assert_eq!(third["typeMappings"], first["typeMappings"]);
        assert_eq!(third["state"].as_object().map(Map::len), Some(2));
    }

    #[test]
    fn consecutive_repaints_are_identical() {
        let fixture = Fixture::new();
        fixture.attach(None, Node::label("same"));
        let first = fixture.write(true);
        let second = fixture.write(true);
        assert_eq!(first["state"], second["state"]);
        assert_eq!(first["typeMappings"], second["typeMappings"]);
    }

    #[test]
    fn incremental_round_trip_is_clean() {
        let fixture = Fixture::new();
        fixture.attach(None, Node::label("x"));
        fixture.write(true);
        let body = fixture.write(false);
        assert_eq!(body["state"], json!({}));
        assert_eq!(body["meta"], json!({}));
    }

    #[test]
    fn rpc_written_only_when_pending() {
        let fixture = Fixture::new();
        let label = fixture.attach(None, Node::label("x"));
        let body = fixture.write(true);
        assert!(body.get("rpc").is_none());

        {
            let mut state = fixture.session.lock().unwrap();
            let tracker = &mut state.root_mut(fixture.root_id).unwrap().tracker;
            tracker
                .enqueue_client_rpc(
                    ClientRpcCall::new(label.clone(), "test.LabelClientRpc", "blink")
                        .param(TypeDescriptor::Int, 3),
                )
                .unwrap();
        }
        let body = fixture.write(false);
        assert_eq!(
            body["rpc"],
            json!([[label.as_str(), "test.LabelClientRpc", "blink", [3]]])
        );
        assert_eq!(keys(&body)[4], "rpc");
    }

    #[test]
    fn failed_rpc_encoding_keeps_calls_queued() {
        let fixture = Fixture::new();
        let label = fixture.attach(None, Node::label("x"));
        fixture.write(true);
        {
            let mut state = fixture.session.lock().unwrap();
            let tracker = &mut state.root_mut(fixture.root_id).unwrap().tracker;
            tracker
                .enqueue_client_rpc(
                    ClientRpcCall::new(label.clone(), "test.LabelClientRpc", "blink")
                        .param(TypeDescriptor::Int, 1),
                )
                .unwrap();
            tracker
                .enqueue_client_rpc(
                    ClientRpcCall::new(label.clone(), "test.LabelClientRpc", "scale")
                        .param(TypeDescriptor::Double, f64::NAN),
                )
                .unwrap();
        }

        let writer = ResponseWriter::new(
            &fixture.codec,
            &fixture.catalog,
            &NoThemeResources,
            "base",
            &fixture.messages,
        );
        let mut out = String::new();
        let mut state = fixture.session.lock().unwrap();
        let err = writer
            .write(&mut out, &mut state, fixture.root_id, &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, RequestError::Paint(_)), "{err}");
        assert!(out.is_empty());

        let tracker = &state.root(fixture.root_id).unwrap().tracker;
        let queued: Vec<&str> = tracker
            .pending_rpc(std::slice::from_ref(&label))
            .iter()
            .map(|call| call.method.as_str())
            .collect();
        assert_eq!(queued, ["blink", "scale"]);
    }

    #[test]
    fn legacy_paint_and_theme_resources() {
        let fixture = Fixture::new();
        let legacy = fixture.attach(None, Node::legacy());
        let body = fixture.write_with(
            &Theme,
            &WriteOptions {
                repaint_all: true,
                ..WriteOptions::default()
            },
        );
        let tag = body["types"][legacy.as_str()].as_str().unwrap().to_owned();
        assert_eq!(
            body["changes"],
            json!([["change", {"format": "uidl", "pid": legacy.as_str()}, [tag, {"caption": "Legacy"}]]])
        );
        assert_eq!(
            body["resources"],
            json!({"layouts/legacy.html": "<div>base</div>"})
        );
    }

    #[test]
    fn highlight_and_timings() {
        let fixture = Fixture::new();
        let options = WriteOptions {
            repaint_all: true,
            highlight: Some(ConnectorId::new("0")),
            timings: Some([120, 7]),
            ..WriteOptions::default()
        };
        let body = fixture.write_with(&NoThemeResources, &options);
        assert_eq!(body["meta"]["hl"], "0");
        assert_eq!(body["timings"], json!([120, 7]));

        let options = WriteOptions {
            repaint_all: false,
            ..options
        };
        let body = fixture.write_with(&NoThemeResources, &options);
        assert!(body["meta"].get("hl").is_none());
    }

    #[test]
    fn timed_redirect_on_repaint_or_timeout_change() {
        let fixture = Fixture::with_messages(SystemMessages {
            session_expired_notification_enabled: true,
            session_expired_url: Some("/expired".into()),
            ..SystemMessages::default()
        });
        let body = fixture.write(true);
        assert_eq!(
            body["meta"]["timedRedirect"],
            json!({"interval": 1815, "url": "/expired"})
        );
        assert!(fixture.write(false)["meta"].get("timedRedirect").is_none());

        fixture.session.lock().unwrap().set_session_timeout(60);
        assert_eq!(fixture.write(false)["meta"]["timedRedirect"]["interval"], 75);
    }

    #[test]
    fn unknown_root_leaves_output_untouched() {
        let fixture = Fixture::new();
        let writer = ResponseWriter::new(
            &fixture.codec,
            &fixture.catalog,
            &NoThemeResources,
            "base",
            &fixture.messages,
        );
        let mut out = String::from("prefix");
        let mut state = fixture.session.lock().unwrap();
        let err = writer
            .write(&mut out, &mut state, 42, &WriteOptions::default())
            .unwrap_err();
        assert!(matches!(err, RequestError::Session(SessionError::UnknownRoot(42))));
        assert_eq!(out, "prefix");
    }
}
