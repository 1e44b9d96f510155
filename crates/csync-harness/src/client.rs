#![forbid(unsafe_code)]

//! A scripted client for one root of one session.
//!
//! [`TestClient`] performs the `init` handshake, keeps the security token,
//! and turns responses into [`Message`]s with typed accessors.
//!
//! ```ignore
//! let mut client = TestClient::new(&manager, &session, root);
//! client.init()?;
//! let message = client.send(&[&burst([legacy(&field, "text", r#"["s","hi"]"#)])])?;
//! assert_eq!(message.state(&field)["text"], "hi");
//! ```

use csync_codec::{ConnectorId, JsonValue};
use csync_runtime::burst::join_payload;
use csync_runtime::security::INIT_MARKER;
use csync_runtime::{CommunicationManager, RequestError, Session, UidlRequest};
use serde_json::{Map, Value};

/// Prefix of every framed UIDL response.
pub const FRAME_PREFIX: &str = "for(;;);";

// ============================================================================
// Payload builders
// ============================================================================

/// A legacy variable-change tuple. `uidl_value` is the `[tag, value]` JSON.
#[must_use]
pub fn legacy(connector: &ConnectorId, name: &str, uidl_value: &str) -> String {
    format!(r#"["{connector}","v","v",["{name}",{uidl_value}]]"#)
}

/// An RPC tuple. `params` is the JSON array of encoded parameters.
#[must_use]
pub fn rpc(connector: &ConnectorId, interface: &str, method: &str, params: &str) -> String {
    format!(r#"["{connector}","{interface}","{method}",{params}]"#)
}

/// A burst: the JSON array of `tuples`.
#[must_use]
pub fn burst<I, S>(tuples: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = tuples.into_iter().map(|t| t.as_ref().to_owned()).collect();
    format!("[{}]", parts.join(","))
}

// ============================================================================
// Message
// ============================================================================

/// One parsed response object.
#[derive(Debug, Clone, PartialEq)]
pub struct Message(pub JsonValue);

impl Message {
    /// Parse a framed (`for(;;);[{...}]`) or bare (`{...}`) response.
    ///
    /// # Errors
    ///
    /// The body is not JSON of either shape.
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        match body.strip_prefix(FRAME_PREFIX) {
            Some(framed) => {
                let mut list: Vec<JsonValue> = serde_json::from_str(framed)?;
                Ok(Self(list.pop().unwrap_or(Value::Null)))
            }
            None => serde_json::from_str(body).map(Self),
        }
    }

    /// Top-level keys in wire order.
    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.0
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.0.get(key).is_some()
    }

    #[must_use]
    pub fn field(&self, key: &str) -> &JsonValue {
        &self.0[key]
    }

    fn object(&self, key: &str) -> Map<String, JsonValue> {
        self.0
            .get(key)
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn state(&self, connector: &ConnectorId) -> &JsonValue {
        &self.0["state"][connector.as_str()]
    }

    /// Ids with an entry in `state`.
    #[must_use]
    pub fn state_ids(&self) -> Vec<String> {
        self.object("state").keys().cloned().collect()
    }

    /// Ids with an entry in `types`.
    #[must_use]
    pub fn painted_ids(&self) -> Vec<String> {
        self.object("types").keys().cloned().collect()
    }

    #[must_use]
    pub fn type_tag(&self, connector: &ConnectorId) -> Option<&str> {
        self.0["types"][connector.as_str()].as_str()
    }

    #[must_use]
    pub fn children(&self, connector: &ConnectorId) -> Option<Vec<String>> {
        self.0["hierarchy"][connector.as_str()].as_array().map(|ids| {
            ids.iter()
                .filter_map(|id| id.as_str().map(str::to_owned))
                .collect()
        })
    }

    #[must_use]
    pub fn rpc(&self) -> Vec<JsonValue> {
        self.0
            .get("rpc")
            .and_then(JsonValue::as_array)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn meta(&self) -> &JsonValue {
        &self.0["meta"]
    }

    /// Canonical name → tag, empty when the field is absent.
    #[must_use]
    pub fn type_mappings(&self) -> Map<String, JsonValue> {
        self.object("typeMappings")
    }

    #[must_use]
    pub fn security_key(&self) -> Option<&str> {
        self.0["Security-Key"].as_str()
    }
}

// ============================================================================
// TestClient
// ============================================================================

/// Drives UIDL round trips for one root.
pub struct TestClient<'a> {
    manager: &'a CommunicationManager,
    session: &'a Session,
    root: u32,
    token: Option<String>,
}

impl<'a> TestClient<'a> {
    #[must_use]
    pub fn new(manager: &'a CommunicationManager, session: &'a Session, root: u32) -> Self {
        Self {
            manager,
            session,
            root,
            token: None,
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// The `init` handshake: a repaint-all request that yields the token.
    ///
    /// # Errors
    ///
    /// As [`CommunicationManager::handle_uidl_request`].
    pub fn init(&mut self) -> Result<Message, RequestError> {
        let request = UidlRequest::new(self.root, INIT_MARKER).repaint_all(true);
        let message = self.round_trip(&request)?;
        if let Some(key) = message.security_key() {
            self.token = Some(key.to_owned());
        }
        Ok(message)
    }

    /// Post `bursts` behind the stored token.
    ///
    /// # Errors
    ///
    /// As [`CommunicationManager::handle_uidl_request`].
    pub fn send(&mut self, bursts: &[&str]) -> Result<Message, RequestError> {
        let request = UidlRequest::new(self.root, self.payload(bursts));
        self.round_trip(&request)
    }

    /// Ask for a full repaint without changes.
    ///
    /// # Errors
    ///
    /// As [`CommunicationManager::handle_uidl_request`].
    pub fn repaint(&mut self) -> Result<Message, RequestError> {
        let request = UidlRequest::new(self.root, self.payload(&[])).repaint_all(true);
        self.round_trip(&request)
    }

    /// Build a payload with the stored token (empty before `init`).
    #[must_use]
    pub fn payload(&self, bursts: &[&str]) -> String {
        join_payload(self.token.as_deref().unwrap_or(""), bursts.iter().copied())
    }

    /// Send a prepared request.
    ///
    /// # Errors
    ///
    /// As [`CommunicationManager::handle_uidl_request`].
    pub fn round_trip(&mut self, request: &UidlRequest) -> Result<Message, RequestError> {
        let response = self.manager.handle_uidl_request(self.session, request)?;
        tracing::debug!(bytes = response.body.len(), "test client received response");
        Ok(Message::parse(&response.body).unwrap_or(Message(Value::String(response.body))))
    }
}
