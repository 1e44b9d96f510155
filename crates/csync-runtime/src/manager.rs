#![forbid(unsafe_code)]

//! Request orchestration.
//!
//! [`CommunicationManager`] owns everything shared by the sessions of one
//! deployment (configuration, codec, locale catalog, collaborators) and
//! drives one UIDL round trip:
//!
//! ```text
//! payload → token check → per burst: unescape → decode → dispatch
//!         → (out of sync?) → write → frame → post-paint cleanup
//! ```
//!
//! # Invariants
//!
//! 1. **One request at a time per session**: the session lock is held from
//!    the token check to the end of the response.
//! 2. **Nothing before the token**: a payload failing the token check
//!    dispatches nothing.
//! 3. **Last burst wins**: earlier bursts of a multi-burst payload are
//!    followed by a repaint rendered into a discarded buffer.
//! 4. **Uploads stream unlocked**: the session lock is released while body
//!    bytes are copied and re-taken for each sink callback.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Token mismatch | Forged or stale request | `ProtocolError::Security`, nothing dispatched |
//! | Bad escape or malformed JSON | Client bug | `ProtocolError::Parse`, burst not dispatched |
//! | Unknown connector in burst | Client out of sync | Out-of-sync notice or forced repaint |
//! | Session closed | Application shut down | Redirect to the logout URL |
//! | Widgetset mismatch | Stale client build | `warn!`, request proceeds |

use core::fmt;
use std::io::BufRead;
use std::sync::Arc;

use arc_swap::ArcSwap;
use csync_codec::{CodecConfig, ConnectorId, JsonCodec};
use csync_core::{
    ConnectorTracker, ErrorEvent, ErrorHandler, ErrorOrigin, HandlerError, LoggingErrorHandler,
};
use csync_i18n::LocaleCatalog;
use serde_json::json;
use web_time::Instant;

use crate::burst::{split_payload, unescape};
use crate::config::{DeploymentConfig, SystemMessages};
use crate::decode::{InvocationDecoder, ParseError};
use crate::dispatch::{dispatch_burst, route_error};
use crate::error::RequestError;
use crate::resources::{
    NoResources, NoThemeResources, ResourceProvider, ResourceResponse, ThemeResourceProvider, serve,
};
use crate::security::{SecurityError, TokenCheck};
use crate::session::Session;
use crate::upload::{
    PartReader, UNKNOWN_UPLOAD_NAME, UploadError, UploadMeta, UploadResponse, UploadTarget,
    multipart, read_part_headers, stream_to_receiver,
};
use crate::writer::{LayoutAnalyzer, ResponseWriter, WriteOptions};

/// Content type of UIDL responses.
pub const UIDL_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Anti-hijacking prefix and opening of every UIDL response.
const FRAME_OPEN: &str = "for(;;);[{";
const FRAME_CLOSE: &str = "}]";

// ============================================================================
// Requests and responses
// ============================================================================

/// One UIDL post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UidlRequest {
    pub root_id: u32,
    pub payload: String,
    pub repaint_all: bool,
    pub analyze_layouts: bool,
    /// Connector the client's debug console wants highlighted.
    pub highlight: Option<ConnectorId>,
    /// Version of the client engine that sent the request.
    pub widgetset_version: Option<String>,
}

impl UidlRequest {
    #[must_use]
    pub fn new(root_id: u32, payload: impl Into<String>) -> Self {
        Self {
            root_id,
            payload: payload.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn repaint_all(mut self, repaint_all: bool) -> Self {
        self.repaint_all = repaint_all;
        self
    }

    #[must_use]
    pub fn analyze_layouts(mut self, analyze: bool) -> Self {
        self.analyze_layouts = analyze;
        self
    }

    #[must_use]
    pub fn highlight(mut self, connector: impl Into<ConnectorId>) -> Self {
        self.highlight = Some(connector.into());
        self
    }

    #[must_use]
    pub fn widgetset_version(mut self, version: impl Into<String>) -> Self {
        self.widgetset_version = Some(version.into());
        self
    }
}

/// A framed UIDL response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidlResponse {
    pub content_type: &'static str,
    pub body: String,
}

impl UidlResponse {
    fn json(body: String) -> Self {
        Self {
            content_type: UIDL_CONTENT_TYPE,
            body,
        }
    }
}

fn redirect_body(url: &str) -> String {
    format!("{FRAME_OPEN}\"redirect\":{}{FRAME_CLOSE}", json!({"url": url}))
}

fn out_of_sync_body(messages: &SystemMessages) -> String {
    let error = json!({
        "caption": messages.out_of_sync_caption,
        "message": messages.out_of_sync_message,
        "url": messages.out_of_sync_url,
    });
    format!(
        "{FRAME_OPEN}\"changes\":[], \"meta\" : {{\"appError\": {error}}}, \"resources\": {{}}, \"locales\":[]{FRAME_CLOSE}"
    )
}

// ============================================================================
// CommunicationManager
// ============================================================================

/// Shared, per-deployment request handler.
pub struct CommunicationManager {
    config: ArcSwap<DeploymentConfig>,
    codec: JsonCodec,
    catalog: LocaleCatalog,
    errors: Arc<dyn ErrorHandler>,
    theme: Arc<dyn ThemeResourceProvider>,
    resource_provider: Arc<dyn ResourceProvider>,
    layout: Option<Arc<dyn LayoutAnalyzer>>,
}

impl fmt::Debug for CommunicationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommunicationManager")
            .field("config", &self.config.load_full())
            .field("codec", &self.codec)
            .field("locales", &self.catalog.locales().len())
            .field("layout_analyzer", &self.layout.is_some())
            .finish_non_exhaustive()
    }
}

impl CommunicationManager {
    /// A manager with the built-in locale catalog, a logging error handler
    /// and no theme or connector resources.
    #[must_use]
    pub fn new(config: DeploymentConfig) -> Self {
        let codec = JsonCodec::new(CodecConfig {
            strict_serializable: config.strict_serialization,
            ..CodecConfig::default()
        });
        Self {
            config: ArcSwap::from_pointee(config),
            codec,
            catalog: LocaleCatalog::builtin(),
            errors: Arc::new(LoggingErrorHandler),
            theme: Arc::new(NoThemeResources),
            resource_provider: Arc::new(NoResources),
            layout: None,
        }
    }

    /// Replace the codec, e.g. to add custom serializers.
    #[must_use]
    pub fn with_codec(mut self, codec: JsonCodec) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn with_catalog(mut self, catalog: LocaleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    #[must_use]
    pub fn with_error_handler(mut self, errors: Arc<dyn ErrorHandler>) -> Self {
        self.errors = errors;
        self
    }

    #[must_use]
    pub fn with_theme_resources(mut self, theme: Arc<dyn ThemeResourceProvider>) -> Self {
        self.theme = theme;
        self
    }

    #[must_use]
    pub fn with_resource_provider(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.resource_provider = provider;
        self
    }

    #[must_use]
    pub fn with_layout_analyzer(mut self, layout: Arc<dyn LayoutAnalyzer>) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> Arc<DeploymentConfig> {
        self.config.load_full()
    }

    /// Swap in a new configuration. Requests already running keep the
    /// snapshot they started with; the codec is not rebuilt.
    pub fn reload_config(&self, config: DeploymentConfig) {
        tracing::info!(
            production_mode = config.production_mode,
            xsrf_protection = config.xsrf_protection,
            "deployment configuration reloaded"
        );
        self.config.store(Arc::new(config));
    }

    #[must_use]
    pub fn codec(&self) -> &JsonCodec {
        &self.codec
    }

    #[must_use]
    pub fn new_session(&self) -> Session {
        Session::new(&self.config.load())
    }

    fn writer<'a>(&'a self, config: &'a DeploymentConfig) -> ResponseWriter<'a> {
        ResponseWriter::new(
            &self.codec,
            &self.catalog,
            &*self.theme,
            &config.default_theme,
            &config.system_messages,
        )
        .with_layout_analyzer(self.layout.as_deref())
    }

    // ========================================================================
    // UIDL
    // ========================================================================

    /// Handle one UIDL post for `session`.
    ///
    /// # Errors
    ///
    /// Protocol failures (token, escapes, JSON), an unknown root, a
    /// poisoned session, or a response that could not be built.
    pub fn handle_uidl_request(
        &self,
        session: &Session,
        request: &UidlRequest,
    ) -> Result<UidlResponse, RequestError> {
        let _span = tracing::debug_span!("uidl_request", root = request.root_id).entered();
        let started = Instant::now();
        let config = self.config.load_full();

        if let Some(version) = &request.widgetset_version {
            if *version != config.server_version {
                tracing::warn!(
                    client = %version,
                    server = %config.server_version,
                    "client engine version does not match the server; \
                     unexpected errors may occur"
                );
            }
        }

        let mut state = session.lock()?;
        if !state.is_running() {
            let url = state.logout_url().unwrap_or("");
            tracing::debug!(url, "session closed; redirecting");
            return Ok(UidlResponse::json(redirect_body(url)));
        }
        state.root(request.root_id)?;

        let segments = split_payload(&request.payload);
        let check = state.security.check(&segments)?;
        let bursts = match check {
            TokenCheck::Init => &[][..],
            TokenCheck::Verified | TokenCheck::Disabled => segments.get(1..).unwrap_or(&[]),
        };

        let writer = self.writer(&config);
        let mut inconsistent = false;
        for (index, raw) in bursts.iter().enumerate() {
            if index > 0 {
                let mut discarded = String::new();
                let options = WriteOptions {
                    repaint_all: true,
                    ..WriteOptions::default()
                };
                writer.write(&mut discarded, &mut state, request.root_id, &options)?;
            }
            let text = unescape(raw).map_err(ParseError::from)?;
            let tracker = &mut state.root_mut(request.root_id)?.tracker;
            let decoded = InvocationDecoder::new(&self.codec, tracker).decode_burst(&text)?;
            let outcome = dispatch_burst(tracker, decoded, &*self.errors);
            tracing::debug!(
                burst = index,
                dispatched = outcome.dispatched,
                dropped = outcome.dropped,
                rejected = outcome.rejected,
                "burst handled"
            );
            inconsistent |= outcome.inconsistent;
        }

        let mut repaint_all = request.repaint_all;
        if inconsistent {
            if config.system_messages.has_out_of_sync_notice() {
                tracing::warn!("client out of sync; sending notification");
                return Ok(UidlResponse::json(out_of_sync_body(&config.system_messages)));
            }
            tracing::warn!("client out of sync; forcing a full repaint");
            repaint_all = true;
        }

        let highlight = request.highlight.clone().filter(|_| repaint_all);
        if let Some(id) = &highlight {
            log_highlight(&state.root(request.root_id)?.tracker, id);
        }

        let options = WriteOptions {
            repaint_all,
            analyze_layouts: request.analyze_layouts,
            highlight,
            timings: config
                .send_timings
                .then(|| [state.age_ms(), state.last_request_ms()]),
        };
        let mut body = String::from(FRAME_OPEN);
        if check == TokenCheck::Init {
            if let Some(key) = state.security.key_field() {
                body.push_str(&key);
            }
        }
        writer.write(&mut body, &mut state, request.root_id, &options)?;
        body.push_str(FRAME_CLOSE);

        state.post_paint(request.root_id);
        state.last_request_ms = elapsed_ms(started);
        Ok(UidlResponse::json(body))
    }

    /// Repaint-all message for a bootstrap page: `{...}` without the
    /// anti-hijacking frame, carrying the token when protection is on.
    ///
    /// # Errors
    ///
    /// Unknown root, poisoned session, or a response that could not be
    /// built.
    pub fn initial_uidl(&self, session: &Session, root_id: u32) -> Result<String, RequestError> {
        let config = self.config.load_full();
        let mut state = session.lock()?;
        let mut body = String::from("{");
        if let Some(key) = state.security.key_field() {
            body.push_str(&key);
        }
        let options = WriteOptions {
            repaint_all: true,
            ..WriteOptions::default()
        };
        self.writer(&config)
            .write(&mut body, &mut state, root_id, &options)?;
        body.push('}');
        state.post_paint(root_id);
        Ok(body)
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Serve a connector resource registered by this session's responses.
    ///
    /// # Errors
    ///
    /// [`RequestError::SessionPoisoned`]. Missing or forbidden names are a
    /// 404 response, not an error.
    pub fn serve_connector_resource(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<ResourceResponse, RequestError> {
        let config = self.config.load();
        let state = session.lock()?;
        Ok(serve(
            state.connector_resources(),
            &*self.resource_provider,
            name,
            config.resource_cache_time,
        ))
    }

    // ========================================================================
    // Uploads
    // ========================================================================

    /// Receive an upload posted to a stream variable's target URL.
    ///
    /// `content_type` with a `boundary=` parameter selects multipart
    /// parsing (first file part only); anything else is a raw stream.
    ///
    /// # Errors
    ///
    /// A malformed path, an unknown variable or a secret mismatch, or
    /// multipart headers that end early. Failures while streaming go to the
    /// sink and the error handler instead.
    pub fn handle_upload(
        &self,
        session: &Session,
        path: &str,
        content_type: Option<&str>,
        content_length: Option<u64>,
        mut body: impl BufRead,
    ) -> Result<UploadResponse, RequestError> {
        let _span = tracing::debug_span!("upload", path).entered();
        let target = UploadTarget::parse(path)?;
        let buffer_size = self.config.load().upload_buffer_size;

        let variable = {
            let mut state = session.lock()?;
            let root = state.root_mut(target.root_id)?;
            let Some((variable, secret)) = root.streams.get(&target.connector, &target.name) else {
                return Err(SecurityError::UnknownStreamVariable {
                    connector: target.connector,
                    variable: target.name,
                }
                .into());
            };
            if secret != target.secret {
                return Err(SecurityError::UploadSecretMismatch {
                    connector: target.connector,
                    variable: target.name,
                }
                .into());
            }
            let variable = Arc::clone(variable);

            let rejection = match root.tracker.get(&target.connector) {
                None => Some(UploadError::MissingOwner {
                    connector: target.connector.clone(),
                }),
                Some(owner)
                    if owner.is_read_only()
                        || !root.tracker.is_connector_enabled(&target.connector) =>
                {
                    Some(UploadError::ReadOnly {
                        connector: target.connector.clone(),
                    })
                }
                Some(_) => None,
            };
            if let Some(rejection) = rejection {
                tracing::warn!(connector = %target.connector, "{rejection}");
                self.report_upload_failure(&mut root.tracker, &target.connector, rejection);
                return Ok(UploadResponse::handled());
            }
            variable
        };

        let result = match content_type.and_then(multipart::boundary) {
            Some(boundary) => {
                let headers = read_part_headers(&mut body).map_err(UploadError::Read)?;
                let reader = PartReader::new(body, boundary);
                let content_length = content_length
                    .map(|len| len.saturating_sub(headers.consumed + reader.trailer_len()));
                let meta = UploadMeta {
                    filename: headers.filename,
                    mime_type: headers.mime_type,
                    content_length,
                };
                stream_to_receiver(session, &variable, reader, &meta, buffer_size)
            }
            None => {
                let meta = UploadMeta {
                    filename: UNKNOWN_UPLOAD_NAME.to_owned(),
                    mime_type: UNKNOWN_UPLOAD_NAME.to_owned(),
                    content_length,
                };
                stream_to_receiver(session, &variable, body, &meta, buffer_size)
            }
        };

        let mut state = session.lock()?;
        let root = state.root_mut(target.root_id)?;
        match result {
            Ok(true) => {
                root.streams.forget(&target.connector, &target.name);
            }
            Ok(false) => {}
            Err(err) => self.report_upload_failure(&mut root.tracker, &target.connector, err),
        }
        Ok(UploadResponse::handled())
    }

    fn report_upload_failure(
        &self,
        tracker: &mut ConnectorTracker,
        connector: &ConnectorId,
        err: UploadError,
    ) {
        let event = ErrorEvent::new(
            ErrorOrigin::Upload,
            Some(connector.clone()),
            HandlerError::with_source(err.to_string(), err),
        );
        route_error(tracker, &*self.errors, event);
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Debug console support: describe the highlighted connector and its
/// ancestors.
fn log_highlight(tracker: &ConnectorTracker, id: &ConnectorId) {
    let Some(connector) = tracker.get(id) else {
        tracing::info!(connector = %id, "highlighted connector is not attached");
        return;
    };
    let describe = |id: &ConnectorId| {
        tracker.get(id).map_or_else(
            || id.to_string(),
            |c| format!("{}({id})", c.connector_type().name()),
        )
    };
    let chain: Vec<String> = tracker.ancestors(id).map(describe).collect();
    tracing::info!(
        connector = %id,
        kind = connector.connector_type().name(),
        caption = connector.caption().unwrap_or(""),
        ancestors = %chain.join(" < "),
        "highlighted connector"
    );
}
