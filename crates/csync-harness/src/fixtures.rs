#![forbid(unsafe_code)]

//! Reference connectors, error handler and upload sink for integration
//! tests.
//!
//! The widget set is small: [`window`] (root), [`panel`], [`label`],
//! [`text_field`], [`button`], [`upload`] and [`legacy_layout`]. Every
//! component state carries `caption`, `visible`, `enabled` and `readOnly`,
//! and the connector flags read from there, so a test flips a flag with
//! `tracker.state_mut(id)`.

use std::io::{self, Write};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use csync_codec::{BeanType, ConnectorId, TypeDescriptor, Value};
use csync_core::{
    Capabilities, Connector, ConnectorType, ErrorEvent, ErrorHandler, ErrorOrigin, HandlerError,
    PaintError, PaintTarget, RpcContext, RpcMethod, RpcInterface, ServerRpcCall, SharedState,
    VariableChanges,
};
use csync_runtime::upload::{
    StreamVariable, StreamingEndEvent, StreamingErrorEvent, StreamingProgressEvent,
    StreamingStartEvent,
};

// ============================================================================
// Connector types
// ============================================================================

pub static ABSTRACT_COMPONENT: ConnectorType = ConnectorType::new("csync.ui.AbstractComponent");
pub static WINDOW: ConnectorType = ConnectorType::new("csync.ui.Window")
    .extends(&ABSTRACT_COMPONENT)
    .with_scripts(&["window.js"])
    .with_styles(&["connector://window.css"]);
pub static PANEL: ConnectorType = ConnectorType::new("csync.ui.Panel").extends(&ABSTRACT_COMPONENT);
pub static LABEL: ConnectorType = ConnectorType::new("csync.ui.Label").extends(&ABSTRACT_COMPONENT);
pub static TEXT_FIELD: ConnectorType = ConnectorType::new("csync.ui.TextField")
    .extends(&ABSTRACT_COMPONENT)
    .with_scripts(&["https://cdn.example.org/input-mask.js", "textfield.js"]);
pub static BUTTON: ConnectorType = ConnectorType::new("csync.ui.Button").extends(&ABSTRACT_COMPONENT);
pub static UPLOAD: ConnectorType = ConnectorType::new("csync.ui.Upload").extends(&ABSTRACT_COMPONENT);
pub static LEGACY_LAYOUT: ConnectorType = ConnectorType::new("csync.legacy.CustomLayout");

pub const BUTTON_SERVER_RPC: &str = "csync.ui.ButtonServerRpc";
pub const BUTTON_CLIENT_RPC: &str = "csync.ui.ButtonClientRpc";

static BUTTON_RPC: LazyLock<RpcInterface> =
    LazyLock::new(|| RpcInterface::new(BUTTON_SERVER_RPC).method("click", [TypeDescriptor::Int]));

fn component_state(name: &str) -> BeanType {
    BeanType::new(name)
        .property("caption", TypeDescriptor::String)
        .property_with_default("visible", TypeDescriptor::Bool, true)
        .property_with_default("enabled", TypeDescriptor::Bool, true)
        .property("readOnly", TypeDescriptor::Bool)
}

/// State shared by every fixture component.
struct Base {
    state: SharedState,
}

impl Base {
    fn new(ty: BeanType) -> Self {
        Self {
            state: SharedState::new(Arc::new(ty)),
        }
    }

    fn flag(&self, name: &str) -> bool {
        matches!(self.state.get(name), Some(Value::Bool(true)))
    }

    fn text(&self, name: &str) -> Option<&str> {
        match self.state.get(name) {
            Some(Value::String(text)) => Some(text),
            _ => None,
        }
    }

    /// Copy every change onto the state property of the same name.
    fn apply(&mut self, changes: &VariableChanges) -> Result<(), HandlerError> {
        for (name, value) in changes.iter() {
            self.state
                .set(name, value.clone())
                .map_err(|err| HandlerError::with_source(format!("unknown variable {name}"), err))?;
        }
        Ok(())
    }
}

macro_rules! component_basics {
    () => {
        fn is_visible(&self) -> bool {
            self.base.flag("visible")
        }
        fn is_enabled(&self) -> bool {
            self.base.flag("enabled")
        }
        fn is_read_only(&self) -> bool {
            self.base.flag("readOnly")
        }
        fn caption(&self) -> Option<&str> {
            self.base.text("caption")
        }
        fn state(&self) -> Option<&SharedState> {
            Some(&self.base.state)
        }
        fn state_mut(&mut self) -> Option<&mut SharedState> {
            Some(&mut self.base.state)
        }
    };
}

// ============================================================================
// Components
// ============================================================================

struct Window {
    base: Base,
}

/// Root window. Accepts the legacy `close` variable.
pub fn window(caption: &str) -> Box<dyn Connector> {
    let mut base = Base::new(
        component_state("csync.ui.WindowState").property("closed", TypeDescriptor::Bool),
    );
    let _ = base.state.set("caption", caption);
    Box::new(Window { base })
}

impl Connector for Window {
    fn connector_type(&self) -> &'static ConnectorType {
        &WINDOW
    }
    fn capabilities(&self) -> Capabilities {
        Capabilities::CONTAINER | Capabilities::ROOT | Capabilities::VARIABLE_OWNER
    }
    component_basics!();

    fn change_variables(
        &mut self,
        changes: &VariableChanges,
        _ctx: &mut RpcContext,
    ) -> Result<(), HandlerError> {
        match changes.get("close") {
            Some(Value::Bool(true)) => {
                self.base.state.set("closed", true)?;
                Ok(())
            }
            _ => self.base.apply(changes),
        }
    }
}

struct Panel {
    base: Base,
}

/// Container whose `collapsed` state hides every child.
pub fn panel() -> Box<dyn Connector> {
    Box::new(Panel {
        base: Base::new(
            component_state("csync.ui.PanelState").property("collapsed", TypeDescriptor::Bool),
        ),
    })
}

impl Connector for Panel {
    fn connector_type(&self) -> &'static ConnectorType {
        &PANEL
    }
    fn capabilities(&self) -> Capabilities {
        Capabilities::CONTAINER | Capabilities::VISIBILITY_CONTROLLED
    }
    component_basics!();

    fn is_child_visible(&self, _child: &ConnectorId) -> bool {
        !self.base.flag("collapsed")
    }
}

struct Label {
    base: Base,
}

pub fn label(text: &str) -> Box<dyn Connector> {
    let mut base = Base::new(
        component_state("csync.ui.LabelState").property("text", TypeDescriptor::String),
    );
    let _ = base.state.set("text", text);
    Box::new(Label { base })
}

impl Connector for Label {
    fn connector_type(&self) -> &'static ConnectorType {
        &LABEL
    }
    fn capabilities(&self) -> Capabilities {
        Capabilities::LEAF_COMPONENT
    }
    component_basics!();
}

struct TextField {
    base: Base,
}

/// Legacy variable owner: `text` and the common flags are writable.
pub fn text_field() -> Box<dyn Connector> {
    Box::new(TextField {
        base: Base::new(
            component_state("csync.ui.TextFieldState").property("text", TypeDescriptor::String),
        ),
    })
}

impl Connector for TextField {
    fn connector_type(&self) -> &'static ConnectorType {
        &TEXT_FIELD
    }
    fn capabilities(&self) -> Capabilities {
        Capabilities::LEAF_COMPONENT | Capabilities::VARIABLE_OWNER
    }
    component_basics!();

    fn change_variables(
        &mut self,
        changes: &VariableChanges,
        _ctx: &mut RpcContext,
    ) -> Result<(), HandlerError> {
        self.base.apply(changes)
    }
}

struct Button {
    base: Base,
    handles_errors: bool,
}

/// RPC target: `click(int)` adds to `clicks` and answers with
/// `ack(clicks)`. A negative count fails.
pub fn button() -> Box<dyn Connector> {
    Box::new(new_button(false))
}

/// A [`button`] that handles its own errors by recording them in
/// `lastError`.
pub fn button_handling_errors() -> Box<dyn Connector> {
    Box::new(new_button(true))
}

fn new_button(handles_errors: bool) -> Button {
    Button {
        base: Base::new(
            component_state("csync.ui.ButtonState")
                .property("clicks", TypeDescriptor::Int)
                .property("lastError", TypeDescriptor::String),
        ),
        handles_errors,
    }
}

impl Connector for Button {
    fn connector_type(&self) -> &'static ConnectorType {
        &BUTTON
    }
    fn capabilities(&self) -> Capabilities {
        let caps = Capabilities::LEAF_COMPONENT | Capabilities::RPC_TARGET;
        if self.handles_errors {
            caps | Capabilities::ERROR_HANDLER
        } else {
            caps
        }
    }
    component_basics!();

    fn rpc_method(&self, interface: &str, method: &str) -> Option<&RpcMethod> {
        (interface == BUTTON_SERVER_RPC)
            .then(|| BUTTON_RPC.find(method))
            .flatten()
    }

    fn invoke_rpc(&mut self, call: &ServerRpcCall, ctx: &mut RpcContext) -> Result<(), HandlerError> {
        let Some(Value::Int(count)) = call.params.first() else {
            return Err(HandlerError::new("click without a count"));
        };
        if *count < 0 {
            return Err(HandlerError::new(format!("negative click count {count}")));
        }
        let clicks = match self.base.state.get("clicks") {
            Some(Value::Int(clicks)) => clicks + count,
            _ => *count,
        };
        self.base.state.set("clicks", clicks)?;
        ctx.call_client(BUTTON_CLIENT_RPC, "ack")
            .push_param(TypeDescriptor::Int, clicks);
        Ok(())
    }

    fn handle_error(&mut self, event: &ErrorEvent) -> Result<bool, HandlerError> {
        self.base.state.set("lastError", event.error.message())?;
        Ok(true)
    }
}

struct Upload {
    base: Base,
}

/// Upload component; the sink is registered separately on the session.
pub fn upload() -> Box<dyn Connector> {
    Box::new(Upload {
        base: Base::new(component_state("csync.ui.UploadState")),
    })
}

impl Connector for Upload {
    fn connector_type(&self) -> &'static ConnectorType {
        &UPLOAD
    }
    fn capabilities(&self) -> Capabilities {
        Capabilities::LEAF_COMPONENT
    }
    component_basics!();
}

struct LegacyLayout {
    template: String,
}

/// Stateless legacy-painted container using the theme template
/// `layouts/<template>.html`.
pub fn legacy_layout(template: &str) -> Box<dyn Connector> {
    Box::new(LegacyLayout {
        template: template.to_owned(),
    })
}

impl Connector for LegacyLayout {
    fn connector_type(&self) -> &'static ConnectorType {
        &LEGACY_LAYOUT
    }
    fn capabilities(&self) -> Capabilities {
        Capabilities::COMPONENT | Capabilities::HAS_CHILDREN | Capabilities::LEGACY_PAINT
    }
    fn paint(&self, target: &mut PaintTarget) -> Result<(), PaintError> {
        target.add_attribute("template", self.template.as_str());
        target.add_variable("scrollTop", 0);
        target.use_resource(format!("layouts/{}.html", self.template));
        Ok(())
    }
}

// ============================================================================
// Error handler
// ============================================================================

/// One event seen by [`RecordingErrorHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub origin: ErrorOrigin,
    pub connector: Option<ConnectorId>,
    pub message: String,
}

/// Session error handler that keeps every event.
#[derive(Debug, Default)]
pub struct RecordingErrorHandler {
    records: Mutex<Vec<ErrorRecord>>,
}

impl RecordingErrorHandler {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorHandler for RecordingErrorHandler {
    fn error(&self, event: &ErrorEvent) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ErrorRecord {
                origin: event.origin,
                connector: event.connector.clone(),
                message: event.error.message().to_owned(),
            });
    }
}

// ============================================================================
// Upload sink
// ============================================================================

/// What a [`MemorySink`] was told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Started {
        filename: String,
        mime_type: String,
        content_length: Option<u64>,
    },
    Progress(u64),
    Finished(u64),
    Interrupted(u64),
    Failed(String),
}

/// Collects the body in memory and records every callback.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    data: Arc<Mutex<Vec<u8>>>,
    events: Arc<Mutex<Vec<SinkEvent>>>,
    interrupt_after: Option<u64>,
    dispose: bool,
    received: u64,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask to stop once at least `bytes` were received.
    #[must_use]
    pub fn interrupt_after(mut self, bytes: u64) -> Self {
        self.interrupt_after = Some(bytes);
        self
    }

    /// Dispose the registration when the upload starts.
    #[must_use]
    pub fn disposing(mut self) -> Self {
        self.dispose = true;
        self
    }

    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn record(&self, event: SinkEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StreamVariable for MemorySink {
    fn streaming_started(&mut self, event: &mut StreamingStartEvent) {
        self.record(SinkEvent::Started {
            filename: event.filename.clone(),
            mime_type: event.mime_type.clone(),
            content_length: event.content_length,
        });
        if self.dispose {
            event.dispose_stream_variable();
        }
    }

    fn output(&mut self) -> Option<Box<dyn Write + Send>> {
        Some(Box::new(SharedBuffer(Arc::clone(&self.data))))
    }

    fn listen_progress(&self) -> bool {
        self.interrupt_after.is_some()
    }

    fn on_progress(&mut self, event: &StreamingProgressEvent) {
        self.received = event.bytes_received;
        self.record(SinkEvent::Progress(event.bytes_received));
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt_after.is_some_and(|limit| self.received >= limit)
    }

    fn streaming_finished(&mut self, event: &StreamingEndEvent) {
        self.record(SinkEvent::Finished(event.bytes_received));
    }

    fn streaming_failed(&mut self, event: &StreamingErrorEvent<'_>) {
        self.record(SinkEvent::Failed(event.error.to_string()));
    }

    fn streaming_interrupted(&mut self, event: &StreamingEndEvent) {
        self.record(SinkEvent::Interrupted(event.bytes_received));
    }
}
