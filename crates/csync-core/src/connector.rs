#![forbid(unsafe_code)]

//! Connector types and the [`Connector`] trait.
//!
//! A connector is the server half of a client widget or extension. The
//! engine talks to it only through this trait; everything beyond identity
//! and capabilities has a default so simple connectors stay small.
//!
//! # Invariants
//!
//! 1. **Static type metadata**: a [`ConnectorType`] is a `'static` value;
//!    its canonical name is its identity for tagging and equality.
//! 2. **Acyclic inheritance**: `supertype` chains terminate (they are built
//!    from `&'static` references, so a cycle cannot be constructed in const
//!    context).
//! 3. **Handlers report, never panic**: RPC, variable and paint hooks return
//!    `Result`; errors are routed by the dispatcher, not unwound.

use core::fmt;
use core::hash::{Hash, Hasher};

use csync_codec::ConnectorId;

use crate::capability::Capabilities;
use crate::error::{ErrorEvent, HandlerError, PaintError};
use crate::invocation::VariableChanges;
use crate::paint::PaintTarget;
use crate::rpc::{RpcContext, RpcMethod, ServerRpcCall};
use crate::state::SharedState;

/// Static description of a connector class.
///
/// ```
/// use csync_core::ConnectorType;
///
/// static COMPONENT: ConnectorType = ConnectorType::new("org.example.AbstractComponent");
/// static BUTTON: ConnectorType = ConnectorType::new("org.example.Button")
///     .extends(&COMPONENT)
///     .with_scripts(&["connector://button.js"]);
///
/// assert_eq!(BUTTON.depth(), 1);
/// assert_eq!(BUTTON.supertype().map(|t| t.name()), Some("org.example.AbstractComponent"));
/// ```
pub struct ConnectorType {
    name: &'static str,
    supertype: Option<&'static ConnectorType>,
    scripts: &'static [&'static str],
    styles: &'static [&'static str],
}

impl ConnectorType {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            supertype: None,
            scripts: &[],
            styles: &[],
        }
    }

    /// Declare the connector supertype.
    #[must_use]
    pub const fn extends(mut self, parent: &'static ConnectorType) -> Self {
        self.supertype = Some(parent);
        self
    }

    /// Script dependencies, as `connector://` URIs, bare paths or absolute URLs.
    #[must_use]
    pub const fn with_scripts(mut self, scripts: &'static [&'static str]) -> Self {
        self.scripts = scripts;
        self
    }

    /// Stylesheet dependencies, same forms as scripts.
    #[must_use]
    pub const fn with_styles(mut self, styles: &'static [&'static str]) -> Self {
        self.styles = styles;
        self
    }

    /// Canonical name; the identity of the type.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub const fn supertype(&self) -> Option<&'static ConnectorType> {
        self.supertype
    }

    #[must_use]
    pub const fn scripts(&self) -> &'static [&'static str] {
        self.scripts
    }

    #[must_use]
    pub const fn styles(&self) -> &'static [&'static str] {
        self.styles
    }

    /// Number of connector supertypes above this type.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Supertypes, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = &'static ConnectorType> {
        core::iter::successors(self.supertype, |ty| ty.supertype)
    }

    /// Package path of the canonical name (`org.example.Button` → `org/example`).
    #[must_use]
    pub fn package_path(&self) -> String {
        self.name
            .rsplit_once('.')
            .map(|(package, _)| package.replace('.', "/"))
            .unwrap_or_default()
    }
}

impl PartialEq for ConnectorType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ConnectorType {}

impl Hash for ConnectorType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorType")
            .field("name", &self.name)
            .field("supertype", &self.supertype.map(ConnectorType::name))
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Server-side half of a synchronized widget or extension.
///
/// Only [`connector_type`](Connector::connector_type) and
/// [`capabilities`](Connector::capabilities) are required.
pub trait Connector: Send + 'static {
    fn connector_type(&self) -> &'static ConnectorType;

    fn capabilities(&self) -> Capabilities;

    /// The component's own visibility flag.
    fn is_visible(&self) -> bool {
        true
    }

    /// The component's own enabled flag.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Read-only components reject uploads.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Caption, for diagnostics.
    fn caption(&self) -> Option<&str> {
        None
    }

    fn state(&self) -> Option<&SharedState> {
        None
    }

    fn state_mut(&mut self) -> Option<&mut SharedState> {
        None
    }

    /// Called for every dirty visible connector right before its state is
    /// encoded. `initial` is true on full repaints.
    fn before_client_response(&mut self, _initial: bool) {}

    /// Consulted only when this connector has
    /// [`Capabilities::VISIBILITY_CONTROLLED`].
    fn is_child_visible(&self, _child: &ConnectorId) -> bool {
        true
    }

    /// Declared signature of a server RPC method.
    fn rpc_method(&self, _interface: &str, _method: &str) -> Option<&RpcMethod> {
        None
    }

    fn invoke_rpc(
        &mut self,
        call: &ServerRpcCall,
        _ctx: &mut RpcContext,
    ) -> Result<(), HandlerError> {
        Err(HandlerError::new(format!(
            "{} does not implement {}.{}",
            self.connector_type(),
            call.interface,
            call.method
        )))
    }

    fn change_variables(
        &mut self,
        _changes: &VariableChanges,
        _ctx: &mut RpcContext,
    ) -> Result<(), HandlerError> {
        Err(HandlerError::new(format!(
            "{} does not accept variable changes",
            self.connector_type()
        )))
    }

    /// Handle an error raised by one of this connector's invocations.
    /// `Ok(true)` means handled; an `Err` is itself reported upward.
    fn handle_error(&mut self, _event: &ErrorEvent) -> Result<bool, HandlerError> {
        Ok(false)
    }

    /// Legacy paint output for connectors with [`Capabilities::LEGACY_PAINT`].
    fn paint(&self, _target: &mut PaintTarget) -> Result<(), PaintError> {
        Ok(())
    }
}
