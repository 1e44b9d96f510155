#![forbid(unsafe_code)]

//! RPC signatures, calls in both directions, and the handler context.

use core::fmt;

use csync_codec::{ConnectorId, TypeDescriptor, Value};

use crate::tracker::ConnectorTracker;

/// Declared signature of one RPC method.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcMethod {
    pub interface: String,
    pub name: String,
    pub params: Vec<TypeDescriptor>,
}

/// A named set of RPC methods.
///
/// ```
/// use csync_core::rpc::RpcInterface;
/// use csync_codec::TypeDescriptor;
///
/// let rpc = RpcInterface::new("org.example.ButtonServerRpc")
///     .method("click", [TypeDescriptor::Int, TypeDescriptor::Int]);
/// assert_eq!(rpc.find("click").map(|m| m.params.len()), Some(2));
/// assert!(rpc.find("hover").is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RpcInterface {
    name: String,
    methods: Vec<RpcMethod>,
}

impl RpcInterface {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn method(
        mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = TypeDescriptor>,
    ) -> Self {
        self.methods.push(RpcMethod {
            interface: self.name.clone(),
            name: name.into(),
            params: params.into_iter().collect(),
        });
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn find(&self, method: &str) -> Option<&RpcMethod> {
        self.methods.iter().find(|m| m.name == method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &RpcMethod> {
        self.methods.iter()
    }
}

/// A decoded client-to-server RPC call.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRpcCall {
    pub connector_id: ConnectorId,
    pub interface: String,
    pub method: String,
    pub params: Vec<Value>,
}

/// A server-to-client call waiting for the next response.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRpcCall {
    pub connector_id: ConnectorId,
    pub interface: String,
    pub method: String,
    pub param_types: Vec<TypeDescriptor>,
    pub params: Vec<Value>,
    pub(crate) sequence: u64,
}

impl ClientRpcCall {
    #[must_use]
    pub fn new(
        connector_id: ConnectorId,
        interface: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            connector_id,
            interface: interface.into(),
            method: method.into(),
            param_types: Vec::new(),
            params: Vec::new(),
            sequence: 0,
        }
    }

    /// Append a parameter with its declared type.
    #[must_use]
    pub fn param(mut self, ty: TypeDescriptor, value: impl Into<Value>) -> Self {
        self.param_types.push(ty);
        self.params.push(value.into());
        self
    }

    /// In-place variant of [`param`](Self::param) for calls queued through
    /// [`RpcContext::call_client`].
    pub fn push_param(&mut self, ty: TypeDescriptor, value: impl Into<Value>) -> &mut Self {
        self.param_types.push(ty);
        self.params.push(value.into());
        self
    }

    /// Session-wide enqueue order; assigned by the tracker.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

type Deferred = Box<dyn FnOnce(&mut ConnectorTracker)>;

/// Side effects a handler requests while it holds `&mut` to its connector.
///
/// Outgoing client calls are queued on their connectors and deferred
/// closures run against the tracker once the handler returns, in the order
/// they were requested.
pub struct RpcContext {
    target: ConnectorId,
    outbound: Vec<ClientRpcCall>,
    deferred: Vec<Deferred>,
}

impl RpcContext {
    #[must_use]
    pub fn new(target: ConnectorId) -> Self {
        Self {
            target,
            outbound: Vec::new(),
            deferred: Vec::new(),
        }
    }

    /// The connector the current invocation is addressed to.
    #[must_use]
    pub fn target(&self) -> &ConnectorId {
        &self.target
    }

    /// Queue a call to the target's client counterpart.
    pub fn call_client(&mut self, interface: &str, method: &str) -> &mut ClientRpcCall {
        let call = ClientRpcCall::new(self.target.clone(), interface, method);
        self.call(call)
    }

    /// Queue a prepared call, possibly for another connector.
    pub fn call(&mut self, call: ClientRpcCall) -> &mut ClientRpcCall {
        self.outbound.push(call);
        let last = self.outbound.len() - 1;
        &mut self.outbound[last]
    }

    /// Run `f` against the tracker after the handler returns.
    pub fn defer(&mut self, f: impl FnOnce(&mut ConnectorTracker) + 'static) {
        self.deferred.push(Box::new(f));
    }

    pub(crate) fn into_effects(self) -> (Vec<ClientRpcCall>, Vec<Deferred>) {
        (self.outbound, self.deferred)
    }
}

impl fmt::Debug for RpcContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcContext")
            .field("target", &self.target)
            .field("outbound", &self.outbound.len())
            .field("deferred", &self.deferred.len())
            .finish()
    }
}
