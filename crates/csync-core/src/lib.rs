#![forbid(unsafe_code)]

//! Connector model for csync.
//!
//! This crate holds the server-side half of the synchronization protocol
//! that does not depend on the wire: connector types and capabilities, the
//! [`Connector`] trait, shared state, RPC signatures, decoded invocations,
//! and the [`ConnectorTracker`] arena that decides what is dirty and what
//! the client can see.

pub mod capability;
pub mod connector;
pub mod error;
pub mod invocation;
pub mod paint;
pub mod rpc;
pub mod state;
pub mod tracker;

pub use capability::Capabilities;
pub use connector::{Connector, ConnectorType};
pub use csync_codec::{ConnectorId, ConnectorLookup};
pub use error::{
    ErrorEvent, ErrorHandler, ErrorOrigin, HandlerError, LoggingErrorHandler, PaintError, StateError,
    TreeError,
};
pub use invocation::{LegacyChangeVariables, MethodInvocation, VariableChanges};
pub use paint::PaintTarget;
pub use rpc::{ClientRpcCall, RpcContext, RpcInterface, RpcMethod, ServerRpcCall};
pub use state::SharedState;
pub use tracker::ConnectorTracker;
