#![forbid(unsafe_code)]

//! Error types shared by connectors and the engine, and the session-level
//! error handler seam.

use core::fmt;
use std::error::Error;

use csync_codec::{CodecError, ConnectorId};

use crate::invocation::VariableChanges;

/// Failure reported by a connector handler.
#[derive(Debug)]
pub struct HandlerError {
    message: String,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl HandlerError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for HandlerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn Error + 'static))
    }
}

impl From<StateError> for HandlerError {
    fn from(err: StateError) -> Self {
        Self::with_source(err.to_string(), err)
    }
}

/// A shared-state write its declared type does not allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    UnknownProperty { bean: String, name: String },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownProperty { bean, name } => {
                write!(f, "{bean} declares no property {name}")
            }
        }
    }
}

impl Error for StateError {}

/// Structural errors from the connector tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    UnknownConnector(ConnectorId),
    RootAlreadySet(ConnectorId),
    CannotDetachRoot(ConnectorId),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownConnector(id) => write!(f, "no connector with id {id}"),
            Self::RootAlreadySet(id) => write!(f, "tree already has root {id}"),
            Self::CannotDetachRoot(id) => write!(f, "root connector {id} cannot be detached"),
        }
    }
}

impl Error for TreeError {}

/// Response construction failed; nothing was emitted.
#[derive(Debug)]
pub enum PaintError {
    Codec {
        connector: Option<ConnectorId>,
        source: CodecError,
    },
    Connector {
        connector: ConnectorId,
        message: String,
    },
}

impl PaintError {
    #[must_use]
    pub fn connector(connector: ConnectorId, message: impl Into<String>) -> Self {
        Self::Connector {
            connector,
            message: message.into(),
        }
    }
}

impl From<CodecError> for PaintError {
    fn from(source: CodecError) -> Self {
        Self::Codec {
            connector: None,
            source,
        }
    }
}

impl fmt::Display for PaintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec {
                connector: Some(id),
                source,
            } => write!(f, "failed to encode connector {id}: {source}"),
            Self::Codec {
                connector: None,
                source,
            } => write!(f, "failed to encode response: {source}"),
            Self::Connector { connector, message } => {
                write!(f, "connector {connector} failed to paint: {message}")
            }
        }
    }
}

impl Error for PaintError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Codec { source, .. } => Some(source),
            Self::Connector { .. } => None,
        }
    }
}

/// Where an [`ErrorEvent`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// An RPC or variable-change handler failed.
    Invocation,
    /// A connector's own error handler failed while handling another error.
    ErrorHandler,
    /// An upload could not be delivered or failed mid-stream.
    Upload,
}

/// An application error on its way to a handler.
#[derive(Debug)]
pub struct ErrorEvent {
    pub origin: ErrorOrigin,
    pub connector: Option<ConnectorId>,
    pub error: HandlerError,
    /// The variable changes being applied, for legacy invocations.
    pub variables: Option<VariableChanges>,
}

impl ErrorEvent {
    #[must_use]
    pub fn new(origin: ErrorOrigin, connector: Option<ConnectorId>, error: HandlerError) -> Self {
        Self {
            origin,
            connector,
            error,
            variables: None,
        }
    }

    #[must_use]
    pub fn with_variables(mut self, variables: VariableChanges) -> Self {
        self.variables = Some(variables);
        self
    }
}

/// Session-level sink for errors nothing else handled.
pub trait ErrorHandler: Send + Sync {
    fn error(&self, event: &ErrorEvent);
}

/// Logs every event at `error` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn error(&self, event: &ErrorEvent) {
        let connector = event.connector.as_ref().map(ConnectorId::as_str);
        tracing::error!(
            origin = ?event.origin,
            connector,
            error = %event.error,
            "unhandled application error"
        );
    }
}
