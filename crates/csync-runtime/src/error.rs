#![forbid(unsafe_code)]

//! Request-level errors.
//!
//! A [`RequestError`] means the response was not produced. Invocation and
//! application errors never surface here; they are logged or routed to the
//! error handler while the request carries on.

use core::fmt;
use std::error::Error;

use csync_core::PaintError;
use csync_core::error::TreeError;

use crate::decode::ParseError;
use crate::security::SecurityError;
use crate::upload::UploadError;

/// The client sent something the protocol does not allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    Parse(ParseError),
    Security(SecurityError),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "protocol error: {err}"),
            Self::Security(err) => write!(f, "security error: {err}"),
        }
    }
}

impl Error for ProtocolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Security(err) => Some(err),
        }
    }
}

impl From<ParseError> for ProtocolError {
    fn from(err: ParseError) -> Self {
        Self::Parse(err)
    }
}

impl From<SecurityError> for ProtocolError {
    fn from(err: SecurityError) -> Self {
        Self::Security(err)
    }
}

/// Session bookkeeping failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    UnknownRoot(u32),
    Tree(TreeError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownRoot(id) => write!(f, "session has no root {id}"),
            Self::Tree(err) => write!(f, "connector tree error: {err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::UnknownRoot(_) => None,
            Self::Tree(err) => Some(err),
        }
    }
}

impl From<TreeError> for SessionError {
    fn from(err: TreeError) -> Self {
        Self::Tree(err)
    }
}

/// Why a request produced no response.
#[derive(Debug)]
pub enum RequestError {
    Protocol(ProtocolError),
    Paint(PaintError),
    Session(SessionError),
    /// A previous request panicked while holding the session lock.
    SessionPoisoned,
    Upload(UploadError),
}

impl RequestError {
    /// Whether the client should be told its request was refused, as opposed
    /// to the server failing.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Session(SessionError::UnknownRoot(_)))
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(err) => err.fmt(f),
            Self::Paint(err) => write!(f, "response construction failed: {err}"),
            Self::Session(err) => err.fmt(f),
            Self::SessionPoisoned => f.write_str("session lock poisoned"),
            Self::Upload(err) => write!(f, "upload failed: {err}"),
        }
    }
}

impl Error for RequestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Protocol(err) => Some(err),
            Self::Paint(err) => Some(err),
            Self::Session(err) => Some(err),
            Self::SessionPoisoned => None,
            Self::Upload(err) => Some(err),
        }
    }
}

impl From<ProtocolError> for RequestError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err)
    }
}

impl From<ParseError> for RequestError {
    fn from(err: ParseError) -> Self {
        Self::Protocol(ProtocolError::Parse(err))
    }
}

impl From<SecurityError> for RequestError {
    fn from(err: SecurityError) -> Self {
        Self::Protocol(ProtocolError::Security(err))
    }
}

impl From<PaintError> for RequestError {
    fn from(err: PaintError) -> Self {
        Self::Paint(err)
    }
}

impl From<SessionError> for RequestError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<UploadError> for RequestError {
    fn from(err: UploadError) -> Self {
        Self::Upload(err)
    }
}
