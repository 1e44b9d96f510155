#![forbid(unsafe_code)]

//! Connector identifiers and the lookup seam used when decoding references.

use core::fmt;

/// Session-unique identifier of a connector.
///
/// Ids are opaque strings on the wire. The tracker hands them out; the codec
/// only needs to compare them and to ask whether one is still attached.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectorId(String);

impl ConnectorId {
    /// Wrap a raw id string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as it appears on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectorId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ConnectorId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for ConnectorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Resolves connector ids while decoding.
///
/// Decoding a connector reference whose id is not attached yields `null`
/// rather than an error; the client may legitimately race a detach.
pub trait ConnectorLookup {
    /// Whether `id` names a connector that is currently attached.
    fn contains(&self, id: &ConnectorId) -> bool;
}

/// A lookup that knows no connectors. Useful for values that cannot contain
/// references (and in tests).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConnectors;

impl ConnectorLookup for NoConnectors {
    fn contains(&self, _id: &ConnectorId) -> bool {
        false
    }
}

impl<F> ConnectorLookup for F
where
    F: Fn(&ConnectorId) -> bool,
{
    fn contains(&self, id: &ConnectorId) -> bool {
        self(id)
    }
}
