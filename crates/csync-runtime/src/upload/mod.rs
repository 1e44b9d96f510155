#![forbid(unsafe_code)]

//! File uploads into stream variables.
//!
//! A connector that accepts uploads registers a [`StreamVariable`] under a
//! name and hands the resulting target URL to its client:
//!
//! ```text
//! app://APP/UPLOAD/<rootId>/<connectorId>/<name>/<secret>
//! ```
//!
//! The secret is generated per sink and reused while the same sink object
//! stays registered, so repainting a connector does not invalidate an upload
//! that is already in flight.
//!
//! # Invariants
//!
//! 1. **Secret per sink**: re-registering the same `Arc` keeps its secret;
//!    a different sink under the same name gets a new one.
//! 2. **Owner-bound**: registrations of connectors that left the tree are
//!    purged after the round trip that detached them.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Malformed path | Hand-crafted URL | [`UploadError::BadPath`] |
//! | Unknown variable / secret mismatch | Stale or forged URL | `SecurityError` |
//! | Owner gone / read-only | UI changed meanwhile | Error handler, upload ignored |
//! | Stream truncated | Client aborted | `streaming_failed`, error handler |

pub mod multipart;
pub mod stream;

use core::fmt;
use std::io;
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use csync_codec::ConnectorId;

use crate::security::new_secret;

pub use multipart::{PartHeaders, PartReader, read_part_headers};
pub use stream::{
    StreamVariable, StreamingEndEvent, StreamingErrorEvent, StreamingProgressEvent,
    StreamingStartEvent, UploadMeta, stream_to_receiver,
};

/// URL prefix of upload targets.
pub const UPLOAD_URL_PREFIX: &str = "app://APP/UPLOAD/";

/// Body of every upload response.
pub const UPLOAD_RESPONSE_BODY: &str = "<html><body>download handled</body></html>";

/// Filename and mime type reported for raw (non-multipart) posts.
pub const UNKNOWN_UPLOAD_NAME: &str = "unknown";

/// A stream variable shared between the application and the upload path.
pub type SharedStreamVariable = Arc<Mutex<dyn StreamVariable>>;

/// Failures while receiving an upload.
#[derive(Debug)]
pub enum UploadError {
    BadPath(String),
    MissingOwner {
        connector: ConnectorId,
    },
    ReadOnly {
        connector: ConnectorId,
    },
    /// The sink returned no output stream.
    NoOutputStream,
    Read(io::Error),
    Write(io::Error),
    /// The sink mutex was poisoned by an application panic.
    SinkPoisoned,
    SessionPoisoned,
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadPath(path) => write!(f, "malformed upload path {path:?}"),
            Self::MissingOwner { .. } => f.write_str(
                "File upload ignored because the connector for the stream variable was not found",
            ),
            Self::ReadOnly { .. } => {
                f.write_str("Warning: file upload ignored because the component was read-only")
            }
            Self::NoOutputStream => f.write_str("stream variable provided no output stream"),
            Self::Read(err) => write!(f, "reading upload failed: {err}"),
            Self::Write(err) => write!(f, "writing upload failed: {err}"),
            Self::SinkPoisoned => f.write_str("stream variable lock poisoned"),
            Self::SessionPoisoned => f.write_str("session lock poisoned"),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read(err) | Self::Write(err) => Some(err),
            _ => None,
        }
    }
}

/// The `<root>/<connector>/<name>/<secret>` part of an upload URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub root_id: u32,
    pub connector: ConnectorId,
    pub name: String,
    pub secret: String,
}

impl UploadTarget {
    /// Parse the path after [`UPLOAD_URL_PREFIX`] (the prefix itself, or any
    /// leading part up to `UPLOAD/`, is stripped).
    ///
    /// # Errors
    ///
    /// [`UploadError::BadPath`] unless the path has four segments and a
    /// numeric root id. The secret may contain `/`.
    pub fn parse(path: &str) -> Result<Self, UploadError> {
        let data = path
            .rsplit_once("UPLOAD/")
            .map_or(path, |(_, rest)| rest);
        let bad = || UploadError::BadPath(path.to_owned());
        let mut parts = data.splitn(4, '/');
        let (Some(root), Some(connector), Some(name), Some(secret)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(bad());
        };
        let root_id = root.parse().map_err(|_| bad())?;
        Ok(Self {
            root_id,
            connector: ConnectorId::new(connector),
            name: name.to_owned(),
            secret: secret.to_owned(),
        })
    }
}

struct Registration {
    variable: SharedStreamVariable,
    secret: String,
}

/// Stream variables of one root, by owner and name.
#[derive(Default)]
pub struct StreamVariableRegistry {
    owners: AHashMap<ConnectorId, AHashMap<String, Registration>>,
}

impl fmt::Debug for StreamVariableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamVariableRegistry")
            .field("owners", &self.owners.len())
            .field("variables", &self.len())
            .finish()
    }
}

impl StreamVariableRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `variable` as `name` of `owner` and return its secret.
    pub fn register(
        &mut self,
        owner: &ConnectorId,
        name: impl Into<String>,
        variable: SharedStreamVariable,
    ) -> String {
        let existing = self
            .owners
            .values()
            .flat_map(|names| names.values())
            .find(|r| Arc::ptr_eq(&r.variable, &variable))
            .map(|r| r.secret.clone());
        let secret = existing.unwrap_or_else(new_secret);
        self.owners.entry(owner.clone()).or_default().insert(
            name.into(),
            Registration {
                variable,
                secret: secret.clone(),
            },
        );
        secret
    }

    /// The variable and its secret.
    #[must_use]
    pub fn get(&self, owner: &ConnectorId, name: &str) -> Option<(&SharedStreamVariable, &str)> {
        self.owners
            .get(owner)?
            .get(name)
            .map(|r| (&r.variable, r.secret.as_str()))
    }

    /// Drop one registration. Returns whether it existed.
    pub fn forget(&mut self, owner: &ConnectorId, name: &str) -> bool {
        let Some(names) = self.owners.get_mut(owner) else {
            return false;
        };
        let removed = names.remove(name).is_some();
        if names.is_empty() {
            self.owners.remove(owner);
        }
        removed
    }

    /// Drop registrations of owners for which `attached` is false. Returns
    /// the number of owners purged.
    pub fn purge(&mut self, attached: impl Fn(&ConnectorId) -> bool) -> usize {
        let before = self.owners.len();
        self.owners.retain(|owner, _| attached(owner));
        before - self.owners.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.values().map(|names| names.len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Target URL for a registration.
#[must_use]
pub fn target_url(root_id: u32, owner: &ConnectorId, name: &str, secret: &str) -> String {
    format!("{UPLOAD_URL_PREFIX}{root_id}/{owner}/{name}/{secret}")
}

/// What the upload endpoint answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub content_type: &'static str,
    pub body: &'static str,
}

impl UploadResponse {
    #[must_use]
    pub fn handled() -> Self {
        Self {
            content_type: "text/html",
            body: UPLOAD_RESPONSE_BODY,
        }
    }
}

/// Strip any `/` or `\` path prefix a browser sent along with the filename.
#[must_use]
pub fn strip_path(filename: &str) -> &str {
    filename
        .rsplit_once(|c: char| matches!(c, '/' | '\\'))
        .map_or(filename, |(_, name)| name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Discard;

    impl StreamVariable for Discard {
        fn output(&mut self) -> Option<Box<dyn Write + Send>> {
            Some(Box::new(io::sink()))
        }
        fn streaming_finished(&mut self, _event: &StreamingEndEvent) {}
        fn streaming_failed(&mut self, _event: &StreamingErrorEvent<'_>) {}
    }

    fn sink() -> SharedStreamVariable {
        Arc::new(Mutex::new(Discard))
    }

    #[test]
    fn parse_target() {
        let target = UploadTarget::parse("app://APP/UPLOAD/0/12/file/abc-def").unwrap();
        assert_eq!(target.root_id, 0);
        assert_eq!(target.connector.as_str(), "12");
        assert_eq!(target.name, "file");
        assert_eq!(target.secret, "abc-def");

        let slashed = UploadTarget::parse("3/1/f/a/b").unwrap();
        assert_eq!(slashed.secret, "a/b");

        assert!(matches!(
            UploadTarget::parse("0/12/file"),
            Err(UploadError::BadPath(_))
        ));
        assert!(UploadTarget::parse("x/12/file/s").is_err());
    }

    #[test]
    fn secret_follows_the_sink() {
        let mut registry = StreamVariableRegistry::new();
        let owner = ConnectorId::new("4");
        let first = sink();
        let secret = registry.register(&owner, "file", Arc::clone(&first));
        assert_eq!(registry.register(&owner, "file", Arc::clone(&first)), secret);

        let other = registry.register(&owner, "file", sink());
        assert_ne!(other, secret);
        assert_eq!(registry.get(&owner, "file").map(|(_, s)| s), Some(other.as_str()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn forget_and_purge() {
        let mut registry = StreamVariableRegistry::new();
        let kept = ConnectorId::new("1");
        let gone = ConnectorId::new("2");
        registry.register(&kept, "a", sink());
        registry.register(&kept, "b", sink());
        registry.register(&gone, "a", sink());

        assert!(registry.forget(&kept, "b"));
        assert!(!registry.forget(&kept, "b"));
        assert_eq!(registry.purge(|id| *id == kept), 1);
        assert!(registry.get(&gone, "a").is_none());
        assert!(registry.get(&kept, "a").is_some());
    }

    #[test]
    fn url_shape() {
        assert_eq!(
            target_url(2, &ConnectorId::new("9"), "upload", "s3cr3t"),
            "app://APP/UPLOAD/2/9/upload/s3cr3t"
        );
    }

    #[test]
    fn path_is_stripped() {
        assert_eq!(strip_path(r"C:\Users\me\report.pdf"), "report.pdf");
        assert_eq!(strip_path("/tmp/a/b.txt"), "b.txt");
        assert_eq!(strip_path("plain.txt"), "plain.txt");
    }

    #[test]
    fn error_messages() {
        let missing = UploadError::MissingOwner {
            connector: "3".into(),
        };
        assert_eq!(
            missing.to_string(),
            "File upload ignored because the connector for the stream variable was not found"
        );
    }
}
