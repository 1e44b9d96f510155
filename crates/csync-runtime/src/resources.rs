#![forbid(unsafe_code)]

//! Connector resources: script and style dependencies of connector types,
//! theme text resources, and serving registered files back to the client.
//!
//! # Invariants
//!
//! 1. **Registered only**: [`serve`] answers 404 for any name no connector
//!    type declared.
//! 2. **First registration wins**: a name declared by two types resolves
//!    against the first one.
//! 3. **No traversal**: names starting with `/` or with a `..` segment are
//!    rejected before the registry is consulted.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unregistered name | Guessing client | 404 + `warn!` |
//! | Traversal attempt | Hostile client | 404 + `warn!` |
//! | Declared file missing | Packaging bug | 404 + `warn!` with expected path |
//! | Read error | I/O failure | 404 + `warn!` |

use std::io;
use std::path::PathBuf;

use ahash::AHashMap;
use csync_core::ConnectorType;

/// Scheme of resources served through [`serve`].
pub const CONNECTOR_PROTOCOL_PREFIX: &str = "connector://";

/// Names accepted by [`serve`], each with the type that declared it.
#[derive(Debug, Clone, Default)]
pub struct ConnectorResources {
    contexts: AHashMap<String, &'static ConnectorType>,
}

impl ConnectorResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a dependency URI declared by `context`.
    ///
    /// `connector://` URIs and bare paths are registered and returned as
    /// `connector:///name`; absolute URLs pass through untouched.
    pub fn register(&mut self, uri: &str, context: &'static ConnectorType) -> String {
        let name = if let Some(rest) = uri.strip_prefix(CONNECTOR_PROTOCOL_PREFIX) {
            rest.trim_start_matches('/')
        } else if has_scheme(uri) || uri.starts_with("//") {
            return uri.to_owned();
        } else {
            uri
        };

        match self.contexts.get(name) {
            Some(existing) if *existing != context => {
                tracing::warn!(
                    resource = name,
                    defined_by = context.name(),
                    used = existing.name(),
                    "resource defined by two connector types; keeping the first"
                );
            }
            Some(_) => {}
            None => {
                self.contexts.insert(name.to_owned(), context);
            }
        }
        format!("{CONNECTOR_PROTOCOL_PREFIX}/{name}")
    }

    #[must_use]
    pub fn context(&self, name: &str) -> Option<&'static ConnectorType> {
        self.contexts.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

fn has_scheme(uri: &str) -> bool {
    let Some((scheme, _)) = uri.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Loads connector resource files.
pub trait ResourceProvider: Send + Sync {
    /// Bytes of `name` relative to `context`, `Ok(None)` if absent.
    ///
    /// # Errors
    ///
    /// Any I/O failure other than absence.
    fn open(&self, context: &'static ConnectorType, name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Resolves `name` under `root/<package path of the type>/`.
#[derive(Debug, Clone)]
pub struct DirectoryResourceProvider {
    root: PathBuf,
}

impl DirectoryResourceProvider {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn path_for(&self, context: &ConnectorType, name: &str) -> PathBuf {
        self.root.join(context.package_path()).join(name)
    }
}

impl ResourceProvider for DirectoryResourceProvider {
    fn open(&self, context: &'static ConnectorType, name: &str) -> io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(context, name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Serves nothing; every registered resource is reported missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResources;

impl ResourceProvider for NoResources {
    fn open(&self, _context: &'static ConnectorType, _name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Text resources of the active theme, inlined into responses on request of
/// legacy paint.
pub trait ThemeResourceProvider: Send + Sync {
    fn theme_resource(&self, theme: &str, name: &str) -> Option<String>;
}

/// A theme with no text resources.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoThemeResources;

impl ThemeResourceProvider for NoThemeResources {
    fn theme_resource(&self, _theme: &str, _name: &str) -> Option<String> {
        None
    }
}

/// Outcome of [`serve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResponse {
    pub status: u16,
    pub content_type: Option<&'static str>,
    /// `Cache-Control: max-age` for successful responses.
    pub cache_seconds: Option<u32>,
    pub body: Vec<u8>,
}

impl ResourceResponse {
    fn not_found(name: &str) -> Self {
        Self {
            status: 404,
            content_type: None,
            cache_seconds: None,
            body: name.as_bytes().to_vec(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Serve a registered connector resource.
pub fn serve(
    resources: &ConnectorResources,
    provider: &dyn ResourceProvider,
    name: &str,
    cache_time: u32,
) -> ResourceResponse {
    if name.starts_with('/') || name.split(['/', '\\']).any(|segment| segment == "..") {
        tracing::warn!(resource = name, "connector resource request rejected");
        return ResourceResponse::not_found(name);
    }
    let Some(context) = resources.context(name) else {
        tracing::warn!(
            resource = name,
            "connector resource request for unknown resource rejected"
        );
        return ResourceResponse::not_found(name);
    };

    match provider.open(context, name) {
        Ok(Some(body)) => ResourceResponse {
            status: 200,
            content_type: mime_type(name),
            cache_seconds: Some(cache_time),
            body,
        },
        Ok(None) => {
            tracing::warn!(
                resource = name,
                defined_by = context.name(),
                expected = %format!("{}/{name}", context.package_path()),
                "connector resource not found"
            );
            ResourceResponse::not_found(name)
        }
        Err(err) => {
            tracing::warn!(resource = name, %err, "failed to read connector resource");
            ResourceResponse::not_found(name)
        }
    }
}

/// Mime type guessed from the file extension.
#[must_use]
pub fn mime_type(name: &str) -> Option<&'static str> {
    mime_guess::from_path(name).first_raw()
}
