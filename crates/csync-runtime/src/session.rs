#![forbid(unsafe_code)]

//! Per-session state behind one lock.
//!
//! A session owns one connector tree per root (browser window or tab) and
//! everything that must survive between round trips: type tags, the
//! security token, queued locales, registered connector resources.
//!
//! # Invariants
//!
//! 1. **Serialized requests**: every request of a session runs under
//!    [`Session::lock`], from parse to the last byte of the response.
//! 2. **Per-root client cache**: each root's client knows its own set of
//!    types; tags are shared across roots.
//! 3. **Closed is final**: once [`SessionState::close`] is called, every
//!    further request is answered with a redirect.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use csync_codec::ConnectorId;
use csync_core::error::TreeError;
use csync_core::{Connector, ConnectorTracker};
use web_time::Instant;

use crate::client_cache::{ClientCache, TypeRegistry};
use crate::config::DeploymentConfig;
use crate::error::{RequestError, SessionError};
use crate::locale::{PendingLocales, detect_system_locale};
use crate::resources::ConnectorResources;
use crate::security::SecurityGuard;
use crate::upload::{SharedStreamVariable, StreamVariableRegistry, target_url};

/// One root's connector tree and what its client knows.
#[derive(Debug, Default)]
pub struct RootState {
    pub tracker: ConnectorTracker,
    pub cache: ClientCache,
    pub streams: StreamVariableRegistry,
}

/// Everything a session keeps between requests.
#[derive(Debug)]
pub struct SessionState {
    pub(crate) roots: BTreeMap<u32, RootState>,
    next_root: u32,
    pub(crate) types: TypeRegistry,
    pub(crate) security: SecurityGuard,
    pub(crate) locales: PendingLocales,
    pub(crate) resources: ConnectorResources,
    /// Timeout last sent in a `timedRedirect`.
    pub(crate) timeout_sent: Option<u32>,
    session_timeout_secs: u32,
    locale: String,
    running: bool,
    logout_url: Option<String>,
    created: Instant,
    pub(crate) last_request_ms: u64,
}

impl SessionState {
    fn new(config: &DeploymentConfig) -> Self {
        let locale = config
            .default_locale
            .clone()
            .unwrap_or_else(detect_system_locale);
        let mut locales = PendingLocales::new();
        locales.require(&locale);
        Self {
            roots: BTreeMap::new(),
            next_root: 0,
            types: TypeRegistry::new(),
            security: SecurityGuard::new(config.xsrf_protection),
            locales,
            resources: ConnectorResources::new(),
            timeout_sent: None,
            session_timeout_secs: config.session_timeout_secs,
            locale,
            running: true,
            logout_url: config.logout_url.clone(),
            created: Instant::now(),
            last_request_ms: 0,
        }
    }

    // ========================================================================
    // Roots
    // ========================================================================

    /// Create a new root with `connector` at its top. Returns the root id.
    ///
    /// # Errors
    ///
    /// Never fails for a fresh tracker; the tree error is passed through.
    pub fn add_root(&mut self, connector: Box<dyn Connector>) -> Result<u32, SessionError> {
        let mut root = RootState::default();
        root.tracker.set_root(connector)?;
        let id = self.next_root;
        self.next_root += 1;
        self.roots.insert(id, root);
        tracing::debug!(root = id, "root added");
        Ok(id)
    }

    /// # Errors
    ///
    /// [`SessionError::UnknownRoot`].
    pub fn root(&self, id: u32) -> Result<&RootState, SessionError> {
        self.roots.get(&id).ok_or(SessionError::UnknownRoot(id))
    }

    /// # Errors
    ///
    /// [`SessionError::UnknownRoot`].
    pub fn root_mut(&mut self, id: u32) -> Result<&mut RootState, SessionError> {
        self.roots.get_mut(&id).ok_or(SessionError::UnknownRoot(id))
    }

    /// Drop a root and everything attached to it.
    pub fn remove_root(&mut self, id: u32) -> Option<RootState> {
        self.roots.remove(&id)
    }

    pub fn root_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.roots.keys().copied()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// End the application; later requests get a redirect to `logout_url`
    /// (or the configured one when `None`).
    pub fn close(&mut self, logout_url: Option<String>) {
        self.running = false;
        if logout_url.is_some() {
            self.logout_url = logout_url;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn logout_url(&self) -> Option<&str> {
        self.logout_url.as_deref()
    }

    #[must_use]
    pub fn session_timeout_secs(&self) -> u32 {
        self.session_timeout_secs
    }

    pub fn set_session_timeout(&mut self, secs: u32) {
        self.session_timeout_secs = secs;
    }

    /// Milliseconds since the session was created.
    #[must_use]
    pub fn age_ms(&self) -> u64 {
        u64::try_from(self.created.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    #[must_use]
    pub fn last_request_ms(&self) -> u64 {
        self.last_request_ms
    }

    // ========================================================================
    // Locales and security
    // ========================================================================

    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Change the application locale and queue it for the client.
    pub fn set_locale(&mut self, locale: impl Into<String>) {
        self.locale = locale.into();
        self.locales.require(&self.locale);
    }

    /// Queue locale data for the client, e.g. for a date field in another
    /// locale.
    pub fn require_locale(&mut self, locale: &str) {
        self.locales.require(locale);
    }

    /// The session token, generated on first use.
    pub fn security_token(&mut self) -> &str {
        self.security.token()
    }

    #[must_use]
    pub fn connector_resources(&self) -> &ConnectorResources {
        &self.resources
    }

    // ========================================================================
    // Stream variables
    // ========================================================================

    /// Register an upload sink for `owner` and return its target URL.
    ///
    /// # Errors
    ///
    /// Unknown root, or `owner` not attached to it.
    pub fn register_stream_variable(
        &mut self,
        root_id: u32,
        owner: &ConnectorId,
        name: &str,
        variable: SharedStreamVariable,
    ) -> Result<String, SessionError> {
        let root = self.root_mut(root_id)?;
        if !root.tracker.contains(owner) {
            return Err(TreeError::UnknownConnector(owner.clone()).into());
        }
        let secret = root.streams.register(owner, name, variable);
        Ok(target_url(root_id, owner, name, &secret))
    }

    /// # Errors
    ///
    /// [`SessionError::UnknownRoot`].
    pub fn forget_stream_variable(
        &mut self,
        root_id: u32,
        owner: &ConnectorId,
        name: &str,
    ) -> Result<bool, SessionError> {
        Ok(self.root_mut(root_id)?.streams.forget(owner, name))
    }

    /// Purge stream variables of connectors that left the tree since the
    /// last round trip.
    pub(crate) fn post_paint(&mut self, root_id: u32) {
        let Some(root) = self.roots.get_mut(&root_id) else {
            return;
        };
        let detached = root.tracker.take_detached();
        let tracker = &root.tracker;
        let purged = root.streams.purge(|id| tracker.contains(id));
        if !detached.is_empty() || purged > 0 {
            tracing::debug!(
                root = root_id,
                detached = detached.len(),
                purged,
                "post-paint cleanup"
            );
        }
    }
}

/// A user session.
#[derive(Debug)]
pub struct Session {
    state: Mutex<SessionState>,
}

impl Session {
    #[must_use]
    pub fn new(config: &DeploymentConfig) -> Self {
        Self {
            state: Mutex::new(SessionState::new(config)),
        }
    }

    /// Lock the session for one request.
    ///
    /// # Errors
    ///
    /// [`RequestError::SessionPoisoned`] if a previous holder panicked.
    pub fn lock(&self) -> Result<MutexGuard<'_, SessionState>, RequestError> {
        self.state.lock().map_err(|_| RequestError::SessionPoisoned)
    }
}
