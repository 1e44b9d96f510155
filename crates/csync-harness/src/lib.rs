#![forbid(unsafe_code)]

//! Test harness for csync.
//!
//! [`fixtures`] holds a small reference widget set, a recording error
//! handler and an in-memory upload sink; [`client`] drives round trips the
//! way a browser client would. [`Harness`] wires both to a fresh
//! [`CommunicationManager`].

pub mod client;
pub mod fixtures;

use std::sync::Arc;

use csync_codec::ConnectorId;
use csync_core::Connector;
use csync_runtime::{CommunicationManager, DeploymentConfig, RequestError, Session, SessionError};

pub use client::{Message, TestClient, burst, legacy, rpc};
pub use fixtures::RecordingErrorHandler;

/// A manager, one session and one root window.
pub struct Harness {
    pub manager: CommunicationManager,
    pub session: Session,
    pub root: u32,
    pub window: ConnectorId,
    pub errors: Arc<RecordingErrorHandler>,
}

impl Harness {
    /// # Panics
    ///
    /// Never for a fresh session; the harness is test-only code.
    #[must_use]
    pub fn new(config: DeploymentConfig) -> Self {
        Self::with_manager(config, |manager| manager)
    }

    /// Like [`new`](Self::new), letting `customize` add collaborators.
    ///
    /// # Panics
    ///
    /// Never for a fresh session.
    #[must_use]
    pub fn with_manager(
        config: DeploymentConfig,
        customize: impl FnOnce(CommunicationManager) -> CommunicationManager,
    ) -> Self {
        let errors = RecordingErrorHandler::new();
        let manager = customize(
            CommunicationManager::new(config).with_error_handler(Arc::clone(&errors) as _),
        );
        let session = manager.new_session();
        let (root, window) = {
            let mut state = session.lock().expect("fresh session");
            let root = state
                .add_root(fixtures::window("Main"))
                .expect("fresh root");
            let window = state
                .root(root)
                .ok()
                .and_then(|r| r.tracker.root().cloned())
                .expect("root window");
            (root, window)
        };
        Self {
            manager,
            session,
            root,
            window,
            errors,
        }
    }

    #[must_use]
    pub fn client(&self) -> TestClient<'_> {
        TestClient::new(&self.manager, &self.session, self.root)
    }

    /// Attach `connector` under `parent` (the window when `None`).
    ///
    /// # Errors
    ///
    /// Poisoned session or unknown parent.
    pub fn attach(
        &self,
        parent: Option<&ConnectorId>,
        connector: Box<dyn Connector>,
    ) -> Result<ConnectorId, RequestError> {
        let mut state = self.session.lock()?;
        let parent = parent.unwrap_or(&self.window).clone();
        let tracker = &mut state.root_mut(self.root)?.tracker;
        let id = tracker
            .attach(&parent, connector)
            .map_err(SessionError::from)?;
        Ok(id)
    }

    /// Run `f` on this root's tracker.
    ///
    /// # Panics
    ///
    /// If the session is poisoned.
    pub fn with_tracker<R>(&self, f: impl FnOnce(&mut csync_core::ConnectorTracker) -> R) -> R {
        let mut state = self.session.lock().expect("session not poisoned");
        let root = state.root_mut(self.root).expect("harness root");
        f(&mut root.tracker)
    }

    /// Set a state property of `connector`.
    ///
    /// # Panics
    ///
    /// Unknown connector or property.
    pub fn set_state(&self, connector: &ConnectorId, name: &str, value: impl Into<csync_codec::Value>) {
        self.with_tracker(|tracker| {
            tracker
                .state_mut(connector)
                .expect("connector with state")
                .set(name, value)
                .expect("declared property");
        });
    }
}
