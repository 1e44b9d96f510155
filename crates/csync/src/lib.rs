#![forbid(unsafe_code)]

//! csync: a server-driven UI state-synchronization engine.
//!
//! The server keeps a tree of connectors, each mirrored by a client-side
//! widget. Every round trip the client posts a burst of variable changes and
//! RPC calls; the server dispatches them, then answers with the state,
//! hierarchy and queued client RPC of every connector that changed and is
//! visible.
//!
//! ```ignore
//! use csync::prelude::*;
//!
//! let manager = CommunicationManager::new(DeploymentConfig::default());
//! let session = manager.new_session();
//! let root = session.lock()?.add_root(Box::new(MyWindow::new()))?;
//! let response = manager.handle_uidl_request(&session, &UidlRequest::new(root, payload))?;
//! ```
//!
//! The crates behind the facade:
//!
//! | Crate | Contents |
//! |-------|----------|
//! | [`codec`] | Values, type descriptors, the JSON wire codec |
//! | [`core`] | Connectors, shared state, RPC, the tracker |
//! | [`i18n`] | Locale symbol tables |
//! | [`runtime`] | Sessions, request handling, uploads |

pub use csync_codec as codec;
pub use csync_core as core;
pub use csync_i18n as i18n;
#[cfg(feature = "runtime")]
pub use csync_runtime as runtime;

pub use csync_codec::{ConnectorId, JsonCodec, TypeDescriptor, Value};
pub use csync_core::{Capabilities, Connector, ConnectorTracker, ConnectorType, SharedState};

#[cfg(feature = "runtime")]
pub use csync_runtime::{
    CommunicationManager, DeploymentConfig, RequestError, Session, UidlRequest, UidlResponse,
};

/// Everything a connector implementation and a request handler usually
/// need.
pub mod prelude {
    pub use csync_codec::{
        BeanType, BeanValue, CodecConfig, ConnectorId, CustomSerializer, EnumType, JsonCodec,
        JsonValue, SerializerRegistry, TypeDescriptor, Value,
    };
    pub use csync_core::{
        Capabilities, ClientRpcCall, Connector, ConnectorTracker, ConnectorType, ErrorEvent,
        ErrorHandler, ErrorOrigin, HandlerError, PaintError, PaintTarget, RpcContext, RpcInterface,
        RpcMethod, ServerRpcCall, SharedState, VariableChanges,
    };
    pub use csync_i18n::LocaleCatalog;

    #[cfg(feature = "runtime")]
    pub use csync_runtime::{
        CommunicationManager, DeploymentConfig, LayoutAnalyzer, RequestError, ResourceProvider,
        Session, SharedStreamVariable, StreamVariable, SystemMessages, ThemeResourceProvider,
        UidlRequest, UidlResponse, UploadResponse,
    };
}
