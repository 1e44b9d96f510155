#![forbid(unsafe_code)]

//! Request handling for csync.
//!
//! Everything between an HTTP body and the connector tree: the token check,
//! burst unescaping and decoding, dispatch with error routing, response
//! construction, client type caching, locale queueing, connector resources,
//! uploads into stream variables, and per-session state.
//!
//! [`CommunicationManager`] is the entry point; one instance serves every
//! [`Session`] of a deployment.

pub mod burst;
pub mod client_cache;
pub mod config;
pub mod decode;
pub mod dispatch;
pub mod error;
pub mod locale;
#[cfg(feature = "tracing-json")]
pub mod logging;
pub mod manager;
pub mod resources;
pub mod security;
pub mod session;
pub mod upload;
pub mod writer;

pub use client_cache::{ClientCache, TypeRegistry};
pub use config::{ConfigError, DeploymentConfig, SystemMessages};
pub use decode::{Decoded, InvocationDecoder, InvocationError, ParseError};
pub use dispatch::DispatchOutcome;
pub use error::{ProtocolError, RequestError, SessionError};
pub use manager::{CommunicationManager, UIDL_CONTENT_TYPE, UidlRequest, UidlResponse};
pub use resources::{
    DirectoryResourceProvider, NoResources, NoThemeResources, ResourceProvider, ResourceResponse,
    ThemeResourceProvider,
};
pub use security::{SecurityError, SecurityGuard};
pub use session::{RootState, Session, SessionState};
pub use upload::{SharedStreamVariable, StreamVariable, UploadError, UploadResponse};
pub use writer::{LayoutAnalyzer, ResponseWriter, WriteOptions};
