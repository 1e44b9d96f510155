#![forbid(unsafe_code)]

//! Wire codec for connector state synchronization.
//!
//! Values are dynamically shaped ([`Value`]) and statically described
//! ([`TypeDescriptor`]); [`JsonCodec`] maps between the two and
//! `serde_json` trees. The crate has no knowledge of connectors beyond their
//! ids and the [`ConnectorLookup`] seam used to resolve references.

pub mod codec;
pub mod error;
pub mod id;
pub mod serializer;
pub mod types;
pub mod uidl;
pub mod value;

pub use codec::{CodecConfig, JsonCodec};
pub use error::CodecError;
pub use id::{ConnectorId, ConnectorLookup, NoConnectors};
pub use serializer::{CustomSerializer, SerializerRegistry};
pub use types::{BeanType, EnumType, PropertyDescriptor, TypeDescriptor};
pub use value::{BeanValue, Value};

/// Re-exported so collaborators implementing [`CustomSerializer`] share the
/// same JSON tree type.
pub use serde_json::Value as JsonValue;
