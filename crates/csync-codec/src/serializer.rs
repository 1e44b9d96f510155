#![forbid(unsafe_code)]

//! Custom serializer table.
//!
//! A serializer registered for a type name takes precedence over the default
//! bean, enum and array handling. Built-in scalar and collection types are
//! reserved and cannot be overridden.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use serde_json::Value as JsonValue;

use crate::codec::JsonCodec;
use crate::error::CodecError;
use crate::id::ConnectorLookup;
use crate::types::TypeDescriptor;
use crate::value::Value;

/// Type names that always use the built-in encoding.
pub const RESERVED_TYPE_NAMES: &[&str] = &[
    "boolean", "int", "long", "float", "double", "char", "string", "bytes", "list", "set", "map",
    "connector", "uidl",
];

/// User-supplied wire form for one type.
pub trait CustomSerializer: Send + Sync {
    /// Encode `value`; `codec` may be used for nested values.
    fn serialize(
        &self,
        value: &Value,
        codec: &JsonCodec,
        lookup: &dyn ConnectorLookup,
    ) -> Result<JsonValue, CodecError>;

    /// Decode `json` declared as `ty`.
    fn deserialize(
        &self,
        ty: &TypeDescriptor,
        json: &JsonValue,
        codec: &JsonCodec,
        lookup: &dyn ConnectorLookup,
    ) -> Result<Value, CodecError>;
}

/// Registry of custom serializers keyed by type name.
#[derive(Clone, Default)]
pub struct SerializerRegistry {
    by_name: AHashMap<String, Arc<dyn CustomSerializer>>,
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.by_name.keys().collect();
        names.sort();
        f.debug_struct("SerializerRegistry")
            .field("types", &names)
            .finish()
    }
}

impl SerializerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `serializer` for `type_name`.
    ///
    /// # Errors
    ///
    /// [`CodecError::ReservedType`] for built-in type names.
    pub fn register(
        &mut self,
        type_name: impl Into<String>,
        serializer: Arc<dyn CustomSerializer>,
    ) -> Result<(), CodecError> {
        let type_name = type_name.into();
        if is_reserved(&type_name) {
            return Err(CodecError::ReservedType(type_name));
        }
        self.by_name.insert(type_name, serializer);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&Arc<dyn CustomSerializer>> {
        self.by_name.get(type_name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

fn is_reserved(name: &str) -> bool {
    RESERVED_TYPE_NAMES.contains(&name)
        || (name.ends_with("[]") && RESERVED_TYPE_NAMES.contains(&name.trim_end_matches("[]")))
}
