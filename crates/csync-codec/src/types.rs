#![forbid(unsafe_code)]

//! Declared type descriptors.
//!
//! Connectors publish their shared-state layout and RPC signatures as
//! [`TypeDescriptor`]s. Bean layouts are resolved once, at registration, into
//! a [`BeanType`] holding the ordered property list; the codec never inspects
//! values to discover structure.
//!
//! # Invariants
//!
//! 1. **Declared order**: a bean's properties are encoded in the order they
//!    were declared.
//! 2. **Defaults are total**: every property has a default, so
//!    [`BeanType::default_value`] is a complete reference instance.
//! 3. **Descriptors are immutable**: `BeanType` and `EnumType` are shared via
//!    `Arc` and never mutated after construction.

use std::sync::Arc;

use crate::value::{BeanValue, Value};

/// Shape of a declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Bool,
    Int,
    Long,
    Float,
    Double,
    Char,
    String,
    Bytes,
    Enum(Arc<EnumType>),
    Array(Box<TypeDescriptor>),
    List(Box<TypeDescriptor>),
    Set(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    /// Reference to another connector, encoded as its id.
    Connector,
    Bean(Arc<BeanType>),
    /// A type handled entirely by a registered custom serializer.
    Named(String),
    /// Self-describing `[tag, value]` wrapper used by legacy variable changes.
    Uidl,
}

impl TypeDescriptor {
    #[must_use]
    pub fn array(element: TypeDescriptor) -> Self {
        Self::Array(Box::new(element))
    }

    #[must_use]
    pub fn list(element: TypeDescriptor) -> Self {
        Self::List(Box::new(element))
    }

    #[must_use]
    pub fn set(element: TypeDescriptor) -> Self {
        Self::Set(Box::new(element))
    }

    #[must_use]
    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    #[must_use]
    pub fn bean(ty: BeanType) -> Self {
        Self::Bean(Arc::new(ty))
    }

    /// Name used for custom-serializer lookup and error messages.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Bool => "boolean".into(),
            Self::Int => "int".into(),
            Self::Long => "long".into(),
            Self::Float => "float".into(),
            Self::Double => "double".into(),
            Self::Char => "char".into(),
            Self::String => "string".into(),
            Self::Bytes => "bytes".into(),
            Self::Enum(e) => e.name.clone(),
            Self::Array(inner) => format!("{}[]", inner.type_name()),
            Self::List(_) => "list".into(),
            Self::Set(_) => "set".into(),
            Self::Map(_, _) => "map".into(),
            Self::Connector => "connector".into(),
            Self::Bean(b) => b.name.clone(),
            Self::Named(n) => n.clone(),
            Self::Uidl => "uidl".into(),
        }
    }

    /// The value a freshly constructed property of this type holds.
    #[must_use]
    pub fn zero_value(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Long => Value::Long(0),
            Self::Float => Value::Float(0.0),
            Self::Double => Value::Double(0.0),
            _ => Value::Null,
        }
    }
}

/// A declared enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub variants: Vec<String>,
}

impl EnumType {
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            variants: variants.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn contains(&self, variant: &str) -> bool {
        self.variants.iter().any(|v| v == variant)
    }
}

/// One declared bean property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
    pub default: Value,
}

/// Declared bean layout.
///
/// # Example
///
/// ```
/// use csync_codec::types::{BeanType, TypeDescriptor};
/// use csync_codec::Value;
///
/// let state = BeanType::new("org.example.ButtonState")
///     .property("caption", TypeDescriptor::String)
///     .property_with_default("tabIndex", TypeDescriptor::Int, Value::Int(-1));
///
/// let reference = state.default_value();
/// assert_eq!(reference.get("tabIndex"), Some(&Value::Int(-1)));
/// assert_eq!(state.properties().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BeanType {
    name: String,
    supertype: Option<Arc<BeanType>>,
    properties: Vec<PropertyDescriptor>,
    serializable: bool,
}

impl BeanType {
    /// A serializable bean type with no properties.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertype: None,
            properties: Vec::new(),
            serializable: true,
        }
    }

    /// Inherit the parent's properties; they come first in declared order.
    #[must_use]
    pub fn extending(name: impl Into<String>, parent: &Arc<BeanType>) -> Self {
        Self {
            name: name.into(),
            supertype: Some(Arc::clone(parent)),
            properties: parent.properties.clone(),
            serializable: parent.serializable,
        }
    }

    /// Declare a property whose default is the type's zero value.
    #[must_use]
    pub fn property(self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        let default = ty.zero_value();
        self.property_with_default(name, ty, default)
    }

    /// Declare a property with an explicit default. Redeclaring a name
    /// replaces the earlier declaration in place.
    #[must_use]
    pub fn property_with_default(
        mut self,
        name: impl Into<String>,
        ty: TypeDescriptor,
        default: impl Into<Value>,
    ) -> Self {
        let prop = PropertyDescriptor {
            name: name.into(),
            ty,
            default: default.into(),
        };
        match self.properties.iter_mut().find(|p| p.name == prop.name) {
            Some(slot) => *slot = prop,
            None => self.properties.push(prop),
        }
        self
    }

    /// Mark the type as not safe to serialize.
    #[must_use]
    pub fn not_serializable(mut self) -> Self {
        self.serializable = false;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn supertype(&self) -> Option<&Arc<BeanType>> {
        self.supertype.as_ref()
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    #[must_use]
    pub fn property_named(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    /// Reference instance with every property at its default.
    #[must_use]
    pub fn default_value(&self) -> BeanValue {
        let mut bean = BeanValue::new();
        for prop in &self.properties {
            bean.set(prop.name.clone(), prop.default.clone());
        }
        bean
    }
}
