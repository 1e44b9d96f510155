#![forbid(unsafe_code)]

//! Shared state owned by a connector.
//!
//! A [`SharedState`] pairs a declared [`BeanType`] with the current
//! [`BeanValue`]. It is the only part of a connector the client sees
//! directly; it is synchronized wholesale on a full repaint and as a diff
//! against the type's zero-value reference otherwise.
//!
//! # Design Invariants
//!
//! 1. **Declared keys only**: [`SharedState::set`] rejects properties the
//!    type does not declare, so the encoded form never carries stray keys.
//!
//! 2. **Reference is the zero value**: [`SharedState::reference`] is
//!    `BeanType::default_value()`, independent of what was last sent.
//!
//! 3. **No side effects**: reading or encoding state never marks anything
//!    dirty; the tracker does that when handing out `&mut` access.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Undeclared property | Typo, stale connector | `StateError::UnknownProperty` from `set` |
//! | Encoding failure | Value/type mismatch | `CodecError` from `encode` |
//! | Property reset to its default | Incremental diff sees no difference | Omitted until the next full repaint |

use std::sync::Arc;

use csync_codec::{BeanType, BeanValue, CodecError, ConnectorLookup, JsonCodec, JsonValue, Value};

use crate::error::StateError;

/// State synchronized between a connector and its client counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedState {
    ty: Arc<BeanType>,
    value: BeanValue,
}

impl SharedState {
    /// Fresh state at the type's defaults.
    #[must_use]
    pub fn new(ty: Arc<BeanType>) -> Self {
        let value = ty.default_value();
        Self { ty, value }
    }

    #[must_use]
    pub fn bean_type(&self) -> &Arc<BeanType> {
        &self.ty
    }

    #[must_use]
    pub fn value(&self) -> &BeanValue {
        &self.value
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }

    /// Set a declared property. Returns whether the stored value changed.
    ///
    /// # Errors
    ///
    /// [`StateError::UnknownProperty`] if the type does not declare `name`.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<bool, StateError> {
        if self.ty.property_named(name).is_none() {
            return Err(StateError::UnknownProperty {
                bean: self.ty.name().to_owned(),
                name: name.to_owned(),
            });
        }
        let value = value.into();
        if self.value.get(name) == Some(&value) {
            return Ok(false);
        }
        self.value.set(name, value);
        Ok(true)
    }

    /// The zero-value reference used for incremental diffs.
    #[must_use]
    pub fn reference(&self) -> BeanValue {
        self.ty.default_value()
    }

    /// Encode for the wire: every property when `full`, otherwise only the
    /// properties that differ from [`reference`](Self::reference).
    ///
    /// # Errors
    ///
    /// Propagates codec failures.
    pub fn encode(
        &self,
        codec: &JsonCodec,
        full: bool,
        lookup: &dyn ConnectorLookup,
    ) -> Result<JsonValue, CodecError> {
        if full {
            codec.encode_bean(&self.value, None, &self.ty, lookup)
        } else {
            let reference = self.reference();
            codec.encode_bean(&self.value, Some(&reference), &self.ty, lookup)
        }
    }
}
