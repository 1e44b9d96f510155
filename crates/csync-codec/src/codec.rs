#![forbid(unsafe_code)]

//! Type-directed JSON encoding and decoding.
//!
//! [`JsonCodec::encode`] turns a [`Value`] into its wire form under a declared
//! [`TypeDescriptor`]. When a reference value is supplied, bean properties
//! whose encoded form equals the encoded reference property are omitted,
//! which is how incremental state updates stay small.
//!
//! # Invariants
//!
//! 1. **Null is universal**: `Value::Null` encodes to JSON `null` under every
//!    declared type and JSON `null` decodes to `Value::Null`.
//! 2. **Custom first**: a serializer registered for a type name is consulted
//!    before the default bean, enum, array and named handling.
//! 3. **No inference**: decoding never guesses a type from the JSON shape;
//!    the declared descriptor decides, except for [`TypeDescriptor::Uidl`],
//!    which carries its own tag.
//! 4. **Registration-time checks**: serializable-safety is verified by
//!    [`JsonCodec::validate_type`]; the encode path trusts declared types.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Variant does not fit type | Connector bug | `CodecError::TypeMismatch` |
//! | JSON does not fit type | Client bug or tampering | `CodecError::UnexpectedJson` |
//! | NaN / infinity | Float state | `CodecError::NonFiniteNumber` |
//! | Named type without serializer | Missing registration | `CodecError::UnknownType` |

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Number, Value as JsonValue};
use std::sync::Arc;

use crate::error::{CodecError, json_kind};
use crate::id::{ConnectorId, ConnectorLookup};
use crate::serializer::{CustomSerializer, SerializerRegistry};
use crate::types::{BeanType, TypeDescriptor};
use crate::uidl;
use crate::value::{BeanValue, Value};

/// Codec configuration, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct CodecConfig {
    /// Reject non-serializable bean types at registration instead of warning.
    pub strict_serializable: bool,
    /// Custom serializers by type name.
    pub serializers: SerializerRegistry,
}

/// The wire codec.
#[derive(Debug, Clone, Default)]
pub struct JsonCodec {
    config: CodecConfig,
}

impl JsonCodec {
    #[must_use]
    pub fn new(config: CodecConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Whether `ty` is the internal self-describing wrapper.
    #[must_use]
    pub fn is_internal_type(ty: &TypeDescriptor) -> bool {
        matches!(ty, TypeDescriptor::Uidl)
    }

    /// Check a declared type before it is used on the wire.
    ///
    /// Non-serializable beans warn, or fail under `strict_serializable`.
    /// Named types must have a registered serializer.
    ///
    /// # Errors
    ///
    /// [`CodecError::NotSerializable`] in strict mode,
    /// [`CodecError::UnknownType`] for unregistered named types.
    pub fn validate_type(&self, ty: &TypeDescriptor) -> Result<(), CodecError> {
        match ty {
            TypeDescriptor::Bean(bean) => {
                if self.custom_for(ty).is_some() {
                    return Ok(());
                }
                if !bean.is_serializable() {
                    if self.config.strict_serializable {
                        return Err(CodecError::NotSerializable(bean.name().to_owned()));
                    }
                    tracing::warn!(
                        type_name = bean.name(),
                        "bean type is not marked serializable; encoding it anyway"
                    );
                }
                bean.properties()
                    .iter()
                    .try_for_each(|prop| self.validate_type(&prop.ty))
            }
            TypeDescriptor::Array(inner)
            | TypeDescriptor::List(inner)
            | TypeDescriptor::Set(inner) => self.validate_type(inner),
            TypeDescriptor::Map(key, value) => {
                self.validate_type(key)?;
                self.validate_type(value)
            }
            TypeDescriptor::Named(name) => {
                if self.config.serializers.get(name).is_some() {
                    Ok(())
                } else {
                    Err(CodecError::UnknownType(name.clone()))
                }
            }
            _ => Ok(()),
        }
    }

    /// Encode `value` declared as `ty`, diffing beans against `reference`.
    ///
    /// # Errors
    ///
    /// See the module-level failure table.
    pub fn encode(
        &self,
        value: &Value,
        reference: Option<&Value>,
        ty: &TypeDescriptor,
        lookup: &dyn ConnectorLookup,
    ) -> Result<JsonValue, CodecError> {
        if value.is_null() {
            return Ok(JsonValue::Null);
        }
        if let Some(custom) = self.custom_for(ty) {
            return custom.serialize(value, self, lookup);
        }
        let encoded = match (ty, value) {
            (TypeDescriptor::Bool, Value::Bool(b)) => JsonValue::Bool(*b),
            (TypeDescriptor::Int, Value::Int(i)) => JsonValue::from(*i),
            (TypeDescriptor::Long, Value::Int(_) | Value::Long(_)) => {
                JsonValue::from(value.as_i64().unwrap_or_default())
            }
            (TypeDescriptor::Float, Value::Float(f)) => float(f64::from(*f))?,
            (TypeDescriptor::Double, Value::Float(f)) => float(f64::from(*f))?,
            (TypeDescriptor::Double, Value::Double(d)) => float(*d)?,
            (TypeDescriptor::Char, Value::Char(c)) => JsonValue::String(c.to_string()),
            (TypeDescriptor::String, Value::String(s)) => JsonValue::String(s.clone()),
            (TypeDescriptor::Bytes, Value::Bytes(bytes)) => JsonValue::String(BASE64.encode(bytes)),
            (TypeDescriptor::Enum(e), Value::Enum(name) | Value::String(name)) => {
                if !e.contains(name) {
                    return Err(CodecError::UnknownVariant {
                        enum_name: e.name.clone(),
                        variant: name.clone(),
                    });
                }
                JsonValue::String(name.clone())
            }
            (
                TypeDescriptor::Array(inner)
                | TypeDescriptor::List(inner)
                | TypeDescriptor::Set(inner),
                Value::Array(items) | Value::List(items) | Value::Set(items),
            ) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.encode(item, None, inner, lookup))
                    .collect::<Result<_, _>>()?,
            ),
            (TypeDescriptor::Map(key_ty, value_ty), Value::Map(entries)) => {
                self.encode_map(entries, key_ty, value_ty, lookup)?
            }
            (TypeDescriptor::Connector, Value::Connector(id)) => {
                JsonValue::String(id.as_str().to_owned())
            }
            (TypeDescriptor::Bean(bean_ty), Value::Bean(bean)) => {
                let reference = reference.and_then(Value::as_bean);
                self.encode_bean(bean, reference, bean_ty, lookup)?
            }
            (TypeDescriptor::Named(name), _) => return Err(CodecError::UnknownType(name.clone())),
            (TypeDescriptor::Uidl, _) => uidl::encode_uidl(value)?,
            _ => {
                return Err(CodecError::TypeMismatch {
                    expected: ty.type_name(),
                    found: value.kind().to_owned(),
                });
            }
        };
        Ok(encoded)
    }

    /// Encode a bean, omitting properties equal to `reference` after encoding.
    ///
    /// Properties absent from `bean` are taken from their declared defaults.
    ///
    /// # Errors
    ///
    /// Propagates property encoding failures.
    pub fn encode_bean(
        &self,
        bean: &BeanValue,
        reference: Option<&BeanValue>,
        ty: &BeanType,
        lookup: &dyn ConnectorLookup,
    ) -> Result<JsonValue, CodecError> {
        let mut object = Map::with_capacity(ty.properties().len());
        for prop in ty.properties() {
            let field = bean.get(&prop.name).unwrap_or(&prop.default);
            let encoded = self.encode(field, None, &prop.ty, lookup)?;
            if let Some(reference) = reference {
                let reference_field = reference.get(&prop.name).unwrap_or(&prop.default);
                if self.encode(reference_field, None, &prop.ty, lookup)? == encoded {
                    continue;
                }
            }
            object.insert(prop.name.clone(), encoded);
        }
        Ok(JsonValue::Object(object))
    }

    /// Decode `json` declared as `ty`.
    ///
    /// # Errors
    ///
    /// See the module-level failure table.
    pub fn decode(
        &self,
        ty: &TypeDescriptor,
        json: &JsonValue,
        lookup: &dyn ConnectorLookup,
    ) -> Result<Value, CodecError> {
        if let Some(custom) = self.custom_for(ty) {
            return custom.deserialize(ty, json, self, lookup);
        }
        if json.is_null() {
            return Ok(Value::Null);
        }
        let value = match ty {
            TypeDescriptor::Bool => Value::Bool(json.as_bool().ok_or_else(|| mismatch(ty, json))?),
            TypeDescriptor::Int => {
                let wide = json.as_i64().ok_or_else(|| mismatch(ty, json))?;
                Value::Int(i32::try_from(wide).map_err(|_| CodecError::OutOfRange {
                    ty: "int",
                    value: wide.to_string(),
                })?)
            }
            TypeDescriptor::Long => Value::Long(json.as_i64().ok_or_else(|| mismatch(ty, json))?),
            TypeDescriptor::Float => {
                Value::Float(narrow_float(json.as_f64().ok_or_else(|| mismatch(ty, json))?)?)
            }
            TypeDescriptor::Double => Value::Double(json.as_f64().ok_or_else(|| mismatch(ty, json))?),
            TypeDescriptor::Char => {
                let s = json.as_str().ok_or_else(|| mismatch(ty, json))?;
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(mismatch(ty, json)),
                }
            }
            TypeDescriptor::String => {
                Value::String(json.as_str().ok_or_else(|| mismatch(ty, json))?.to_owned())
            }
            TypeDescriptor::Bytes => {
                let s = json.as_str().ok_or_else(|| mismatch(ty, json))?;
                Value::Bytes(
                    BASE64
                        .decode(s)
                        .map_err(|e| CodecError::InvalidBytes(e.to_string()))?,
                )
            }
            TypeDescriptor::Enum(e) => {
                let name = json.as_str().ok_or_else(|| mismatch(ty, json))?;
                if !e.contains(name) {
                    return Err(CodecError::UnknownVariant {
                        enum_name: e.name.clone(),
                        variant: name.to_owned(),
                    });
                }
                Value::Enum(name.to_owned())
            }
            TypeDescriptor::Array(inner) => Value::Array(self.decode_items(inner, json, lookup)?),
            TypeDescriptor::List(inner) => Value::List(self.decode_items(inner, json, lookup)?),
            TypeDescriptor::Set(inner) => Value::Set(self.decode_items(inner, json, lookup)?),
            TypeDescriptor::Map(key_ty, value_ty) => {
                Value::Map(self.decode_map(key_ty, value_ty, json, lookup)?)
            }
            TypeDescriptor::Connector => {
                let id = ConnectorId::new(json.as_str().ok_or_else(|| mismatch(ty, json))?);
                if lookup.contains(&id) {
                    Value::Connector(id)
                } else {
                    Value::Null
                }
            }
            TypeDescriptor::Bean(bean_ty) => Value::Bean(self.decode_bean(bean_ty, json, lookup)?),
            TypeDescriptor::Named(name) => return Err(CodecError::UnknownType(name.clone())),
            TypeDescriptor::Uidl => uidl::decode_uidl(json, lookup)?,
        };
        Ok(value)
    }

    fn decode_bean(
        &self,
        ty: &BeanType,
        json: &JsonValue,
        lookup: &dyn ConnectorLookup,
    ) -> Result<BeanValue, CodecError> {
        let Some(object) = json.as_object() else {
            return Err(CodecError::UnexpectedJson {
                expected: ty.name().to_owned(),
                found: json_kind(json),
            });
        };
        let mut bean = BeanValue::new();
        for prop in ty.properties() {
            let value = match object.get(&prop.name) {
                Some(field) => self.decode(&prop.ty, field, lookup)?,
                None => prop.default.clone(),
            };
            bean.set(prop.name.clone(), value);
        }
        for key in object.keys() {
            if ty.property_named(key).is_none() {
                tracing::debug!(type_name = ty.name(), property = %key, "ignoring undeclared property");
            }
        }
        Ok(bean)
    }

    fn decode_items(
        &self,
        inner: &TypeDescriptor,
        json: &JsonValue,
        lookup: &dyn ConnectorLookup,
    ) -> Result<Vec<Value>, CodecError> {
        let items = json.as_array().ok_or_else(|| CodecError::UnexpectedJson {
            expected: "array".into(),
            found: json_kind(json),
        })?;
        items
            .iter()
            .map(|item| self.decode(inner, item, lookup))
            .collect()
    }

    fn encode_map(
        &self,
        entries: &[(Value, Value)],
        key_ty: &TypeDescriptor,
        value_ty: &TypeDescriptor,
        lookup: &dyn ConnectorLookup,
    ) -> Result<JsonValue, CodecError> {
        if matches!(key_ty, TypeDescriptor::String) {
            let mut object = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let Value::String(key) = key else {
                    return Err(CodecError::TypeMismatch {
                        expected: "string".into(),
                        found: key.kind().to_owned(),
                    });
                };
                object.insert(key.clone(), self.encode(value, None, value_ty, lookup)?);
            }
            return Ok(JsonValue::Object(object));
        }
        let mut keys = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            keys.push(self.encode(key, None, key_ty, lookup)?);
            values.push(self.encode(value, None, value_ty, lookup)?);
        }
        Ok(JsonValue::Array(vec![
            JsonValue::Array(keys),
            JsonValue::Array(values),
        ]))
    }

    fn decode_map(
        &self,
        key_ty: &TypeDescriptor,
        value_ty: &TypeDescriptor,
        json: &JsonValue,
        lookup: &dyn ConnectorLookup,
    ) -> Result<Vec<(Value, Value)>, CodecError> {
        if let Some(object) = json.as_object() {
            return object
                .iter()
                .map(|(key, value)| -> Result<(Value, Value), CodecError> {
                    let key = self.decode(key_ty, &JsonValue::String(key.clone()), lookup)?;
                    Ok((key, self.decode(value_ty, value, lookup)?))
                })
                .collect();
        }
        let pair = json.as_array().filter(|pair| pair.len() == 2);
        let (Some(keys), Some(values)) = (
            pair.and_then(|p| p[0].as_array()),
            pair.and_then(|p| p[1].as_array()),
        ) else {
            return Err(CodecError::UnexpectedJson {
                expected: "map".into(),
                found: json_kind(json),
            });
        };
        if keys.len() != values.len() {
            return Err(CodecError::UnexpectedJson {
                expected: "map with matching key and value counts".into(),
                found: format!("{} keys and {} values", keys.len(), values.len()),
            });
        }
        keys.iter()
            .zip(values)
            .map(|(k, v)| -> Result<(Value, Value), CodecError> {
                Ok((self.decode(key_ty, k, lookup)?, self.decode(value_ty, v, lookup)?))
            })
            .collect()
    }

    fn custom_for(&self, ty: &TypeDescriptor) -> Option<&Arc<dyn CustomSerializer>> {
        if self.config.serializers.is_empty() {
            return None;
        }
        match ty {
            TypeDescriptor::Bean(_)
            | TypeDescriptor::Enum(_)
            | TypeDescriptor::Array(_)
            | TypeDescriptor::Named(_) => self.config.serializers.get(&ty.type_name()),
            _ => None,
        }
    }
}

fn float(v: f64) -> Result<JsonValue, CodecError> {
    Number::from_f64(v)
        .map(JsonValue::Number)
        .ok_or(CodecError::NonFiniteNumber(v))
}

/// `f64` → `f32`, refusing values that only fit as infinity.
pub(crate) fn narrow_float(wide: f64) -> Result<f32, CodecError> {
    #[allow(clippy::cast_possible_truncation)]
    let narrow = wide as f32;
    if narrow.is_finite() {
        Ok(narrow)
    } else {
        Err(CodecError::OutOfRange {
            ty: "float",
            value: wide.to_string(),
        })
    }
}

fn mismatch(ty: &TypeDescriptor, json: &JsonValue) -> CodecError {
    CodecError::UnexpectedJson {
        expected: ty.type_name(),
        found: json_kind(json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NoConnectors;
    use crate::types::EnumType;
    use serde_json::json;

    fn button_state() -> BeanType {
        BeanType::new("org.example.ButtonState")
            .property("caption", TypeDescriptor::String)
            .property("enabled", TypeDescriptor::Bool)
            .property_with_default("tabIndex", TypeDescriptor::Int, Value::Int(0))
            .property("styles", TypeDescriptor::list(TypeDescriptor::String))
    }

    #[test]
    fn full_encoding_emits_every_property_in_order() {
        let codec = JsonCodec::default();
        let ty = button_state();
        let bean = BeanValue::new().with("caption", "OK").with("enabled", true);
        let json = codec.encode_bean(&bean, None, &ty, &NoConnectors).unwrap();
        let keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["caption", "enabled", "tabIndex", "styles"]);
        assert_eq!(json["tabIndex"], json!(0));
        assert_eq!(json["styles"], JsonValue::Null);
    }

    #[test]
    fn diff_against_reference_omits_unchanged() {
        let codec = JsonCodec::default();
        let ty = button_state();
        let bean = BeanValue::new().with("caption", "OK").with("enabled", false);
        let reference = ty.default_value();
        let json = codec
            .encode_bean(&bean, Some(&reference), &ty, &NoConnectors)
            .unwrap();
        assert_eq!(json, json!({"caption": "OK"}));
    }

    #[test]
    fn int_and_long_compare_after_encoding() {
        let codec = JsonCodec::default();
        let ty = BeanType::new("T").property("n", TypeDescriptor::Long);
        let bean = BeanValue::new().with("n", Value::Int(0));
        let json = codec
            .encode_bean(&bean, Some(&ty.default_value()), &ty, &NoConnectors)
            .unwrap();
        assert_eq!(json, json!({}));
    }

    #[test]
    fn float_outside_f32_is_out_of_range() {
        let codec = JsonCodec::default();
        let err = codec
            .decode(&TypeDescriptor::Float, &json!(1e300), &NoConnectors)
            .unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { ty: "float", .. }));
        assert_eq!(
            codec.decode(&TypeDescriptor::Float, &json!(1.5), &NoConnectors),
            Ok(Value::Float(1.5))
        );
        assert_eq!(
            codec.decode(&TypeDescriptor::Double, &json!(1e300), &NoConnectors),
            Ok(Value::Double(1e300))
        );
    }

    #[test]
    fn null_is_universal() {
        let codec = JsonCodec::default();
        for ty in [
            TypeDescriptor::String,
            TypeDescriptor::Int,
            TypeDescriptor::bean(button_state()),
            TypeDescriptor::list(TypeDescriptor::Bool),
        ] {
            assert_eq!(
                codec.encode(&Value::Null, None, &ty, &NoConnectors),
                Ok(JsonValue::Null)
            );
            assert_eq!(codec.decode(&ty, &JsonValue::Null, &NoConnectors), Ok(Value::Null));
        }
    }

    #[test]
    fn type_mismatch_is_reported() {
        let codec = JsonCodec::default();
        let err = codec
            .encode(&Value::from("x"), None, &TypeDescriptor::Int, &NoConnectors)
            .unwrap_err();
        assert_eq!(
            err,
            CodecError::TypeMismatch {
                expected: "int".into(),
                found: "string".into()
            }
        );
    }

    #[test]
    fn non_finite_float_is_rejected() {
        let codec = JsonCodec::default();
        let err = codec
            .encode(
                &Value::Double(f64::NAN),
                None,
                &TypeDescriptor::Double,
                &NoConnectors,
            )
            .unwrap_err();
        assert!(matches!(err, CodecError::NonFiniteNumber(_)));
    }

    #[test]
    fn bytes_use_base64() {
        let codec = JsonCodec::default();
        let json = codec
            .encode(
                &Value::Bytes(b"hi".to_vec()),
                None,
                &TypeDescriptor::Bytes,
                &NoConnectors,
            )
            .unwrap();
        assert_eq!(json, json!("aGk="));
        assert_eq!(
            codec.decode(&TypeDescriptor::Bytes, &json, &NoConnectors),
            Ok(Value::Bytes(b"hi".to_vec()))
        );
    }

    #[test]
    fn enums_are_validated() {
        let codec = JsonCodec::default();
        let ty = TypeDescriptor::Enum(Arc::new(EnumType::new("Align", ["LEFT", "RIGHT"])));
        assert_eq!(
            codec.decode(&ty, &json!("LEFT"), &NoConnectors),
            Ok(Value::Enum("LEFT".into()))
        );
        assert!(matches!(
            codec.decode(&ty, &json!("UP"), &NoConnectors),
            Err(CodecError::UnknownVariant { .. })
        ));
    }

    #[test]
    fn maps_with_string_keys_are_objects() {
        let codec = JsonCodec::default();
        let ty = TypeDescriptor::map(TypeDescriptor::String, TypeDescriptor::Int);
        let value = Value::Map(vec![(Value::from("a"), Value::Int(1))]);
        let json = codec.encode(&value, None, &ty, &NoConnectors).unwrap();
        assert_eq!(json, json!({"a": 1}));
        assert_eq!(codec.decode(&ty, &json, &NoConnectors), Ok(value));
    }

    #[test]
    fn maps_with_other_keys_are_parallel_arrays() {
        let codec = JsonCodec::default();
        let ty = TypeDescriptor::map(TypeDescriptor::Int, TypeDescriptor::Bool);
        let value = Value::Map(vec![(Value::Int(7), Value::Bool(true))]);
        let json = codec.encode(&value, None, &ty, &NoConnectors).unwrap();
        assert_eq!(json, json!([[7], [true]]));
        assert_eq!(codec.decode(&ty, &json, &NoConnectors), Ok(value));
        assert!(codec.decode(&ty, &json!([[1, 2], [true]]), &NoConnectors).is_err());
    }

    #[test]
    fn connector_references_resolve_through_lookup() {
        let codec = JsonCodec::default();
        let attached = |id: &ConnectorId| id.as_str() == "5";
        assert_eq!(
            codec.decode(&TypeDescriptor::Connector, &json!("5"), &attached),
            Ok(Value::Connector("5".into()))
        );
        assert_eq!(
            codec.decode(&TypeDescriptor::Connector, &json!("6"), &attached),
            Ok(Value::Null)
        );
    }

    #[test]
    fn bean_decoding_fills_defaults() {
        let codec = JsonCodec::default();
        let ty = button_state();
        let bean = codec
            .decode(
                &TypeDescriptor::bean(ty),
                &json!({"caption": "Go", "extra": 1}),
                &NoConnectors,
            )
            .unwrap();
        let bean = bean.as_bean().unwrap();
        assert_eq!(bean.get("caption"), Some(&Value::from("Go")));
        assert_eq!(bean.get("enabled"), Some(&Value::Bool(false)));
        assert_eq!(bean.get("extra"), None);
    }

    #[test]
    fn strict_mode_rejects_unserializable_beans() {
        let ty = TypeDescriptor::bean(BeanType::new("Opaque").not_serializable());
        let lenient = JsonCodec::default();
        assert_eq!(lenient.validate_type(&ty), Ok(()));
        let strict = JsonCodec::new(CodecConfig {
            strict_serializable: true,
            ..CodecConfig::default()
        });
        assert_eq!(
            strict.validate_type(&ty),
            Err(CodecError::NotSerializable("Opaque".into()))
        );
    }

    #[test]
    fn named_types_need_a_serializer() {
        let codec = JsonCodec::default();
        let ty = TypeDescriptor::Named("org.example.Point".into());
        assert_eq!(
            codec.validate_type(&ty),
            Err(CodecError::UnknownType("org.example.Point".into()))
        );
    }

    struct PointSerializer;

    impl CustomSerializer for PointSerializer {
        fn serialize(
            &self,
            value: &Value,
            _codec: &JsonCodec,
            _lookup: &dyn ConnectorLookup,
        ) -> Result<JsonValue, CodecError> {
            let bean = value.as_bean().ok_or(CodecError::Custom("not a point".into()))?;
            let x = bean.get("x").and_then(Value::as_i64).unwrap_or_default();
            let y = bean.get("y").and_then(Value::as_i64).unwrap_or_default();
            Ok(JsonValue::String(format!("{x},{y}")))
        }

        fn deserialize(
            &self,
            _ty: &TypeDescriptor,
            json: &JsonValue,
            _codec: &JsonCodec,
            _lookup: &dyn ConnectorLookup,
        ) -> Result<Value, CodecError> {
            let text = json.as_str().ok_or(CodecError::Custom("not a string".into()))?;
            let (x, y) = text
                .split_once(',')
                .ok_or(CodecError::Custom("missing comma".into()))?;
            let parse = |s: &str| s.parse::<i32>().map_err(|e| CodecError::Custom(e.to_string()));
            Ok(Value::Bean(
                BeanValue::new().with("x", parse(x)?).with("y", parse(y)?),
            ))
        }
    }

    #[test]
    fn custom_serializer_takes_precedence_over_bean_encoding() {
        let mut serializers = SerializerRegistry::new();
        serializers
            .register("org.example.Point", Arc::new(PointSerializer))
            .unwrap();
        let codec = JsonCodec::new(CodecConfig {
            strict_serializable: false,
            serializers,
        });
        let ty = TypeDescriptor::bean(
            BeanType::new("org.example.Point")
                .property("x", TypeDescriptor::Int)
                .property("y", TypeDescriptor::Int),
        );
        let point = Value::Bean(BeanValue::new().with("x", 3).with("y", 4));
        let json = codec.encode(&point, None, &ty, &NoConnectors).unwrap();
        assert_eq!(json, json!("3,4"));
        assert_eq!(codec.decode(&ty, &json, &NoConnectors), Ok(point));
    }

    proptest::proptest! {
        #[test]
        fn diff_is_a_subset_of_full_encoding(
            caption in proptest::option::of("[ -~]{0,16}"),
            enabled in proptest::prelude::any::<bool>(),
            tab_index in proptest::prelude::any::<i32>(),
        ) {
            let codec = JsonCodec::default();
            let ty = button_state();
            let bean = BeanValue::new()
                .with("caption", caption.map_or(Value::Null, Value::from))
                .with("enabled", enabled)
                .with("tabIndex", tab_index);

            let full = codec.encode_bean(&bean, None, &ty, &NoConnectors).unwrap();
            let diff = codec
                .encode_bean(&bean, Some(&ty.default_value()), &ty, &NoConnectors)
                .unwrap();
            for (name, value) in diff.as_object().unwrap() {
                proptest::prop_assert_eq!(&full[name.as_str()], value);
            }
            proptest::prop_assert_eq!(
                codec.encode_bean(&bean, Some(&bean), &ty, &NoConnectors).unwrap(),
                json!({})
            );
        }
    }
}
