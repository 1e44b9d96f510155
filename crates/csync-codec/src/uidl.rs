#![forbid(unsafe_code)]

//! Self-describing `[tag, value]` form used by legacy variable changes.
//!
//! | Tag | Value |
//! |-----|-------|
//! | `n` | null |
//! | `b` | boolean |
//! | `i` | int |
//! | `l` | long |
//! | `f` | float |
//! | `d` | double |
//! | `s` | string |
//! | `c` | connector id |
//! | `a` | array of tagged values |
//! | `L` | list of tagged values |
//! | `S` | set of tagged values |
//! | `m` | object of tagged values (string keys) |

use serde_json::{Map, Value as JsonValue, json};

use crate::codec::narrow_float;
use crate::error::{CodecError, json_kind};
use crate::id::{ConnectorId, ConnectorLookup};
use crate::value::Value;

/// Encode `value` with its type tag.
///
/// # Errors
///
/// Bytes, beans and maps with non-string keys have no tagged form.
pub fn encode_uidl(value: &Value) -> Result<JsonValue, CodecError> {
    let tagged = match value {
        Value::Null => json!(["n", null]),
        Value::Bool(b) => json!(["b", b]),
        Value::Int(i) => json!(["i", i]),
        Value::Long(l) => json!(["l", l]),
        Value::Float(f) => json!(["f", finite(f64::from(*f))?]),
        Value::Double(d) => json!(["d", finite(*d)?]),
        Value::Char(c) => json!(["s", c.to_string()]),
        Value::String(s) | Value::Enum(s) => json!(["s", s]),
        Value::Connector(id) => json!(["c", id.as_str()]),
        Value::Array(items) => json!(["a", encode_items(items)?]),
        Value::List(items) => json!(["L", encode_items(items)?]),
        Value::Set(items) => json!(["S", encode_items(items)?]),
        Value::Map(entries) => {
            let mut object = Map::with_capacity(entries.len());
            for (key, val) in entries {
                let Some(key) = key.as_str() else {
                    return Err(CodecError::UnsupportedUidlValue("non-string keyed map"));
                };
                object.insert(key.to_owned(), encode_uidl(val)?);
            }
            json!(["m", object])
        }
        Value::Bytes(_) => return Err(CodecError::UnsupportedUidlValue("bytes")),
        Value::Bean(_) => return Err(CodecError::UnsupportedUidlValue("bean")),
    };
    Ok(tagged)
}

/// Decode a tagged value.
///
/// # Errors
///
/// Shape errors and unknown tags.
pub fn decode_uidl(json: &JsonValue, lookup: &dyn ConnectorLookup) -> Result<Value, CodecError> {
    let pair = match json.as_array() {
        Some(pair) if pair.len() == 2 => pair,
        _ => return Err(unexpected("[tag, value] pair", json)),
    };
    let Some(tag) = pair[0].as_str() else {
        return Err(unexpected("string tag", &pair[0]));
    };
    let raw = &pair[1];
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let value = match tag {
        "n" => Value::Null,
        "b" => Value::Bool(raw.as_bool().ok_or_else(|| unexpected("boolean", raw))?),
        "i" => {
            let wide = raw.as_i64().ok_or_else(|| unexpected("int", raw))?;
            Value::Int(i32::try_from(wide).map_err(|_| CodecError::OutOfRange {
                ty: "int",
                value: wide.to_string(),
            })?)
        }
        "l" => Value::Long(raw.as_i64().ok_or_else(|| unexpected("long", raw))?),
        "f" => Value::Float(narrow_float(
            raw.as_f64().ok_or_else(|| unexpected("float", raw))?,
        )?),
        "d" => Value::Double(raw.as_f64().ok_or_else(|| unexpected("double", raw))?),
        "s" => Value::String(raw.as_str().ok_or_else(|| unexpected("string", raw))?.to_owned()),
        "c" => {
            let id = ConnectorId::new(raw.as_str().ok_or_else(|| unexpected("connector id", raw))?);
            if lookup.contains(&id) {
                Value::Connector(id)
            } else {
                Value::Null
            }
        }
        "a" => Value::Array(decode_items(raw, lookup)?),
        "L" => Value::List(decode_items(raw, lookup)?),
        "S" => Value::Set(decode_items(raw, lookup)?),
        "m" => {
            let object = raw.as_object().ok_or_else(|| unexpected("object", raw))?;
            let mut entries = Vec::with_capacity(object.len());
            for (key, val) in object {
                entries.push((Value::String(key.clone()), decode_uidl(val, lookup)?));
            }
            Value::Map(entries)
        }
        other => return Err(CodecError::UnknownUidlTag(other.to_owned())),
    };
    Ok(value)
}

fn encode_items(items: &[Value]) -> Result<Vec<JsonValue>, CodecError> {
    items.iter().map(encode_uidl).collect()
}

fn decode_items(raw: &JsonValue, lookup: &dyn ConnectorLookup) -> Result<Vec<Value>, CodecError> {
    raw.as_array()
        .ok_or_else(|| unexpected("array", raw))?
        .iter()
        .map(|item| decode_uidl(item, lookup))
        .collect()
}

fn finite(v: f64) -> Result<f64, CodecError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CodecError::NonFiniteNumber(v))
    }
}

fn unexpected(expected: &str, found: &JsonValue) -> CodecError {
    CodecError::UnexpectedJson {
        expected: expected.to_owned(),
        found: json_kind(found),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::NoConnectors;

    #[test]
    fn scalar_tags() {
        assert_eq!(decode_uidl(&json!(["i", 5]), &NoConnectors), Ok(Value::Int(5)));
        assert_eq!(
            decode_uidl(&json!(["s", "x"]), &NoConnectors),
            Ok(Value::from("x"))
        );
        assert_eq!(
            decode_uidl(&json!(["b", true]), &NoConnectors),
            Ok(Value::Bool(true))
        );
        assert_eq!(decode_uidl(&json!(["s", null]), &NoConnectors), Ok(Value::Null));
    }

    #[test]
    fn int_overflow_is_rejected() {
        let err = decode_uidl(&json!(["i", 1_i64 << 40]), &NoConnectors).unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { ty: "int", .. }));
    }

    #[test]
    fn float_overflow_is_rejected() {
        let err = decode_uidl(&json!(["f", 1e300]), &NoConnectors).unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { ty: "float", .. }));
    }

    #[test]
    fn unknown_connector_decodes_to_null() {
        let known = |id: &ConnectorId| id.as_str() == "3";
        assert_eq!(
            decode_uidl(&json!(["c", "3"]), &known),
            Ok(Value::Connector("3".into()))
        );
        assert_eq!(decode_uidl(&json!(["c", "4"]), &known), Ok(Value::Null));
    }

    #[test]
    fn nested_collections() {
        let json = json!(["m", {"sizes": ["a", [["i", 1], ["i", 2]]]}]);
        let value = decode_uidl(&json, &NoConnectors).unwrap();
        assert_eq!(
            value,
            Value::Map(vec![(
                Value::from("sizes"),
                Value::Array(vec![Value::Int(1), Value::Int(2)])
            )])
        );
        assert_eq!(encode_uidl(&value).unwrap(), json);
    }

    #[test]
    fn malformed_pairs() {
        assert!(decode_uidl(&json!("i"), &NoConnectors).is_err());
        assert!(decode_uidl(&json!(["i"]), &NoConnectors).is_err());
        assert_eq!(
            decode_uidl(&json!(["q", 1]), &NoConnectors),
            Err(CodecError::UnknownUidlTag("q".into()))
        );
    }

    #[test]
    fn bytes_have_no_tagged_form() {
        assert_eq!(
            encode_uidl(&Value::Bytes(vec![1])),
            Err(CodecError::UnsupportedUidlValue("bytes"))
        );
    }
}
