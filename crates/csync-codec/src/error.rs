#![forbid(unsafe_code)]

use core::fmt;

/// Errors raised while encoding or decoding values.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecError {
    /// The value variant does not fit the declared type.
    TypeMismatch { expected: String, found: String },
    /// The JSON shape does not fit the declared type.
    UnexpectedJson { expected: String, found: String },
    /// An enum value names no declared variant.
    UnknownVariant { enum_name: String, variant: String },
    /// A `Named` type with no registered serializer.
    UnknownType(String),
    /// A custom serializer was registered for a built-in type.
    ReservedType(String),
    /// A bean type not marked serializable under strict checking.
    NotSerializable(String),
    /// NaN or infinite floating point values have no JSON form.
    NonFiniteNumber(f64),
    /// Integer does not fit the declared width.
    OutOfRange { ty: &'static str, value: String },
    /// A base64 payload could not be decoded.
    InvalidBytes(String),
    /// A `[tag, value]` legacy value with an unknown tag.
    UnknownUidlTag(String),
    /// A value variant that has no legacy wire form.
    UnsupportedUidlValue(&'static str),
    /// A custom serializer reported a failure.
    Custom(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "cannot encode {found} value as {expected}")
            }
            Self::UnexpectedJson { expected, found } => {
                write!(f, "expected JSON for {expected}, found {found}")
            }
            Self::UnknownVariant { enum_name, variant } => {
                write!(f, "'{variant}' is not a variant of {enum_name}")
            }
            Self::UnknownType(name) => write!(f, "no serializer registered for type {name}"),
            Self::ReservedType(name) => {
                write!(f, "type {name} is built in and cannot have a custom serializer")
            }
            Self::NotSerializable(name) => write!(f, "type {name} is not serializable"),
            Self::NonFiniteNumber(v) => write!(f, "non-finite number {v} cannot be encoded"),
            Self::OutOfRange { ty, value } => write!(f, "{value} does not fit in {ty}"),
            Self::InvalidBytes(msg) => write!(f, "invalid base64 payload: {msg}"),
            Self::UnknownUidlTag(tag) => write!(f, "unknown value tag '{tag}'"),
            Self::UnsupportedUidlValue(kind) => {
                write!(f, "{kind} values cannot be sent as variable changes")
            }
            Self::Custom(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for CodecError {}

/// Short name of a JSON node's kind, for error messages.
pub(crate) fn json_kind(json: &serde_json::Value) -> String {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
    .to_owned()
}
