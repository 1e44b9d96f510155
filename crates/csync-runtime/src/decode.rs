#![forbid(unsafe_code)]

//! Burst → invocation decoding.
//!
//! A burst is a JSON array of `[connectorId, interface, method, [params]]`
//! tuples. The `("v", "v")` pair carries one legacy variable change,
//! `[name, [tag, value]]`; consecutive changes for the same connector are
//! folded into one [`LegacyChangeVariables`]. Everything else is an RPC call
//! whose parameters decode against the target connector's declared method.
//!
//! # Invariants
//!
//! 1. **Parse order**: decoded entries follow tuple order.
//! 2. **Adjacent merge only**: a legacy change merges into the previous entry
//!    only if that entry is a legacy invocation for the same connector; a
//!    rejected entry in between breaks the chain.
//! 3. **All or nothing on shape**: a malformed burst yields no entries at
//!    all, so nothing from it can be dispatched.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Invalid JSON | Corrupt or truncated burst | `ParseError::Json` |
//! | Wrong tuple shape | Client bug | `ParseError::Malformed` |
//! | Unknown connector | Client out of sync | `Decoded::Rejected` |
//! | Unknown method / arity | Version skew | `Decoded::Rejected` |
//! | Undecodable parameter | Type mismatch | `Decoded::Rejected` |

use core::fmt;

use csync_codec::{CodecError, ConnectorId, JsonCodec, JsonValue, uidl};
use csync_core::invocation::is_legacy_variable_change;
use csync_core::{
    Capabilities, ConnectorTracker, LegacyChangeVariables, MethodInvocation, ServerRpcCall,
};

use crate::burst::BurstError;

/// A burst that cannot be decoded at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Burst(BurstError),
    Json(String),
    Malformed {
        /// Tuple position, `None` for the burst itself.
        index: Option<usize>,
        reason: &'static str,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Burst(err) => write!(f, "invalid burst framing: {err}"),
            Self::Json(msg) => write!(f, "invalid burst JSON: {msg}"),
            Self::Malformed {
                index: Some(index),
                reason,
            } => write!(f, "malformed invocation {index}: {reason}"),
            Self::Malformed {
                index: None,
                reason,
            } => write!(f, "malformed burst: {reason}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Burst(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BurstError> for ParseError {
    fn from(err: BurstError) -> Self {
        Self::Burst(err)
    }
}

/// One tuple that decoded structurally but cannot be delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationError {
    UnknownConnector {
        connector: ConnectorId,
        interface: String,
        method: String,
    },
    NotVariableOwner {
        connector: ConnectorId,
    },
    UnknownMethod {
        connector: ConnectorId,
        interface: String,
        method: String,
    },
    ArityMismatch {
        connector: ConnectorId,
        interface: String,
        method: String,
        expected: usize,
        found: usize,
    },
    InvalidParameter {
        connector: ConnectorId,
        interface: String,
        method: String,
        index: usize,
        source: CodecError,
    },
    InvalidVariable {
        connector: ConnectorId,
        name: String,
        source: CodecError,
    },
}

impl InvocationError {
    #[must_use]
    pub fn connector(&self) -> &ConnectorId {
        match self {
            Self::UnknownConnector { connector, .. }
            | Self::NotVariableOwner { connector }
            | Self::UnknownMethod { connector, .. }
            | Self::ArityMismatch { connector, .. }
            | Self::InvalidParameter { connector, .. }
            | Self::InvalidVariable { connector, .. } => connector,
        }
    }

    /// Whether the session error handler hears about this rejection, not
    /// only the log.
    #[must_use]
    pub fn is_reported(&self) -> bool {
        matches!(self, Self::NotVariableOwner { .. })
    }

    /// The client addressed a connector the server does not have.
    #[must_use]
    pub fn is_unknown_connector(&self) -> bool {
        matches!(self, Self::UnknownConnector { .. })
    }
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownConnector {
                connector,
                interface,
                method,
            } => write!(f, "{interface}.{method} sent to unknown connector {connector}"),
            Self::NotVariableOwner { connector } => {
                write!(f, "variable change for {connector}, which owns no variables")
            }
            Self::UnknownMethod {
                connector,
                interface,
                method,
            } => write!(f, "connector {connector} has no method {interface}.{method}"),
            Self::ArityMismatch {
                connector,
                interface,
                method,
                expected,
                found,
            } => write!(
                f,
                "{interface}.{method} on {connector} takes {expected} parameters, got {found}"
            ),
            Self::InvalidParameter {
                connector,
                interface,
                method,
                index,
                source,
            } => write!(
                f,
                "parameter {index} of {interface}.{method} on {connector}: {source}"
            ),
            Self::InvalidVariable {
                connector,
                name,
                source,
            } => write!(f, "variable {name} of {connector}: {source}"),
        }
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidParameter { source, .. } | Self::InvalidVariable { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// One decoded burst entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Invocation(MethodInvocation),
    Rejected(InvocationError),
}

struct Tuple<'j> {
    connector: ConnectorId,
    interface: &'j str,
    method: &'j str,
    params: &'j [JsonValue],
}

impl<'j> Tuple<'j> {
    fn parse(index: usize, entry: &'j JsonValue) -> Result<Self, ParseError> {
        let malformed = |reason| ParseError::Malformed {
            index: Some(index),
            reason,
        };
        let Some([id, interface, method, params]) = entry.as_array().map(Vec::as_slice) else {
            return Err(malformed("expected [connectorId, interface, method, params]"));
        };
        let (Some(id), Some(interface), Some(method)) = (id.as_str(), interface.as_str(), method.as_str())
        else {
            return Err(malformed("connector id, interface and method must be strings"));
        };
        let Some(params) = params.as_array() else {
            return Err(malformed("parameters must be an array"));
        };
        Ok(Self {
            connector: ConnectorId::new(id),
            interface,
            method,
            params,
        })
    }
}

/// Decodes bursts against one root's connector tree.
pub struct InvocationDecoder<'a> {
    codec: &'a JsonCodec,
    tracker: &'a ConnectorTracker,
}

impl<'a> InvocationDecoder<'a> {
    #[must_use]
    pub fn new(codec: &'a JsonCodec, tracker: &'a ConnectorTracker) -> Self {
        Self { codec, tracker }
    }

    /// Decode one unescaped burst.
    ///
    /// # Errors
    ///
    /// [`ParseError`] if the burst is not a well-formed tuple array.
    pub fn decode_burst(&self, text: &str) -> Result<Vec<Decoded>, ParseError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let json: JsonValue =
            serde_json::from_str(text).map_err(|e| ParseError::Json(e.to_string()))?;
        let JsonValue::Array(entries) = &json else {
            return Err(ParseError::Malformed {
                index: None,
                reason: "burst is not an array",
            });
        };

        let mut decoded: Vec<Decoded> = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let tuple = Tuple::parse(index, entry)?;
            if !is_legacy_variable_change(tuple.interface, tuple.method) {
                decoded.push(match self.decode_rpc(&tuple) {
                    Ok(call) => Decoded::Invocation(MethodInvocation::Rpc(call)),
                    Err(err) => Decoded::Rejected(err),
                });
                continue;
            }

            let [name, raw] = tuple.params else {
                return Err(ParseError::Malformed {
                    index: Some(index),
                    reason: "variable change takes [name, value]",
                });
            };
            let Some(name) = name.as_str() else {
                return Err(ParseError::Malformed {
                    index: Some(index),
                    reason: "variable name must be a string",
                });
            };
            let value = match self.decode_variable(&tuple, name, raw) {
                Ok(value) => value,
                Err(err) => {
                    decoded.push(Decoded::Rejected(err));
                    continue;
                }
            };
            if let Some(Decoded::Invocation(MethodInvocation::Legacy(previous))) = decoded.last_mut()
            {
                if previous.connector_id == tuple.connector {
                    previous.merge(name, value);
                    continue;
                }
            }
            decoded.push(Decoded::Invocation(MethodInvocation::Legacy(
                LegacyChangeVariables::new(tuple.connector, name, value),
            )));
        }
        Ok(decoded)
    }

    fn decode_variable(
        &self,
        tuple: &Tuple<'_>,
        name: &str,
        raw: &JsonValue,
    ) -> Result<csync_codec::Value, InvocationError> {
        let Some(connector) = self.tracker.get(&tuple.connector) else {
            return Err(self.unknown_connector(tuple));
        };
        if !connector
            .capabilities()
            .contains(Capabilities::VARIABLE_OWNER)
        {
            return Err(InvocationError::NotVariableOwner {
                connector: tuple.connector.clone(),
            });
        }
        uidl::decode_uidl(raw, self.tracker).map_err(|source| InvocationError::InvalidVariable {
            connector: tuple.connector.clone(),
            name: name.to_owned(),
            source,
        })
    }

    fn decode_rpc(&self, tuple: &Tuple<'_>) -> Result<ServerRpcCall, InvocationError> {
        let Some(connector) = self.tracker.get(&tuple.connector) else {
            return Err(self.unknown_connector(tuple));
        };
        let Some(method) = connector.rpc_method(tuple.interface, tuple.method) else {
            return Err(InvocationError::UnknownMethod {
                connector: tuple.connector.clone(),
                interface: tuple.interface.to_owned(),
                method: tuple.method.to_owned(),
            });
        };
        if method.params.len() != tuple.params.len() {
            return Err(InvocationError::ArityMismatch {
                connector: tuple.connector.clone(),
                interface: tuple.interface.to_owned(),
                method: tuple.method.to_owned(),
                expected: method.params.len(),
                found: tuple.params.len(),
            });
        }

        let params = method
            .params
            .iter()
            .zip(tuple.params)
            .enumerate()
            .map(|(index, (ty, json))| {
                self.codec
                    .decode(ty, json, self.tracker)
                    .map_err(|source| InvocationError::InvalidParameter {
                        connector: tuple.connector.clone(),
                        interface: tuple.interface.to_owned(),
                        method: tuple.method.to_owned(),
                        index,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ServerRpcCall {
            connector_id: tuple.connector.clone(),
            interface: tuple.interface.to_owned(),
            method: tuple.method.to_owned(),
            params,
        })
    }

    fn unknown_connector(&self, tuple: &Tuple<'_>) -> InvocationError {
        InvocationError::UnknownConnector {
            connector: tuple.connector.clone(),
            interface: tuple.interface.to_owned(),
            method: tuple.method.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csync_codec::{TypeDescriptor, Value};
    use csync_core::rpc::RpcInterface;
    use csync_core::{Connector, ConnectorType, RpcMethod};
    use proptest::prelude::*;

    static ROOT: ConnectorType = ConnectorType::new("test.Root");
    static FIELD: ConnectorType = ConnectorType::new("test.Field");

    // ── Test connectors ──

    struct Field {
        rpc: RpcInterface,
    }

    impl Connector for Field {
        fn connector_type(&self) -> &'static ConnectorType {
            &FIELD
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::LEAF_COMPONENT | Capabilities::VARIABLE_OWNER | Capabilities::RPC_TARGET
        }
        fn rpc_method(&self, interface: &str, method: &str) -> Option<&RpcMethod> {
            (interface == self.rpc.name())
                .then(|| self.rpc.find(method))
                .flatten()
        }
    }

    struct Root;

    impl Connector for Root {
        fn connector_type(&self) -> &'static ConnectorType {
            &ROOT
        }
        fn capabilities(&self) -> Capabilities {
            Capabilities::CONTAINER | Capabilities::ROOT
        }
    }

    /// Root "0" with fields "1" and "2".
    fn tracker() -> ConnectorTracker {
        let mut tracker = ConnectorTracker::new();
        let root = tracker.set_root(Box::new(Root)).unwrap();
        for _ in 0..2 {
            tracker
                .attach(
                    &root,
                    Box::new(Field {
                        rpc: RpcInterface::new("test.FieldRpc")
                            .method("focus", [])
                            .method("resize", [TypeDescriptor::Int, TypeDescriptor::Int]),
                    }),
                )
                .unwrap();
        }
        tracker
    }

    fn decode(text: &str) -> Result<Vec<Decoded>, ParseError> {
        let codec = JsonCodec::default();
        let tracker = tracker();
        InvocationDecoder::new(&codec, &tracker).decode_burst(text)
    }

    #[test]
    fn consecutive_legacy_changes_merge() {
        let decoded = decode(
            r#"[["1","v","v",["a",["i",1]]],["1","v","v",["b",["s","x"]]],["2","v","v",["a",["b",true]]]]"#,
        )
        .unwrap();
        assert_eq!(decoded.len(), 2);
        let Decoded::Invocation(MethodInvocation::Legacy(first)) = &decoded[0] else {
            panic!("expected legacy invocation");
        };
        assert_eq!(first.connector_id.as_str(), "1");
        assert_eq!(first.changes.get("a"), Some(&Value::Int(1)));
        assert_eq!(first.changes.get("b"), Some(&Value::from("x")));
    }

    #[test]
    fn rpc_between_legacy_changes_breaks_merge() {
        let decoded = decode(
            r#"[["1","v","v",["a",["i",1]]],["1","test.FieldRpc","focus",[]],["1","v","v",["b",["i",2]]]]"#,
        )
        .unwrap();
        assert_eq!(decoded.len(), 3);
        assert!(matches!(
            decoded[1],
            Decoded::Invocation(MethodInvocation::Rpc(_))
        ));
    }

    #[test]
    fn rejected_entry_breaks_merge() {
        let decoded = decode(
            r#"[["1","v","v",["a",["i",1]]],["1","v","v",["b",["?",2]]],["1","v","v",["c",["i",3]]]]"#,
        )
        .unwrap();
        assert_eq!(decoded.len(), 3);
        assert!(matches!(
            &decoded[1],
            Decoded::Rejected(InvocationError::InvalidVariable { name, .. }) if name == "b"
        ));
    }

    #[test]
    fn rpc_params_decode_positionally() {
        let decoded = decode(r#"[["2","test.FieldRpc","resize",[640,480]]]"#).unwrap();
        let Decoded::Invocation(MethodInvocation::Rpc(call)) = &decoded[0] else {
            panic!("expected rpc");
        };
        assert_eq!(call.params, [Value::Int(640), Value::Int(480)]);
    }

    #[test]
    fn delivery_problems_are_rejections() {
        let decoded = decode(
            r#"[["9","test.FieldRpc","focus",[]],
                ["1","test.FieldRpc","blur",[]],
                ["1","test.FieldRpc","resize",[1]],
                ["1","test.FieldRpc","resize",["a","b"]],
                ["0","v","v",["x",["i",1]]]]"#,
        )
        .unwrap();
        let errors: Vec<_> = decoded
            .iter()
            .map(|d| match d {
                Decoded::Rejected(err) => err.clone(),
                Decoded::Invocation(_) => panic!("expected rejection"),
            })
            .collect();
        assert!(errors[0].is_unknown_connector());
        assert!(matches!(errors[1], InvocationError::UnknownMethod { .. }));
        assert!(matches!(
            errors[2],
            InvocationError::ArityMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
        assert!(matches!(
            errors[3],
            InvocationError::InvalidParameter { index: 0, .. }
        ));
        assert!(matches!(errors[4], InvocationError::NotVariableOwner { .. }));
    }

    #[test]
    fn shape_errors_are_fatal() {
        assert!(matches!(decode("[[\"1\""), Err(ParseError::Json(_))));
        assert!(matches!(
            decode("{}"),
            Err(ParseError::Malformed { index: None, .. })
        ));
        assert!(matches!(
            decode(r#"[["1","v","v",["a",["i",1]]],["1","i"]]"#),
            Err(ParseError::Malformed { index: Some(1), .. })
        ));
        assert!(matches!(
            decode(r#"[["1","v","v",["a"]]]"#),
            Err(ParseError::Malformed { index: Some(0), .. })
        ));
        assert!(decode("  ").unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn legacy_runs_collapse_per_connector(
            targets in proptest::collection::vec(prop_oneof![Just("1"), Just("2")], 1..12)
        ) {
            let tuples: Vec<String> = targets
                .iter()
                .enumerate()
                .map(|(i, id)| format!(r#"["{id}","v","v",["n{i}",["i",{i}]]]"#))
                .collect();
            let decoded = decode(&format!("[{}]", tuples.join(","))).unwrap();
            let mut runs = targets.clone();
            runs.dedup();
            prop_assert_eq!(decoded.len(), runs.len());
            let total: usize = decoded
                .iter()
                .map(|d| match d {
                    Decoded::Invocation(MethodInvocation::Legacy(l)) => l.changes.len(),
                    _ => 0,
                })
                .sum();
            prop_assert_eq!(total, targets.len());
        }
    }
}
