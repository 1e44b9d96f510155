#![forbid(unsafe_code)]

//! Decoded client invocations.

use csync_codec::{ConnectorId, Value};

use crate::rpc::ServerRpcCall;

/// Interface name marking a legacy variable change.
pub const LEGACY_VARIABLE_INTERFACE: &str = "v";
/// Method name marking a legacy variable change.
pub const LEGACY_VARIABLE_METHOD: &str = "v";
/// Variable whose sole `true` value closes a window even when disabled.
pub const CLOSE_VARIABLE: &str = "close";

/// Whether an `(interface, method)` pair is the legacy variable change.
#[must_use]
pub fn is_legacy_variable_change(interface: &str, method: &str) -> bool {
    interface == LEGACY_VARIABLE_INTERFACE && method == LEGACY_VARIABLE_METHOD
}

/// Ordered name → value bag; setting an existing name overwrites it in place.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableChanges {
    entries: Vec<(String, Value)>,
}

impl VariableChanges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Coalesced legacy variable changes for one connector.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyChangeVariables {
    pub connector_id: ConnectorId,
    pub changes: VariableChanges,
}

impl LegacyChangeVariables {
    #[must_use]
    pub fn new(connector_id: ConnectorId, name: impl Into<String>, value: Value) -> Self {
        let mut changes = VariableChanges::new();
        changes.set(name, value);
        Self {
            connector_id,
            changes,
        }
    }

    /// Fold one more change into this invocation.
    pub fn merge(&mut self, name: impl Into<String>, value: Value) {
        self.changes.set(name, value);
    }

    /// A lone `close = true`, which is delivered even to disabled connectors.
    #[must_use]
    pub fn is_close_signal(&self) -> bool {
        self.changes.len() == 1 && self.changes.get(CLOSE_VARIABLE) == Some(&Value::Bool(true))
    }
}

/// One decoded client request.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodInvocation {
    Legacy(LegacyChangeVariables),
    Rpc(ServerRpcCall),
}

impl MethodInvocation {
    #[must_use]
    pub fn connector_id(&self) -> &ConnectorId {
        match self {
            Self::Legacy(legacy) => &legacy.connector_id,
            Self::Rpc(call) => &call.connector_id,
        }
    }

    #[must_use]
    pub fn interface_name(&self) -> &str {
        match self {
            Self::Legacy(_) => LEGACY_VARIABLE_INTERFACE,
            Self::Rpc(call) => &call.interface,
        }
    }

    #[must_use]
    pub fn method_name(&self) -> &str {
        match self {
            Self::Legacy(_) => LEGACY_VARIABLE_METHOD,
            Self::Rpc(call) => &call.method,
        }
    }

    #[must_use]
    pub fn as_legacy(&self) -> Option<&LegacyChangeVariables> {
        match self {
            Self::Legacy(legacy) => Some(legacy),
            Self::Rpc(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn close_signal_requires_sole_true_close() {
        let close = LegacyChangeVariables::new("1".into(), "close", Value::Bool(true));
        assert!(close.is_close_signal());

        let mut with_extra = close.clone();
        with_extra.merge("pos", Value::Int(3));
        assert!(!with_extra.is_close_signal());

        let false_close = LegacyChangeVariables::new("1".into(), "close", Value::Bool(false));
        assert!(!false_close.is_close_signal());
    }

    #[test]
    fn merge_overwrites_in_place() {
        let mut legacy = LegacyChangeVariables::new("1".into(), "a", Value::Int(1));
        legacy.merge("b", Value::Int(2));
        legacy.merge("a", Value::Int(3));
        let names: Vec<_> = legacy.changes.names().collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(legacy.changes.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn legacy_pair_detection() {
        assert!(is_legacy_variable_change("v", "v"));
        assert!(!is_legacy_variable_change("v", "click"));
    }

    proptest! {
        #[test]
        fn last_write_wins_and_names_stay_unique(
            writes in proptest::collection::vec(("[a-d]", any::<i32>()), 1..20)
        ) {
            let mut changes = VariableChanges::new();
            for (name, value) in &writes {
                changes.set(name.clone(), Value::Int(*value));
            }
            let mut names: Vec<_> = changes.names().collect();
            let total = names.len();
            names.sort_unstable();
            names.dedup();
            prop_assert_eq!(names.len(), total);
            for (name, _) in &writes {
                let last = writes.iter().rev().find(|(n, _)| n == name).map(|(_, v)| *v);
                let expected = last.map(Value::Int);
                prop_assert_eq!(changes.get(name), expected.as_ref());
            }
        }
    }
}
