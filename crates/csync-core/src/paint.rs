#![forbid(unsafe_code)]

//! Legacy paint target.
//!
//! Connectors with [`Capabilities::LEGACY_PAINT`](crate::Capabilities::LEGACY_PAINT)
//! describe themselves as a flat attribute map plus variables, and may ask
//! for theme text resources to be inlined into the response.

use serde_json::{Map, Value as JsonValue};

/// Collects one connector's legacy paint output.
#[derive(Debug, Clone, Default)]
pub struct PaintTarget {
    attributes: Map<String, JsonValue>,
    variables: Map<String, JsonValue>,
    resources: Vec<String>,
}

impl PaintTarget {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_attribute(&mut self, name: impl Into<String>, value: impl Into<JsonValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn add_variable(&mut self, name: impl Into<String>, value: impl Into<JsonValue>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Ask for a theme text resource (e.g. a layout template) to be inlined.
    pub fn use_resource(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.resources.contains(&name) {
            self.resources.push(name);
        }
    }

    #[must_use]
    pub fn resources(&self) -> &[String] {
        &self.resources
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.variables.is_empty()
    }

    /// The `[tag, {attributes..., "v": {variables}}]` element for a change entry.
    #[must_use]
    pub fn into_element(self, tag: &str) -> (JsonValue, Vec<String>) {
        let mut body = self.attributes;
        if !self.variables.is_empty() {
            body.insert("v".to_owned(), JsonValue::Object(self.variables));
        }
        (
            JsonValue::Array(vec![JsonValue::String(tag.to_owned()), JsonValue::Object(body)]),
            self.resources,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn element_nests_variables() {
        let mut target = PaintTarget::new();
        target.add_attribute("caption", "Save");
        target.add_variable("text", "abc");
        target.use_resource("layouts/main.html");
        target.use_resource("layouts/main.html");
        let (element, resources) = target.into_element("3");
        assert_eq!(element, json!(["3", {"caption": "Save", "v": {"text": "abc"}}]));
        assert_eq!(resources, ["layouts/main.html"]);
    }

    #[test]
    fn empty_target() {
        let target = PaintTarget::new();
        assert!(target.is_empty());
        let (element, resources) = target.into_element("1");
        assert_eq!(element, json!(["1", {}]));
        assert!(resources.is_empty());
    }
}
