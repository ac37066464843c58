//! Uniform operation-parameter ingestion (spec §6).
//!
//! Every route accepts the same logical parameter bag whether it arrived as
//! a GET query string, a POST form, or a POST `Parameters` resource body;
//! `tx-server`'s axum handlers normalize whichever shape they received into
//! a [`ParameterBag`] before calling into `tx-engine`, so the engine never
//! has to know which transport carried a request.

use serde_json::{Value, json};
use std::collections::HashMap;

/// A normalized bag of operation parameters, held internally as a FHIR
/// `Parameters` resource `Value`.
#[derive(Debug, Clone)]
pub struct ParameterBag(Value);

impl ParameterBag {
    /// Build a bag from GET query parameters or POST form fields, each
    /// becoming a `valueString` parameter entry.
    pub fn from_flat_map(params: HashMap<String, String>) -> Self {
        let parameter: Vec<Value> = params
            .into_iter()
            .map(|(name, value)| json!({"name": name, "valueString": value}))
            .collect();
        Self(json!({"resourceType": "Parameters", "parameter": parameter}))
    }

    /// Build a bag from a POST body: used as-is if it's already a
    /// `Parameters` resource, otherwise wrapped as a single `resource`
    /// parameter (for a bare `CodeSystem`/`ValueSet` POST body).
    pub fn from_body(value: Value) -> Self {
        if value.get("resourceType").and_then(|v| v.as_str()) == Some("Parameters") {
            Self(value)
        } else {
            Self(json!({
                "resourceType": "Parameters",
                "parameter": [{"name": "resource", "resource": value}],
            }))
        }
    }

    pub fn empty() -> Self {
        Self(json!({"resourceType": "Parameters", "parameter": []}))
    }

    fn entries(&self) -> impl Iterator<Item = &Value> {
        self.0
            .get("parameter")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
    }

    /// First value of `name`, whichever `value[x]` field or `resource` it
    /// was carried in.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.entries()
            .find(|p| p.get("name").and_then(|n| n.as_str()) == Some(name))
            .and_then(value_field)
    }

    /// All values of `name`, in order, for repeating parameters (e.g.
    /// multiple `filter` or `designation` entries).
    pub fn get_all(&self, name: &str) -> Vec<Value> {
        self.entries()
            .filter(|p| p.get("name").and_then(|n| n.as_str()) == Some(name))
            .filter_map(value_field)
            .collect()
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|v| v.as_str().map(String::from))
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(|v| v.as_bool())
    }

    pub fn get_u32(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(|v| {
            v.as_u64()
                .map(|n| n as u32)
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
    }

    pub fn get_resource(&self, name: &str) -> Option<Value> {
        self.get(name).filter(|v| v.is_object())
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

fn value_field(p: &Value) -> Option<Value> {
    p.as_object().and_then(|obj| {
        obj.iter()
            .find(|(k, _)| k.starts_with("value") || *k == "resource")
            .map(|(_, v)| v.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_map_becomes_value_string_parameters() {
        let mut m = HashMap::new();
        m.insert("code".to_string(), "123".to_string());
        let bag = ParameterBag::from_flat_map(m);
        assert_eq!(bag.get_string("code"), Some("123".to_string()));
    }

    #[test]
    fn bare_resource_body_is_wrapped() {
        let bag = ParameterBag::from_body(json!({"resourceType": "ValueSet", "url": "http://x"}));
        let resource = bag.get_resource("resource").unwrap();
        assert_eq!(resource["resourceType"], "ValueSet");
    }

    #[test]
    fn parameters_resource_is_used_verbatim() {
        let body = json!({
            "resourceType": "Parameters",
            "parameter": [{"name": "code", "valueCode": "active"}],
        });
        let bag = ParameterBag::from_body(body);
        assert_eq!(bag.get_string("code"), Some("active".to_string()));
    }

    #[test]
    fn repeating_parameters_collect_in_order() {
        let body = json!({
            "resourceType": "Parameters",
            "parameter": [
                {"name": "code", "valueCode": "a"},
                {"name": "code", "valueCode": "b"},
            ],
        });
        let bag = ParameterBag::from_body(body);
        let codes = bag.get_all("code");
        assert_eq!(codes.len(), 2);
        assert_eq!(codes[0], "a");
        assert_eq!(codes[1], "b");
    }

    #[test]
    fn empty_bag_is_empty() {
        assert!(ParameterBag::empty().is_empty());
        assert!(!ParameterBag::from_flat_map(HashMap::from([("a".into(), "b".into())])).is_empty());
    }
}
