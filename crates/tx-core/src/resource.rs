//! Canonical resource model (spec §3).
//!
//! `CanonicalResource` is the common identity wrapper every `CodeSystem` and
//! `ValueSet` carries: a `url`, an optional `version`, the composite `vurl`,
//! `status`, `name`/`title`, and the opaque normalized payload. The payload
//! is always presented as if it were the newest supported FHIR schema —
//! translation happens once, at construction, via [`crate::fhir::normalize_on_ingress`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PublicationStatus {
    Draft,
    #[default]
    Active,
    Retired,
    Unknown,
}

/// Identity and metadata shared by every canonical resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalResource {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: PublicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The opaque, normalized (newest-schema) payload this resource was
    /// built from. Kept around so the engine can read fields the typed
    /// wrappers below don't surface (extensions, narrative, etc.).
    #[serde(skip)]
    pub raw: Value,
}

impl CanonicalResource {
    /// The composite `url|version` identifier spec §3 calls `vurl`.
    pub fn vurl(&self) -> String {
        match &self.version {
            Some(v) => format!("{}|{}", self.url, v),
            None => self.url.clone(),
        }
    }

    pub fn from_value(raw: Value) -> Result<Self, String> {
        let url = raw
            .get("url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "canonical resource is missing 'url'".to_string())?
            .to_string();
        let version = raw
            .get("version")
            .and_then(|v| v.as_str())
            .map(String::from);
        let status = raw
            .get("status")
            .and_then(|v| v.as_str())
            .map(|s| match s {
                "draft" => PublicationStatus::Draft,
                "retired" => PublicationStatus::Retired,
                "active" => PublicationStatus::Active,
                _ => PublicationStatus::Unknown,
            })
            .unwrap_or_default();
        let name = raw.get("name").and_then(|v| v.as_str()).map(String::from);
        let title = raw.get("title").and_then(|v| v.as_str()).map(String::from);

        Ok(Self {
            url,
            version,
            status,
            name,
            title,
            raw,
        })
    }
}

/// `CodeSystem.content` per spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentMode {
    NotPresent,
    Example,
    Fragment,
    Complete,
    Supplement,
}

impl ContentMode {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "not-present" => Self::NotPresent,
            "example" => Self::Example,
            "fragment" => Self::Fragment,
            "complete" => Self::Complete,
            "supplement" => Self::Supplement,
            _ => return None,
        })
    }
}

/// A concept in a `CodeSystem`'s hierarchical concept tree.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConceptDefinition {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub designation: Vec<Designation>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub property: Vec<ConceptProperty>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub concept: Vec<ConceptDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptProperty {
    pub code: String,
    pub value: Value,
}

/// `(language, use, value, isDisplay, isActive)` per spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Designation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<Value>,
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_display: bool,
    #[serde(default = "default_true", skip_serializing_if = "std::ops::Not::not")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// A `CodeSystem` canonical resource.
#[derive(Debug, Clone)]
pub struct CodeSystem {
    pub resource: CanonicalResource,
    pub content: ContentMode,
    /// Parent system this supplement contributes to (`supplements`), with
    /// an optional pinned version.
    pub supplements: Option<(String, Option<String>)>,
    pub concepts: Vec<ConceptDefinition>,
    pub filter_properties: Vec<String>,
    pub case_sensitive: bool,
}

impl CodeSystem {
    pub fn from_value(raw: Value) -> Result<Self, String> {
        let resource = CanonicalResource::from_value(raw.clone())?;
        let content = raw
            .get("content")
            .and_then(|v| v.as_str())
            .and_then(ContentMode::parse)
            .unwrap_or(ContentMode::Complete);

        if content == ContentMode::Supplement && raw.get("supplements").is_none() {
            return Err(format!(
                "CodeSystem '{}' has content=supplement but no 'supplements' reference",
                resource.url
            ));
        }

        let supplements = raw.get("supplements").and_then(|v| v.as_str()).map(|s| {
            match s.split_once('|') {
                Some((url, ver)) => (url.to_string(), Some(ver.to_string())),
                None => (s.to_string(), None),
            }
        });

        let concepts = raw
            .get("concept")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|c| serde_json::from_value(c.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        let filter_properties = raw
            .get("filter")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|f| f.get("code").and_then(|c| c.as_str()).map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let case_sensitive = raw
            .get("caseSensitive")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        Ok(Self {
            resource,
            content,
            supplements,
            concepts,
            filter_properties,
            case_sensitive,
        })
    }
}

/// One entry of a `ValueSet.compose.include`/`exclude` list (`ConceptSet`).
#[derive(Debug, Clone, Default)]
pub struct ConceptSet {
    pub system: Option<String>,
    pub version: Option<String>,
    pub concepts: Vec<ConceptReference>,
    pub filters: Vec<ConceptSetFilter>,
    pub value_sets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConceptReference {
    pub code: String,
    pub display: Option<String>,
    pub designation: Vec<Designation>,
}

#[derive(Debug, Clone)]
pub struct ConceptSetFilter {
    pub property: String,
    pub op: String,
    pub value: String,
}

impl ConceptSet {
    pub fn from_value(raw: &Value) -> Result<Self, String> {
        let system = raw.get("system").and_then(|v| v.as_str()).map(String::from);
        let version = raw
            .get("version")
            .and_then(|v| v.as_str())
            .map(String::from);

        if system.is_none() && raw.get("valueSet").and_then(|v| v.as_array()).is_none() {
            return Err("ConceptSet must have a 'system' or import 'valueSet'".to_string());
        }

        let has_concepts = raw.get("concept").is_some();
        let has_filters = raw.get("filter").is_some();
        if has_concepts && has_filters {
            return Err(
                "ConceptSet cannot declare both explicit 'concept' and 'filter' entries"
                    .to_string(),
            );
        }

        let concepts = raw
            .get("concept")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|c| {
                        let code = c.get("code").and_then(|v| v.as_str())?.to_string();
                        let display = c.get("display").and_then(|v| v.as_str()).map(String::from);
                        let designation = c
                            .get("designation")
                            .and_then(|v| v.as_array())
                            .map(|arr| {
                                arr.iter()
                                    .filter_map(|d| serde_json::from_value(d.clone()).ok())
                                    .collect()
                            })
                            .unwrap_or_default();
                        Some(ConceptReference {
                            code,
                            display,
                            designation,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let filters = raw
            .get("filter")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|f| {
                        Some(ConceptSetFilter {
                            property: f.get("property")?.as_str()?.to_string(),
                            op: f.get("op")?.as_str()?.to_string(),
                            value: f.get("value")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let value_sets = raw
            .get("valueSet")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            system,
            version,
            concepts,
            filters,
            value_sets,
        })
    }
}

/// A `ValueSet` canonical resource.
#[derive(Debug, Clone)]
pub struct ValueSet {
    pub resource: CanonicalResource,
    pub include: Vec<ConceptSet>,
    pub exclude: Vec<ConceptSet>,
    /// A prebuilt `expansion`, if the resource carries one.
    pub expansion: Option<Value>,
}

impl ValueSet {
    pub fn from_value(raw: Value) -> Result<Self, String> {
        let resource = CanonicalResource::from_value(raw.clone())?;

        let mut include = Vec::new();
        let mut exclude = Vec::new();
        if let Some(compose) = raw.get("compose") {
            if let Some(arr) = compose.get("include").and_then(|v| v.as_array()) {
                for entry in arr {
                    include.push(ConceptSet::from_value(entry)?);
                }
            }
            if let Some(arr) = compose.get("exclude").and_then(|v| v.as_array()) {
                for entry in arr {
                    exclude.push(ConceptSet::from_value(entry)?);
                }
            }
        }

        let expansion = raw.get("expansion").cloned();

        Ok(Self {
            resource,
            include,
            exclude,
            expansion,
        })
    }

    pub fn has_compose(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vurl_includes_version_when_present() {
        let r = CanonicalResource::from_value(json!({
            "url": "http://example.org/cs",
            "version": "1.2.0",
        }))
        .unwrap();
        assert_eq!(r.vurl(), "http://example.org/cs|1.2.0");
    }

    #[test]
    fn vurl_is_bare_url_without_version() {
        let r = CanonicalResource::from_value(json!({"url": "http://example.org/cs"})).unwrap();
        assert_eq!(r.vurl(), "http://example.org/cs");
    }

    #[test]
    fn supplement_without_parent_is_rejected() {
        let err = CodeSystem::from_value(json!({
            "url": "http://example.org/supp",
            "content": "supplement",
        }))
        .unwrap_err();
        assert!(err.contains("supplements"));
    }

    #[test]
    fn concept_set_rejects_concept_and_filter_together() {
        let err = ConceptSet::from_value(&json!({
            "system": "http://example.org/cs",
            "concept": [{"code": "a"}],
            "filter": [{"property": "p", "op": "=", "value": "v"}],
        }))
        .unwrap_err();
        assert!(err.contains("both"));
    }

    #[test]
    fn concept_set_requires_system_or_valueset() {
        assert!(ConceptSet::from_value(&json!({})).is_err());
        assert!(ConceptSet::from_value(&json!({"valueSet": ["http://x"]})).is_ok());
    }
}
