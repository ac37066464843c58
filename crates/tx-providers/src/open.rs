//! Open (pattern-validated) providers: systems with no enumerable concept
//! list, where membership is decided by a pattern rather than a lookup
//! table (spec §4.1). Expansions over an open system report
//! `totalCount = -1`.

use regex::Regex;
use tx_core::{ConceptProperty, Designation};

use crate::error::ProviderError;
use crate::provider::{Capability, CodeSystemProvider, ConceptContext};

/// A system validated by a regular expression, e.g. MIME types or URIs.
pub struct OpenProvider {
    system_url: String,
    version: Option<String>,
    pattern: Regex,
}

impl OpenProvider {
    pub fn new(system_url: impl Into<String>, version: Option<String>, pattern: Regex) -> Self {
        Self {
            system_url: system_url.into(),
            version,
            pattern,
        }
    }

    /// `urn:ietf:bcp:13` MIME type media ranges (`type/subtype`).
    pub fn mime_type() -> Self {
        Self::new(
            "urn:ietf:bcp:13",
            None,
            Regex::new(r"^[\w.+-]+/[\w.+-]+$").expect("static pattern is valid"),
        )
    }

    /// Any absolute URI.
    pub fn uri() -> Self {
        Self::new(
            "urn:ietf:rfc:3986",
            None,
            Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:\S+$").expect("static pattern is valid"),
        )
    }
}

impl CodeSystemProvider for OpenProvider {
    fn system_url(&self) -> &str {
        &self.system_url
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn capability(&self) -> Capability {
        Capability::Open
    }

    fn locate(&self, code: &str) -> Option<ConceptContext> {
        self.pattern
            .is_match(code)
            .then(|| ConceptContext::new(code))
    }

    fn display(&self, concept: &ConceptContext, _language: Option<&str>) -> Option<String> {
        Some(concept.code.clone())
    }

    fn designations(&self, _concept: &ConceptContext) -> Vec<Designation> {
        Vec::new()
    }

    fn is_abstract(&self, _concept: &ConceptContext) -> bool {
        false
    }

    fn is_inactive(&self, _concept: &ConceptContext) -> bool {
        false
    }

    fn properties(&self, _concept: &ConceptContext) -> Vec<ConceptProperty> {
        Vec::new()
    }

    fn all_concepts(&self) -> Option<Vec<ConceptContext>> {
        None
    }

    fn filter(
        &self,
        property: &str,
        op: &str,
        _value: &str,
    ) -> Result<Vec<ConceptContext>, ProviderError> {
        Err(ProviderError::FilterNotSupported {
            property: property.to_string(),
            op: op.to_string(),
        })
    }

    fn descends_from(&self, _concept: &ConceptContext, _ancestor_code: &str) -> bool {
        false
    }
}
