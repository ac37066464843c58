//! Supplement decorator (spec §9: "decorator, not inheritance").
//!
//! A `CodeSystem` with `content = supplement` never stands alone — it
//! contributes additional designations, properties and (rarely) a
//! replacement display to a parent system's concepts. Rather than merging
//! supplement data into the base provider's own storage, this wraps the
//! base provider and answers `display`/`designations`/`properties` by
//! consulting the supplement first and falling back to the base.

use std::collections::HashMap;

use tx_core::{CodeSystem, ConceptDefinition, ConceptProperty, Designation};

use crate::error::ProviderError;
use crate::provider::{Capability, CodeSystemProvider, ConceptContext, FilterDeclaration};

struct SupplementEntry {
    display: Option<String>,
    designation: Vec<Designation>,
    property: Vec<ConceptProperty>,
}

fn flatten(concept: &ConceptDefinition, out: &mut HashMap<String, SupplementEntry>) {
    out.insert(
        concept.code.clone(),
        SupplementEntry {
            display: concept.display.clone(),
            designation: concept.designation.clone(),
            property: concept.property.clone(),
        },
    );
    for child in &concept.concept {
        flatten(child, out);
    }
}

/// Decorates a base provider with one supplement's additional data.
pub struct SupplementedProvider {
    base: Box<dyn CodeSystemProvider>,
    entries: HashMap<String, SupplementEntry>,
}

impl SupplementedProvider {
    /// `supplement` must have `content = "supplement"` and a `supplements`
    /// reference resolving to `base.system_url()`; the caller is
    /// responsible for having already verified that per spec §3's
    /// invariant before wrapping.
    pub fn new(base: Box<dyn CodeSystemProvider>, supplement: &CodeSystem) -> Self {
        let mut entries = HashMap::new();
        for concept in &supplement.concepts {
            flatten(concept, &mut entries);
        }
        Self { base, entries }
    }
}

impl CodeSystemProvider for SupplementedProvider {
    fn system_url(&self) -> &str {
        self.base.system_url()
    }

    fn version(&self) -> Option<&str> {
        self.base.version()
    }

    fn capability(&self) -> Capability {
        self.base.capability()
    }

    fn content_mode(&self) -> tx_core::ContentMode {
        self.base.content_mode()
    }

    fn case_sensitive(&self) -> bool {
        self.base.case_sensitive()
    }

    fn locate(&self, code: &str) -> Option<ConceptContext> {
        self.base.locate(code)
    }

    fn display(&self, concept: &ConceptContext, language: Option<&str>) -> Option<String> {
        if let Some(lang) = language {
            if let Some(entry) = self.entries.get(&concept.code) {
                if let Some(d) = entry
                    .designation
                    .iter()
                    .find(|d| d.language.as_deref() == Some(lang) && d.is_display)
                {
                    return Some(d.value.clone());
                }
            }
        }
        self.base.display(concept, language)
    }

    fn designations(&self, concept: &ConceptContext) -> Vec<Designation> {
        let mut out = self.base.designations(concept);
        if let Some(entry) = self.entries.get(&concept.code) {
            out.extend(entry.designation.iter().cloned());
        }
        out
    }

    fn is_abstract(&self, concept: &ConceptContext) -> bool {
        self.base.is_abstract(concept)
    }

    fn is_inactive(&self, concept: &ConceptContext) -> bool {
        self.base.is_inactive(concept)
    }

    fn properties(&self, concept: &ConceptContext) -> Vec<ConceptProperty> {
        let mut out = self.base.properties(concept);
        if let Some(entry) = self.entries.get(&concept.code) {
            out.extend(entry.property.iter().cloned());
        }
        out
    }

    fn all_concepts(&self) -> Option<Vec<ConceptContext>> {
        self.base.all_concepts()
    }

    fn filter_declarations(&self) -> Vec<FilterDeclaration> {
        self.base.filter_declarations()
    }

    fn filter(
        &self,
        property: &str,
        op: &str,
        value: &str,
    ) -> Result<Vec<ConceptContext>, ProviderError> {
        self.base.filter(property, op, value)
    }

    fn descends_from(&self, concept: &ConceptContext, ancestor_code: &str) -> bool {
        self.base.descends_from(concept, ancestor_code)
    }
}
