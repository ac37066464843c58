//! Hierarchical providers: a general `CodeSystem`-backed provider with
//! parent/child concept relationships, declared filters and subsumption
//! testing (spec §4.1). Grounded on the concept hierarchy walk a
//! `$expand`/`$subsumes` implementation needs: nested `concept` children
//! define the primary hierarchy, and an explicit `parent` property (for
//! systems that declare hierarchy via property rather than nesting) adds
//! further parent edges.

use std::collections::HashMap;

use regex::Regex;
use tx_core::{CodeSystem, ConceptDefinition, ConceptProperty, ContentMode, Designation};

use crate::error::ProviderError;
use crate::provider::{Capability, CodeSystemProvider, ConceptContext, FilterDeclaration};

struct IndexedConcept {
    definition: ConceptDefinition,
    parents: Vec<String>,
}

/// A provider backed by a `CodeSystem`'s own concept tree.
pub struct HierarchicalProvider {
    system_url: String,
    version: Option<String>,
    case_sensitive: bool,
    content: ContentMode,
    filter_properties: Vec<String>,
    index: HashMap<String, IndexedConcept>,
    order: Vec<String>,
}

impl HierarchicalProvider {
    /// Build a provider from a parsed `CodeSystem`. `content = fragment`
    /// systems are supported the same way as `complete` ones; the provider
    /// only ever answers about the concepts it was given.
    pub fn from_code_system(cs: &CodeSystem) -> Self {
        let mut index = HashMap::new();
        let mut order = Vec::new();
        for root in &cs.concepts {
            index_concept(root, None, &mut index, &mut order);
        }
        Self {
            system_url: cs.resource.url.clone(),
            version: cs.resource.version.clone(),
            case_sensitive: cs.case_sensitive,
            content: cs.content,
            filter_properties: cs.filter_properties.clone(),
            index,
            order,
        }
    }

    fn normalize(&self, code: &str) -> String {
        if self.case_sensitive {
            code.to_string()
        } else {
            code.to_lowercase()
        }
    }

    fn find_key(&self, code: &str) -> Option<String> {
        if self.index.contains_key(code) {
            return Some(code.to_string());
        }
        if !self.case_sensitive {
            let normalized = self.normalize(code);
            return self
                .order
                .iter()
                .find(|c| self.normalize(c) == normalized)
                .cloned();
        }
        None
    }

    fn ancestors(&self, code: &str) -> Vec<String> {
        let mut seen = Vec::new();
        let mut frontier = vec![code.to_string()];
        while let Some(current) = frontier.pop() {
            if let Some(c) = self.index.get(&current) {
                for parent in &c.parents {
                    if !seen.contains(parent) {
                        seen.push(parent.clone());
                        frontier.push(parent.clone());
                    }
                }
            }
        }
        seen
    }
}

fn index_concept(
    concept: &ConceptDefinition,
    parent: Option<&str>,
    index: &mut HashMap<String, IndexedConcept>,
    order: &mut Vec<String>,
) {
    let mut parents: Vec<String> = parent.map(|p| vec![p.to_string()]).unwrap_or_default();
    if let Some(prop) = concept
        .property
        .iter()
        .find(|p| p.code == "parent")
        .and_then(|p| p.value.as_str())
    {
        if !parents.iter().any(|p| p == prop) {
            parents.push(prop.to_string());
        }
    }

    order.push(concept.code.clone());
    index.insert(
        concept.code.clone(),
        IndexedConcept {
            definition: concept.clone(),
            parents,
        },
    );

    for child in &concept.concept {
        index_concept(child, Some(&concept.code), index, order);
    }
}

impl CodeSystemProvider for HierarchicalProvider {
    fn system_url(&self) -> &str {
        &self.system_url
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn capability(&self) -> Capability {
        Capability::Hierarchical
    }

    fn content_mode(&self) -> ContentMode {
        self.content
    }

    fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn locate(&self, code: &str) -> Option<ConceptContext> {
        self.find_key(code).map(ConceptContext::new)
    }

    fn display(&self, concept: &ConceptContext, language: Option<&str>) -> Option<String> {
        let indexed = self.index.get(&concept.code)?;
        if let Some(lang) = language {
            if let Some(desig) = indexed
                .definition
                .designation
                .iter()
                .find(|d| d.language.as_deref() == Some(lang) && d.is_display)
            {
                return Some(desig.value.clone());
            }
        }
        indexed.definition.display.clone()
    }

    fn designations(&self, concept: &ConceptContext) -> Vec<Designation> {
        self.index
            .get(&concept.code)
            .map(|c| c.definition.designation.clone())
            .unwrap_or_default()
    }

    fn is_abstract(&self, concept: &ConceptContext) -> bool {
        self.index
            .get(&concept.code)
            .map(|c| {
                c.definition
                    .property
                    .iter()
                    .any(|p| p.code == "notSelectable" && p.value.as_bool() == Some(true))
            })
            .unwrap_or(false)
    }

    fn is_inactive(&self, concept: &ConceptContext) -> bool {
        self.index
            .get(&concept.code)
            .map(|c| {
                c.definition
                    .property
                    .iter()
                    .any(|p| p.code == "status" && p.value.as_str() == Some("inactive"))
            })
            .unwrap_or(false)
    }

    fn properties(&self, concept: &ConceptContext) -> Vec<ConceptProperty> {
        self.index
            .get(&concept.code)
            .map(|c| c.definition.property.clone())
            .unwrap_or_default()
    }

    fn all_concepts(&self) -> Option<Vec<ConceptContext>> {
        Some(self.order.iter().cloned().map(ConceptContext::new).collect())
    }

    fn filter_declarations(&self) -> Vec<FilterDeclaration> {
        let mut declarations = vec![
            FilterDeclaration {
                property: "code".to_string(),
                ops: vec!["=".to_string(), "in".to_string()],
                documentation: None,
            },
            FilterDeclaration {
                property: "concept".to_string(),
                ops: vec!["is-a".to_string(), "descendent-of".to_string()],
                documentation: None,
            },
        ];
        for prop in &self.filter_properties {
            declarations.push(FilterDeclaration {
                property: prop.clone(),
                ops: vec!["=".to_string(), "regex".to_string()],
                documentation: None,
            });
        }
        declarations
    }

    fn filter(
        &self,
        property: &str,
        op: &str,
        value: &str,
    ) -> Result<Vec<ConceptContext>, ProviderError> {
        match (property, op) {
            ("code", "=") => Ok(self
                .find_key(value)
                .into_iter()
                .map(ConceptContext::new)
                .collect()),
            ("code", "in") => {
                let wanted: Vec<&str> = value.split(',').map(|s| s.trim()).collect();
                Ok(self
                    .order
                    .iter()
                    .filter(|c| wanted.contains(&c.as_str()))
                    .cloned()
                    .map(ConceptContext::new)
                    .collect())
            }
            ("concept", "is-a") => Ok(self
                .order
                .iter()
                .filter(|c| self.is_or_descends_from(&ConceptContext::new((*c).clone()), value))
                .cloned()
                .map(ConceptContext::new)
                .collect()),
            ("concept", "descendent-of") => Ok(self
                .order
                .iter()
                .filter(|c| self.descends_from(&ConceptContext::new((*c).clone()), value))
                .cloned()
                .map(ConceptContext::new)
                .collect()),
            _ if op == "=" => Ok(self
                .order
                .iter()
                .filter(|code| {
                    self.index[*code]
                        .definition
                        .property
                        .iter()
                        .any(|p| p.code == property && p.value.as_str() == Some(value))
                })
                .cloned()
                .map(ConceptContext::new)
                .collect()),
            _ if op == "regex" => {
                let re = Regex::new(value)
                    .map_err(|_| ProviderError::FilterNotSupported {
                        property: property.to_string(),
                        op: op.to_string(),
                    })?;
                Ok(self
                    .order
                    .iter()
                    .filter(|code| {
                        self.index[*code].definition.property.iter().any(|p| {
                            p.code == property
                                && p.value.as_str().map(|v| re.is_match(v)).unwrap_or(false)
                        })
                    })
                    .cloned()
                    .map(ConceptContext::new)
                    .collect())
            }
            _ => Err(ProviderError::FilterNotSupported {
                property: property.to_string(),
                op: op.to_string(),
            }),
        }
    }

    fn descends_from(&self, concept: &ConceptContext, ancestor_code: &str) -> bool {
        if concept.code == ancestor_code {
            return false;
        }
        self.ancestors(&concept.code).iter().any(|a| a == ancestor_code)
    }
}
