//! The code-system provider contract (spec §4.1).
//!
//! A provider answers questions about one `(system, version)` pair without
//! the engine needing to know whether the backing data is a small
//! enumerated list, a pattern-validated open system, a full concept
//! hierarchy, or a supplement layered over one of those. Capability is a
//! tag the provider declares rather than something the engine infers from
//! its type, per the redesign note in spec §9.

use serde_json::Value;
use tx_core::{ConceptProperty, ContentMode, Designation};

use crate::error::ProviderError;

/// The capability tag a provider declares (spec §4.1, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// A small, exhaustively enumerated concept list (ISO 4217, administrative-gender, ...).
    Enumerated,
    /// A pattern-validated system with no enumerable concept list (MIME
    /// types, URI). `all_concepts` always returns `None`; expansion yields
    /// `totalCount = -1`.
    Open,
    /// A full `CodeSystem`-backed concept hierarchy with parent/child
    /// relationships and declared filters.
    Hierarchical,
}

/// A lightweight handle to one located concept. Providers re-resolve by
/// `code` on each call rather than the engine holding borrowed references,
/// which keeps the trait object-safe and concepts cheap to pass around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptContext {
    pub code: String,
}

impl ConceptContext {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }
}

/// The `$subsumes` outcome (spec §4.4), matching FHIR's
/// `concept-subsumption-outcome` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsumption {
    Equivalent,
    Subsumes,
    SubsumedBy,
    NotSubsumed,
}

impl Subsumption {
    pub fn code(self) -> &'static str {
        match self {
            Self::Equivalent => "equivalent",
            Self::Subsumes => "subsumes",
            Self::SubsumedBy => "subsumed-by",
            Self::NotSubsumed => "not-subsumed",
        }
    }
}

/// A declared `CodeSystem.filter` entry a provider understands, per
/// spec §4.1 ("providers ... expose declared filter properties").
pub struct FilterDeclaration {
    pub property: String,
    pub ops: Vec<String>,
    pub documentation: Option<String>,
}

/// The provider contract itself.
pub trait CodeSystemProvider: Send + Sync {
    fn system_url(&self) -> &str;
    fn version(&self) -> Option<&str>;
    fn capability(&self) -> Capability;

    /// The backing `CodeSystem.content` mode (spec §3, §4.2 step 2).
    /// Enumerated and open built-ins are always treated as `complete`;
    /// only `HierarchicalProvider` is ever built from a `fragment`,
    /// `example`, or `supplement` resource.
    fn content_mode(&self) -> ContentMode {
        ContentMode::Complete
    }

    fn case_sensitive(&self) -> bool {
        true
    }

    /// Locate a concept by code. For case-insensitive systems, `code`
    /// should already be normalized by the caller if an exact match fails.
    fn locate(&self, code: &str) -> Option<ConceptContext>;

    /// Preferred display for `concept`, honoring `language` if the
    /// provider carries translated designations.
    fn display(&self, concept: &ConceptContext, language: Option<&str>) -> Option<String>;

    fn designations(&self, concept: &ConceptContext) -> Vec<Designation>;

    fn is_abstract(&self, concept: &ConceptContext) -> bool;

    fn is_inactive(&self, concept: &ConceptContext) -> bool;

    /// Provider-extended `property` entries surfaced by `$lookup` (spec
    /// §4.4's "provider-extended properties"), e.g. `parent`/`child`.
    fn properties(&self, concept: &ConceptContext) -> Vec<ConceptProperty>;

    /// Every concept this provider knows about, when enumerable. `None`
    /// for [`Capability::Open`] providers, whose expansions always report
    /// `totalCount = -1`.
    fn all_concepts(&self) -> Option<Vec<ConceptContext>>;

    /// The `CodeSystem.filter` entries this provider declares.
    fn filter_declarations(&self) -> Vec<FilterDeclaration> {
        Vec::new()
    }

    fn does_filter(&self, property: &str, op: &str) -> bool {
        self.filter_declarations()
            .iter()
            .any(|d| d.property == property && d.ops.iter().any(|o| o == op))
    }

    /// Evaluate one filter, returning the matching concepts.
    fn filter(
        &self,
        property: &str,
        op: &str,
        value: &str,
    ) -> Result<Vec<ConceptContext>, ProviderError>;

    /// Evaluate several filters conjunctively (spec §4.2: a `ConceptSet`'s
    /// filters are ANDed together).
    fn execute_filters(
        &self,
        filters: &[(String, String, String)],
    ) -> Result<Vec<ConceptContext>, ProviderError> {
        let mut result: Option<std::collections::HashSet<String>> = None;
        for (property, op, value) in filters {
            let matched: std::collections::HashSet<String> = self
                .filter(property, op, value)?
                .into_iter()
                .map(|c| c.code)
                .collect();
            result = Some(match result {
                Some(prev) => prev.intersection(&matched).cloned().collect(),
                None => matched,
            });
        }
        Ok(result
            .unwrap_or_default()
            .into_iter()
            .map(ConceptContext::new)
            .collect())
    }

    /// Is `concept` the same as, or a descendant of, `ancestor_code`?
    fn is_or_descends_from(&self, concept: &ConceptContext, ancestor_code: &str) -> bool {
        concept.code == ancestor_code || self.descends_from(concept, ancestor_code)
    }

    /// Does `concept` descend from (but differ from) `ancestor_code`?
    fn descends_from(&self, concept: &ConceptContext, ancestor_code: &str) -> bool;

    fn subsumes(&self, a: &ConceptContext, b: &ConceptContext) -> Subsumption {
        if a.code == b.code {
            Subsumption::Equivalent
        } else if self.is_or_descends_from(b, &a.code) {
            Subsumption::Subsumes
        } else if self.is_or_descends_from(a, &b.code) {
            Subsumption::SubsumedBy
        } else {
            Subsumption::NotSubsumed
        }
    }

    /// Arbitrary raw concept payload, used when a caller needs a field this
    /// trait doesn't surface directly (rare; kept as an escape hatch).
    fn raw(&self, _concept: &ConceptContext) -> Option<Value> {
        None
    }
}
