//! Value-set expansion (spec §4.2).
//!
//! Excludes are processed first to build an exclusion set, then includes
//! are gathered (explicit concepts, filters, whole-system, or imported
//! value sets) and deduplicated by `(system, code)`. A text filter and
//! offset/count paging are applied last, and the whole pipeline respects
//! the request's deadline budget and cycle-detection path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tx_core::{ConceptSet, ContentMode, Designation, OperationContext, Result, TxError, ValueSet};
use tx_providers::CodeSystemProvider;

use crate::resolver::ResourceResolver;

#[derive(Debug, Clone)]
pub struct ExpandRequest {
    pub filter_text: Option<String>,
    pub offset: usize,
    pub count: Option<usize>,
    pub include_designations: bool,
    pub include_definition: bool,
    pub active_only: bool,
    pub exclude_nested: bool,
    pub display_language: Option<String>,
    /// Hard ceiling on the number of concepts considered before the
    /// expansion gives up with `TooCostly` (spec §5: bounded resource use).
    pub max_concepts: usize,
    /// `incomplete-ok`: tolerate an unresolvable code system (skip it with
    /// an informational note instead of a fatal error) and permit
    /// `fragment`/`example` content systems to be included (spec §4.2
    /// step 2). Never waives the `not-present`/`supplement` refusal.
    pub incomplete_ok: bool,
    /// `system-version=url|version`: default version to resolve a system
    /// at when an include doesn't pin one of its own.
    pub system_version: Vec<(String, String)>,
    /// `force-system-version=url|version`: overrides any include-level
    /// `version` for that system.
    pub force_system_version: Vec<(String, String)>,
    /// `check-system-version=url|version`: fails the expansion when an
    /// include pins a version of that system other than this one.
    pub check_system_version: Vec<(String, String)>,
}

impl Default for ExpandRequest {
    fn default() -> Self {
        Self {
            filter_text: None,
            offset: 0,
            count: None,
            include_designations: false,
            include_definition: false,
            active_only: true,
            exclude_nested: false,
            display_language: None,
            max_concepts: 100_000,
            incomplete_ok: false,
            system_version: Vec::new(),
            force_system_version: Vec::new(),
            check_system_version: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpandedConcept {
    pub system: String,
    pub version: Option<String>,
    pub code: String,
    pub display: Option<String>,
    pub designation: Vec<Designation>,
    pub inactive: bool,
    pub is_abstract: bool,
}

#[derive(Debug, Clone)]
pub struct ExpansionResult {
    pub total: usize,
    pub offset: usize,
    pub concepts: Vec<ExpandedConcept>,
}

pub struct Expander<'a> {
    ctx: &'a OperationContext,
    resolver: &'a dyn ResourceResolver,
}

impl<'a> Expander<'a> {
    pub fn new(ctx: &'a OperationContext, resolver: &'a dyn ResourceResolver) -> Self {
        Self { ctx, resolver }
    }

    pub fn expand(&self, value_set: &ValueSet, request: &ExpandRequest) -> Result<ExpansionResult> {
        if let Some(expansion) = &value_set.expansion {
            // A pre-built expansion is already authoritative; spec §4.2
            // doesn't ask us to recompute it.
            return Ok(self.paginate_existing(expansion, request));
        }

        let _guard = self.ctx.enter_value_set(&value_set.resource.vurl())?;
        self.ctx.dead_check("expand:start")?;

        let multi_version = multi_version_systems(value_set);

        let mut excluded: HashSet<(String, String)> = HashSet::new();
        for exclude in &value_set.exclude {
            for concept in self.process_concept_set(exclude, request, &multi_version)? {
                excluded.insert((concept.system.clone(), concept.code.clone()));
            }
        }

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut concepts = Vec::new();
        for include in &value_set.include {
            for concept in self.process_concept_set(include, request, &multi_version)? {
                if excluded.contains(&(concept.system.clone(), concept.code.clone())) {
                    continue;
                }
                if request.active_only && concept.inactive {
                    continue;
                }
                if !seen.insert((concept.system.clone(), concept.code.clone())) {
                    continue;
                }
                if concepts.len() >= request.max_concepts {
                    return Err(TxError::too_costly(
                        format!(
                            "expansion exceeded {} concepts before paging",
                            request.max_concepts
                        ),
                        self.ctx.steps(),
                    ));
                }
                concepts.push(concept);
            }
            self.ctx.dead_check("expand:after-include")?;
        }

        if let Some(filter) = &request.filter_text {
            let needle = filter.to_lowercase();
            concepts.retain(|c| {
                c.code.to_lowercase().contains(&needle)
                    || c.display
                        .as_ref()
                        .map(|d| d.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            });
        }

        let total = concepts.len();
        let offset = request.offset.min(total);
        let count = request.count.unwrap_or(total - offset);
        let page: Vec<_> = concepts.into_iter().skip(offset).take(count).collect();

        self.ctx.note(format!("expanded to {total} concepts, returning {}", page.len()));

        Ok(ExpansionResult {
            total,
            offset,
            concepts: page,
        })
    }

    fn paginate_existing(
        &self,
        expansion: &serde_json::Value,
        request: &ExpandRequest,
    ) -> ExpansionResult {
        let contains = expansion
            .get("contains")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let total = expansion
            .get("total")
            .and_then(|v| v.as_u64())
            .unwrap_or(contains.len() as u64) as usize;

        let concepts: Vec<ExpandedConcept> = contains
            .into_iter()
            .skip(request.offset)
            .take(request.count.unwrap_or(usize::MAX))
            .map(|c| ExpandedConcept {
                system: c.get("system").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                version: c.get("version").and_then(|v| v.as_str()).map(String::from),
                code: c.get("code").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                display: c.get("display").and_then(|v| v.as_str()).map(String::from),
                designation: Vec::new(),
                inactive: c.get("inactive").and_then(|v| v.as_bool()).unwrap_or(false),
                is_abstract: c.get("abstract").and_then(|v| v.as_bool()).unwrap_or(false),
            })
            .collect();

        ExpansionResult {
            total,
            offset: request.offset,
            concepts,
        }
    }

    fn process_concept_set(
        &self,
        set: &ConceptSet,
        request: &ExpandRequest,
        multi_version: &HashSet<String>,
    ) -> Result<Vec<ExpandedConcept>> {
        let mut out = Vec::new();

        if let Some(system) = &set.system {
            let pinned_version = self.resolve_version(system, set.version.as_deref(), request)?;

            let provider = match self.resolver.resolve_code_system(system, pinned_version.as_deref()) {
                Some(provider) => provider,
                None if request.incomplete_ok => {
                    self.ctx.note(format!("code system '{system}' not found, continuing (incomplete-ok)"));
                    return Ok(out);
                }
                None => {
                    return Err(TxError::not_found(format!("code system '{system}' not found")));
                }
            };

            match provider.content_mode() {
                ContentMode::NotPresent | ContentMode::Supplement => {
                    return Err(TxError::not_supported(format!(
                        "code system '{system}' has no expandable content and cannot be included"
                    )));
                }
                ContentMode::Fragment | ContentMode::Example if !request.incomplete_ok => {
                    return Err(TxError::not_supported(format!(
                        "code system '{system}' is a partial (fragment/example) system; \
                         pass incomplete-ok=true to include it"
                    )));
                }
                _ => {}
            }

            // Multi-version systems must stamp `version` on every entry even
            // absent an explicit pin (spec §4.2 step 2); other systems still
            // prefer an explicitly pinned version over the provider's own.
            let force_version = if multi_version.contains(system.as_str()) {
                pinned_version.clone().or_else(|| provider.version().map(String::from))
            } else {
                pinned_version.clone()
            };

            if !set.concepts.is_empty() {
                for concept in &set.concepts {
                    let Some(located) = provider.locate(&concept.code) else {
                        continue;
                    };
                    out.push(self.to_expanded(
                        &provider,
                        &located,
                        request,
                        concept.display.as_deref(),
                        &concept.designation,
                        force_version.as_deref(),
                    ));
                }
            } else if !set.filters.is_empty() {
                let filters: Vec<(String, String, String)> = set
                    .filters
                    .iter()
                    .map(|f| (f.property.clone(), f.op.clone(), f.value.clone()))
                    .collect();
                let matched = provider
                    .execute_filters(&filters)
                    .map_err(TxError::from)?;
                for concept in matched {
                    out.push(self.to_expanded(&provider, &concept, request, None, &[], force_version.as_deref()));
                }
            } else {
                match provider.all_concepts() {
                    Some(all) => {
                        for concept in all {
                            out.push(self.to_expanded(&provider, &concept, request, None, &[], force_version.as_deref()));
                        }
                    }
                    None => {
                        return Err(TxError::not_supported(format!(
                            "code system '{system}' has no enumerable concept list and cannot be included wholesale"
                        )));
                    }
                }
            }
        }

        for vs_url in &set.value_sets {
            let imported = self
                .resolver
                .resolve_value_set(vs_url, None)
                .ok_or_else(|| TxError::not_found(format!("value set '{vs_url}' not found")))?;
            let sub_request = ExpandRequest {
                filter_text: None,
                offset: 0,
                count: None,
                ..request.clone()
            };
            let sub = self.expand(&imported, &sub_request)?;
            out.extend(sub.concepts);
        }

        Ok(out)
    }

    /// Resolves the effective version for `system` given an include's own
    /// `version` and the request's version-pinning parameters (spec §6,
    /// §8's "Version pinning" invariant): `force-system-version` always
    /// wins; `check-system-version` fails the include if it disagrees;
    /// `system-version` only fills in when the include carries none.
    fn resolve_version(
        &self,
        system: &str,
        include_version: Option<&str>,
        request: &ExpandRequest,
    ) -> Result<Option<String>> {
        if let Some((_, forced)) = request.force_system_version.iter().find(|(s, _)| s == system) {
            return Ok(Some(forced.clone()));
        }
        if let Some((_, required)) = request.check_system_version.iter().find(|(s, _)| s == system) {
            if let Some(v) = include_version {
                if v != required {
                    return Err(TxError::business_rule(format!(
                        "system '{system}' include version '{v}' disagrees with check-system-version '{required}'"
                    )));
                }
            }
            return Ok(include_version.map(String::from).or_else(|| Some(required.clone())));
        }
        if let Some((_, default_version)) = request.system_version.iter().find(|(s, _)| s == system) {
            return Ok(include_version.map(String::from).or_else(|| Some(default_version.clone())));
        }
        Ok(include_version.map(String::from))
    }

    fn to_expanded(
        &self,
        provider: &Arc<dyn CodeSystemProvider>,
        concept: &tx_providers::ConceptContext,
        request: &ExpandRequest,
        explicit_display: Option<&str>,
        explicit_designations: &[Designation],
        force_version: Option<&str>,
    ) -> ExpandedConcept {
        let display = explicit_display
            .map(String::from)
            .or_else(|| provider.display(concept, request.display_language.as_deref()));
        let mut designation = if request.include_designations {
            provider.designations(concept)
        } else {
            Vec::new()
        };
        if request.include_designations {
            designation.extend(explicit_designations.iter().cloned());
        }
        ExpandedConcept {
            system: provider.system_url().to_string(),
            version: force_version
                .map(String::from)
                .or_else(|| provider.version().map(String::from)),
            code: concept.code.clone(),
            display,
            designation,
            inactive: provider.is_inactive(concept),
            is_abstract: provider.is_abstract(concept),
        }
    }
}

/// Detects the multi-version case spec §4.2 step 2 calls out: the same
/// system referenced by two includes/excludes pinned to different
/// versions. Those systems must emit `version` on every `contains` entry
/// rather than leaving it to the provider's own default.
fn multi_version_systems(value_set: &ValueSet) -> HashSet<String> {
    let mut per_system: HashMap<&str, HashSet<Option<&str>>> = HashMap::new();
    for set in value_set.include.iter().chain(value_set.exclude.iter()) {
        if let Some(system) = &set.system {
            per_system
                .entry(system.as_str())
                .or_default()
                .insert(set.version.as_deref());
        }
    }
    per_system
        .into_iter()
        .filter(|(_, versions)| versions.len() > 1)
        .map(|(system, _)| system.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tx_core::{CodeSystem, ExpansionCache, ResourceCache};
    use tx_providers::HierarchicalProvider;

    struct FixtureResolver {
        code_systems: Mutex<HashMap<String, Arc<dyn CodeSystemProvider>>>,
        value_sets: Mutex<HashMap<String, ValueSet>>,
    }

    impl FixtureResolver {
        fn new() -> Self {
            Self {
                code_systems: Mutex::new(HashMap::new()),
                value_sets: Mutex::new(HashMap::new()),
            }
        }

        fn with_code_system(self, url: &str, provider: Arc<dyn CodeSystemProvider>) -> Self {
            self.code_systems.lock().unwrap().insert(url.to_string(), provider);
            self
        }

        fn with_value_set(self, url: &str, vs: ValueSet) -> Self {
            self.value_sets.lock().unwrap().insert(url.to_string(), vs);
            self
        }
    }

    impl ResourceResolver for FixtureResolver {
        fn resolve_code_system(
            &self,
            url: &str,
            _version: Option<&str>,
        ) -> Option<Arc<dyn CodeSystemProvider>> {
            self.code_systems.lock().unwrap().get(url).cloned()
        }

        fn resolve_value_set(&self, url: &str, _version: Option<&str>) -> Option<ValueSet> {
            self.value_sets.lock().unwrap().get(url).cloned()
        }
    }

    fn ctx() -> OperationContext {
        OperationContext::new(
            vec!["en".into()],
            None,
            false,
            Arc::new(ResourceCache::new(Duration::from_secs(3600))),
            Arc::new(ExpansionCache::new(Duration::from_secs(3600), Duration::from_millis(2000), 100)),
        )
    }

    fn gender_value_set() -> ValueSet {
        ValueSet::from_value(json!({
            "url": "http://example.org/fhir/ValueSet/gender",
            "compose": {
                "include": [{"system": "http://hl7.org/fhir/administrative-gender"}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn expands_whole_system() {
        let resolver = FixtureResolver::new().with_code_system(
            "http://hl7.org/fhir/administrative-gender",
            Arc::new(tx_providers::EnumeratedProvider::administrative_gender()),
        );
        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let result = expander
            .expand(&gender_value_set(), &ExpandRequest::default())
            .unwrap();
        assert_eq!(result.total, 4);
    }

    #[test]
    fn excludes_win_over_includes() {
        let cs = CodeSystem::from_value(json!({
            "url": "http://example.org/cs",
            "content": "complete",
            "concept": [{"code": "a"}, {"code": "b"}],
        }))
        .unwrap();
        let provider: Arc<dyn CodeSystemProvider> =
            Arc::new(HierarchicalProvider::from_code_system(&cs));
        let resolver = FixtureResolver::new().with_code_system("http://example.org/cs", provider);

        let vs = ValueSet::from_value(json!({
            "url": "http://example.org/vs",
            "compose": {
                "include": [{"system": "http://example.org/cs"}],
                "exclude": [{"system": "http://example.org/cs", "concept": [{"code": "b"}]}],
            }
        }))
        .unwrap();

        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let result = expander.expand(&vs, &ExpandRequest::default()).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.concepts[0].code, "a");
    }

    #[test]
    fn paging_respects_offset_and_count() {
        let resolver = FixtureResolver::new().with_code_system(
            "http://hl7.org/fhir/administrative-gender",
            Arc::new(tx_providers::EnumeratedProvider::administrative_gender()),
        );
        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let request = ExpandRequest {
            offset: 1,
            count: Some(2),
            ..Default::default()
        };
        let result = expander.expand(&gender_value_set(), &request).unwrap();
        assert_eq!(result.total, 4);
        assert_eq!(result.offset, 1);
        assert_eq!(result.concepts.len(), 2);
    }

    #[test]
    fn dedups_codes_imported_from_multiple_includes() {
        let provider: Arc<dyn CodeSystemProvider> =
            Arc::new(tx_providers::EnumeratedProvider::administrative_gender());
        let resolver =
            FixtureResolver::new().with_code_system("http://hl7.org/fhir/administrative-gender", provider);
        let vs = ValueSet::from_value(json!({
            "url": "http://example.org/vs",
            "compose": {
                "include": [
                    {"system": "http://hl7.org/fhir/administrative-gender"},
                    {"system": "http://hl7.org/fhir/administrative-gender", "concept": [{"code": "male"}]}
                ]
            }
        }))
        .unwrap();
        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let result = expander.expand(&vs, &ExpandRequest::default()).unwrap();
        assert_eq!(result.total, 4);
    }

    #[test]
    fn imported_value_set_is_unioned_in() {
        let resolver = FixtureResolver::new()
            .with_code_system(
                "http://hl7.org/fhir/administrative-gender",
                Arc::new(tx_providers::EnumeratedProvider::administrative_gender()),
            )
            .with_value_set("http://example.org/vs/base", gender_value_set());

        let vs = ValueSet::from_value(json!({
            "url": "http://example.org/vs/wrapper",
            "compose": {
                "include": [{"valueSet": ["http://example.org/vs/base"]}]
            }
        }))
        .unwrap();

        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let result = expander.expand(&vs, &ExpandRequest::default()).unwrap();
        assert_eq!(result.total, 4);
    }

    #[test]
    fn cyclical_value_set_reference_is_rejected() {
        let resolver = FixtureResolver::new();
        let vs_a = ValueSet::from_value(json!({
            "url": "http://example.org/vs/a",
            "compose": {"include": [{"valueSet": ["http://example.org/vs/b"]}]}
        }))
        .unwrap();
        let vs_b = ValueSet::from_value(json!({
            "url": "http://example.org/vs/b",
            "compose": {"include": [{"valueSet": ["http://example.org/vs/a"]}]}
        }))
        .unwrap();
        let resolver = resolver
            .with_value_set("http://example.org/vs/a", vs_a.clone())
            .with_value_set("http://example.org/vs/b", vs_b);

        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let err = expander.expand(&vs_a, &ExpandRequest::default()).unwrap_err();
        assert!(matches!(err, TxError::CycleDetected(_)));
    }

    #[test]
    fn force_system_version_overrides_include_version() {
        let cs = CodeSystem::from_value(json!({
            "url": "http://example.org/cs",
            "version": "2",
            "content": "complete",
            "concept": [{"code": "a"}],
        }))
        .unwrap();
        let provider: Arc<dyn CodeSystemProvider> =
            Arc::new(HierarchicalProvider::from_code_system(&cs));
        let resolver = FixtureResolver::new().with_code_system("http://example.org/cs", provider);

        let vs = ValueSet::from_value(json!({
            "url": "http://example.org/vs",
            "compose": {
                "include": [{"system": "http://example.org/cs", "version": "1"}],
            }
        }))
        .unwrap();

        let request = ExpandRequest {
            force_system_version: vec![("http://example.org/cs".to_string(), "3".to_string())],
            ..Default::default()
        };

        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let result = expander.expand(&vs, &request).unwrap();
        assert_eq!(result.concepts[0].version.as_deref(), Some("3"));
    }

    #[test]
    fn check_system_version_mismatch_is_rejected() {
        let cs = CodeSystem::from_value(json!({
            "url": "http://example.org/cs",
            "content": "complete",
            "concept": [{"code": "a"}],
        }))
        .unwrap();
        let provider: Arc<dyn CodeSystemProvider> =
            Arc::new(HierarchicalProvider::from_code_system(&cs));
        let resolver = FixtureResolver::new().with_code_system("http://example.org/cs", provider);

        let vs = ValueSet::from_value(json!({
            "url": "http://example.org/vs",
            "compose": {
                "include": [{"system": "http://example.org/cs", "version": "1"}],
            }
        }))
        .unwrap();

        let request = ExpandRequest {
            check_system_version: vec![("http://example.org/cs".to_string(), "2".to_string())],
            ..Default::default()
        };

        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let err = expander.expand(&vs, &request).unwrap_err();
        assert!(matches!(err, TxError::BusinessRule(_)));
    }

    #[test]
    fn not_present_system_is_refused() {
        let cs = CodeSystem::from_value(json!({
            "url": "http://example.org/cs",
            "content": "not-present",
            "concept": [],
        }))
        .unwrap();
        let provider: Arc<dyn CodeSystemProvider> =
            Arc::new(HierarchicalProvider::from_code_system(&cs));
        let resolver = FixtureResolver::new().with_code_system("http://example.org/cs", provider);

        let vs = ValueSet::from_value(json!({
            "url": "http://example.org/vs",
            "compose": {"include": [{"system": "http://example.org/cs"}]}
        }))
        .unwrap();

        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let err = expander.expand(&vs, &ExpandRequest::default()).unwrap_err();
        assert!(matches!(err, TxError::NotSupported(_)));
    }

    #[test]
    fn fragment_system_requires_incomplete_ok() {
        let cs = CodeSystem::from_value(json!({
            "url": "http://example.org/cs",
            "content": "fragment",
            "concept": [{"code": "a"}],
        }))
        .unwrap();
        let provider: Arc<dyn CodeSystemProvider> =
            Arc::new(HierarchicalProvider::from_code_system(&cs));
        let resolver = FixtureResolver::new().with_code_system("http://example.org/cs", provider);

        let vs = ValueSet::from_value(json!({
            "url": "http://example.org/vs",
            "compose": {"include": [{"system": "http://example.org/cs"}]}
        }))
        .unwrap();

        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let err = expander
            .expand(&vs, &ExpandRequest::default())
            .unwrap_err();
        assert!(matches!(err, TxError::NotSupported(_)));

        let request = ExpandRequest {
            incomplete_ok: true,
            ..Default::default()
        };
        let result = expander.expand(&vs, &request).unwrap();
        assert_eq!(result.total, 1);
    }

    #[test]
    fn multi_version_include_forces_version_on_every_concept() {
        let cs = CodeSystem::from_value(json!({
            "url": "http://example.org/cs",
            "content": "complete",
            "concept": [{"code": "a"}, {"code": "b"}],
        }))
        .unwrap();
        let provider: Arc<dyn CodeSystemProvider> =
            Arc::new(HierarchicalProvider::from_code_system(&cs));
        let resolver = FixtureResolver::new().with_code_system("http://example.org/cs", provider);

        let vs = ValueSet::from_value(json!({
            "url": "http://example.org/vs",
            "compose": {
                "include": [
                    {"system": "http://example.org/cs", "version": "1", "concept": [{"code": "a"}]},
                    {"system": "http://example.org/cs", "version": "2", "concept": [{"code": "b"}]},
                ],
            }
        }))
        .unwrap();

        let c = ctx();
        let expander = Expander::new(&c, &resolver);
        let result = expander.expand(&vs, &ExpandRequest::default()).unwrap();
        assert!(result.concepts.iter().all(|c| c.version.is_some()));
    }
}
