//! `$lookup` (spec §4.4).
//!
//! Resolves a single code against its code system and reports its
//! preferred display, definition, designations, and provider-extended
//! properties (e.g. `parent`/`child` or declared filter properties).

use tx_core::{ConceptProperty, Designation, OperationContext, Result, TxError};

use crate::resolver::ResourceResolver;

#[derive(Debug, Clone)]
pub struct LookupRequest<'a> {
    pub system: &'a str,
    pub version: Option<&'a str>,
    pub code: &'a str,
    pub display_language: Option<&'a str>,
    /// Empty means "return every property the provider exposes".
    pub requested_properties: &'a [String],
}

#[derive(Debug, Clone)]
pub struct LookupResult {
    pub system: String,
    pub version: Option<String>,
    pub display: Option<String>,
    pub designations: Vec<Designation>,
    pub properties: Vec<ConceptProperty>,
    pub is_abstract: bool,
    pub inactive: bool,
}

pub struct Lookup<'a> {
    ctx: &'a OperationContext,
    resolver: &'a dyn ResourceResolver,
}

impl<'a> Lookup<'a> {
    pub fn new(ctx: &'a OperationContext, resolver: &'a dyn ResourceResolver) -> Self {
        Self { ctx, resolver }
    }

    pub fn lookup(&self, request: &LookupRequest) -> Result<LookupResult> {
        if request.code.is_empty() {
            return Err(TxError::invalid("code must not be empty"));
        }
        self.ctx.dead_check("lookup:start")?;

        let provider = self
            .resolver
            .resolve_code_system(request.system, request.version)
            .ok_or_else(|| TxError::not_found(format!("code system '{}' not found", request.system)))?;

        let concept = provider
            .locate(request.code)
            .ok_or_else(|| TxError::code_invalid(format!(
                "code '{}' not found in system '{}'",
                request.code, request.system
            )))?;

        let display = provider.display(&concept, request.display_language);
        let mut properties = provider.properties(&concept);
        if !request.requested_properties.is_empty() {
            properties.retain(|p| request.requested_properties.iter().any(|r| r == &p.code));
        }

        Ok(LookupResult {
            system: provider.system_url().to_string(),
            version: provider.version().map(String::from),
            display,
            designations: provider.designations(&concept),
            properties,
            is_abstract: provider.is_abstract(&concept),
            inactive: provider.is_inactive(&concept),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tx_core::{CodeSystem, ExpansionCache, ResourceCache, ValueSet};
    use tx_providers::{CodeSystemProvider, EnumeratedProvider, HierarchicalProvider};

    struct FixtureResolver(Mutex<HashMap<String, Arc<dyn CodeSystemProvider>>>);

    impl FixtureResolver {
        fn new() -> Self {
            Self(Mutex::new(HashMap::new()))
        }
        fn with(self, url: &str, provider: Arc<dyn CodeSystemProvider>) -> Self {
            self.0.lock().unwrap().insert(url.to_string(), provider);
            self
        }
    }

    impl ResourceResolver for FixtureResolver {
        fn resolve_code_system(
            &self,
            url: &str,
            _version: Option<&str>,
        ) -> Option<Arc<dyn CodeSystemProvider>> {
            self.0.lock().unwrap().get(url).cloned()
        }
        fn resolve_value_set(&self, _url: &str, _version: Option<&str>) -> Option<ValueSet> {
            None
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

    #[test]
    fn looks_up_known_code() {
        let resolver = FixtureResolver::new().with(
            "http://hl7.org/fhir/administrative-gender",
            Arc::new(EnumeratedProvider::administrative_gender()),
        );
        let c = ctx();
        let lookup = Lookup::new(&c, &resolver);
        let result = lookup
            .lookup(&LookupRequest {
                system: "http://hl7.org/fhir/administrative-gender",
                version: None,
                code: "male",
                display_language: None,
                requested_properties: &[],
            })
            .unwrap();
        assert_eq!(result.display, Some("Male".to_string()));
    }

    #[test]
    fn unknown_code_is_code_invalid() {
        let resolver = FixtureResolver::new().with(
            "http://hl7.org/fhir/administrative-gender",
            Arc::new(EnumeratedProvider::administrative_gender()),
        );
        let c = ctx();
        let lookup = Lookup::new(&c, &resolver);
        let err = lookup
            .lookup(&LookupRequest {
                system: "http://hl7.org/fhir/administrative-gender",
                version: None,
                code: "nonexistent",
                display_language: None,
                requested_properties: &[],
            })
            .unwrap_err();
        assert!(matches!(err, TxError::CodeInvalid(_)));
    }

    #[test]
    fn properties_are_filtered_to_requested_set() {
        let cs = CodeSystem::from_value(json!({
            "url": "http://example.org/cs",
            "content": "complete",
            "concept": [{
                "code": "a",
                "property": [
                    {"code": "parent", "value": "root"},
                    {"code": "status", "value": "active"}
                ]
            }]
        }))
        .unwrap();
        let provider: Arc<dyn CodeSystemProvider> = Arc::new(HierarchicalProvider::from_code_system(&cs));
        let resolver = FixtureResolver::new().with("http://example.org/cs", provider);
        let c = ctx();
        let lookup = Lookup::new(&c, &resolver);
        let requested = vec!["parent".to_string()];
        let result = lookup
            .lookup(&LookupRequest {
                system: "http://example.org/cs",
                version: None,
                code: "a",
                display_language: None,
                requested_properties: &requested,
            })
            .unwrap();
        assert_eq!(result.properties.len(), 1);
        assert_eq!(result.properties[0].code, "parent");
    }
}
