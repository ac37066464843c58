//! `$subsumes` (spec §4.4).
//!
//! Both codes must resolve against the same system; subsumption itself is
//! delegated to the provider, which walks whatever hierarchy it holds.

use tx_core::{OperationContext, Result, TxError};
use tx_providers::Subsumption;

use crate::resolver::ResourceResolver;

#[derive(Debug, Clone)]
pub struct SubsumesRequest<'a> {
    pub system: &'a str,
    pub version: Option<&'a str>,
    pub code_a: &'a str,
    pub code_b: &'a str,
}

pub struct Subsumes<'a> {
    ctx: &'a OperationContext,
    resolver: &'a dyn ResourceResolver,
}

impl<'a> Subsumes<'a> {
    pub fn new(ctx: &'a OperationContext, resolver: &'a dyn ResourceResolver) -> Self {
        Self { ctx, resolver }
    }

    pub fn subsumes(&self, request: &SubsumesRequest) -> Result<Subsumption> {
        self.ctx.dead_check("subsumes:start")?;

        let provider = self
            .resolver
            .resolve_code_system(request.system, request.version)
            .ok_or_else(|| TxError::not_found(format!("code system '{}' not found", request.system)))?;

        let a = provider.locate(request.code_a).ok_or_else(|| {
            TxError::code_invalid(format!("code '{}' not found in system '{}'", request.code_a, request.system))
        })?;
        let b = provider.locate(request.code_b).ok_or_else(|| {
            TxError::code_invalid(format!("code '{}' not found in system '{}'", request.code_b, request.system))
        })?;

        Ok(provider.subsumes(&a, &b))
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
    use tx_providers::{CodeSystemProvider, HierarchicalProvider};

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

    fn body_site() -> CodeSystem {
        CodeSystem::from_value(json!({
            "url": "http://example.org/cs/body-site",
            "content": "complete",
            "concept": [{
                "code": "trunk",
                "concept": [{"code": "chest"}]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn ancestor_subsumes_descendant() {
        let resolver = FixtureResolver::new().with(
            "http://example.org/cs/body-site",
            Arc::new(HierarchicalProvider::from_code_system(&body_site())),
        );
        let c = ctx();
        let s = Subsumes::new(&c, &resolver);
        let result = s
            .subsumes(&SubsumesRequest {
                system: "http://example.org/cs/body-site",
                version: None,
                code_a: "trunk",
                code_b: "chest",
            })
            .unwrap();
        assert_eq!(result, Subsumption::Subsumes);
    }

    #[test]
    fn unrelated_codes_are_not_subsumed() {
        let cs = CodeSystem::from_value(json!({
            "url": "http://example.org/cs/body-site",
            "content": "complete",
            "concept": [{"code": "trunk"}, {"code": "limb"}],
        }))
        .unwrap();
        let resolver = FixtureResolver::new()
            .with("http://example.org/cs/body-site", Arc::new(HierarchicalProvider::from_code_system(&cs)));
        let c = ctx();
        let s = Subsumes::new(&c, &resolver);
        let result = s
            .subsumes(&SubsumesRequest {
                system: "http://example.org/cs/body-site",
                version: None,
                code_a: "trunk",
                code_b: "limb",
            })
            .unwrap();
        assert_eq!(result, Subsumption::NotSubsumed);
    }

    #[test]
    fn unknown_code_is_code_invalid() {
        let resolver = FixtureResolver::new().with(
            "http://example.org/cs/body-site",
            Arc::new(HierarchicalProvider::from_code_system(&body_site())),
        );
        let c = ctx();
        let s = Subsumes::new(&c, &resolver);
        let err = s
            .subsumes(&SubsumesRequest {
                system: "http://example.org/cs/body-site",
                version: None,
                code_a: "trunk",
                code_b: "nonexistent",
            })
            .unwrap_err();
        assert!(matches!(err, TxError::CodeInvalid(_)));
    }
}
