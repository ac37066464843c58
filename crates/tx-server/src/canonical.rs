//! Canonical resolution: turns a `(url, version)` pair into a code-system
//! provider or a parsed `ValueSet`, per spec §6.
//!
//! Built-in systems (the provider-contract illustrations named in spec §1)
//! resolve without touching the external catalog at all. Everything else is
//! served from an in-memory snapshot refreshed from `octofhir-canonical-manager`
//! at startup and on demand; `tx_engine::ResourceResolver` is a synchronous
//! trait, so the snapshot -- not the manager's async search API -- is what
//! request handling actually reads, swapped in lock-free via `arc-swap`.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;

use tx_core::{CodeSystem, ValueSet};
use tx_providers::{CodeSystemProvider, EnumeratedProvider, HierarchicalProvider, OpenProvider, SupplementedProvider};
use tx_engine::ResourceResolver;

use crate::config::AppConfig;

#[derive(Default)]
struct Snapshot {
    code_systems: HashMap<String, Vec<Value>>,
    value_sets: HashMap<String, Vec<Value>>,
}

impl Snapshot {
    fn find_code_system(&self, url: &str, version: Option<&str>) -> Option<Value> {
        find_versioned(self.code_systems.get(url)?, version)
    }

    fn find_value_set(&self, url: &str, version: Option<&str>) -> Option<Value> {
        find_versioned(self.value_sets.get(url)?, version)
    }
}

fn find_versioned(candidates: &[Value], version: Option<&str>) -> Option<Value> {
    match version {
        Some(v) => candidates
            .iter()
            .find(|r| r.get("version").and_then(|x| x.as_str()) == Some(v))
            .cloned(),
        None => candidates.first().cloned(),
    }
}

/// Resolves canonical URLs to code-system providers and value sets.
///
/// Built-in systems are registered once at construction and never change.
/// Everything resolved from the external catalog lives in an `ArcSwap`
/// snapshot that `refresh()` replaces wholesale -- readers never block on a
/// refresh in flight.
pub struct CanonicalResolver {
    builtins: HashMap<String, Arc<dyn CodeSystemProvider>>,
    snapshot: ArcSwap<Snapshot>,
    manager: ArcSwap<Option<Arc<octofhir_canonical_manager::CanonicalManager>>>,
}

impl CanonicalResolver {
    pub fn new() -> Self {
        let mut builtins: HashMap<String, Arc<dyn CodeSystemProvider>> = HashMap::new();
        let enumerated: Vec<Arc<dyn CodeSystemProvider>> = vec![
            Arc::new(EnumeratedProvider::iso4217()),
            Arc::new(EnumeratedProvider::administrative_gender()),
            Arc::new(EnumeratedProvider::us_states()),
            Arc::new(EnumeratedProvider::area_codes()),
        ];
        let open: Vec<Arc<dyn CodeSystemProvider>> =
            vec![Arc::new(OpenProvider::mime_type()), Arc::new(OpenProvider::uri())];
        for p in enumerated.into_iter().chain(open) {
            builtins.insert(p.system_url().to_string(), p);
        }

        Self {
            builtins,
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            manager: ArcSwap::from_pointee(None),
        }
    }

    /// Installs the configured packages into `octofhir-canonical-manager` and
    /// pulls an initial snapshot of its `CodeSystem`/`ValueSet` resources.
    /// Errors are logged and leave the resolver running on built-ins only --
    /// the catalog is an external collaborator (spec §1), not a hard dependency
    /// for the systems this server ships with.
    pub async fn init(&self, cfg: &AppConfig) -> Result<(), String> {
        let manager = build_manager(cfg).await?;
        self.refresh_from(&manager).await?;
        self.manager.store(Arc::new(Some(manager)));
        Ok(())
    }

    /// Re-queries the catalog and atomically swaps in a fresh snapshot.
    pub async fn refresh(&self) -> Result<(), String> {
        let manager = self
            .manager
            .load()
            .as_ref()
            .clone()
            .ok_or_else(|| "canonical manager not initialized".to_string())?;
        self.refresh_from(&manager).await
    }

    async fn refresh_from(
        &self,
        manager: &octofhir_canonical_manager::CanonicalManager,
    ) -> Result<(), String> {
        let code_systems = fetch_all(manager, "CodeSystem").await?;
        let value_sets = fetch_all(manager, "ValueSet").await?;

        let mut snap = Snapshot::default();
        for (url, resource) in code_systems {
            snap.code_systems.entry(url).or_default().push(resource);
        }
        for (url, resource) in value_sets {
            snap.value_sets.entry(url).or_default().push(resource);
        }
        self.snapshot.store(Arc::new(snap));
        Ok(())
    }

    fn build_provider(&self, cs: &CodeSystem, url: &str, version: Option<&str>) -> Option<Arc<dyn CodeSystemProvider>> {
        use tx_core::ContentMode;
        if cs.content == ContentMode::Supplement {
            let (base_url, base_version) = cs.supplements.clone()?;
            let base_cs = self.lookup_code_system(&base_url, base_version.as_deref())?;
            let base = self.build_provider(&base_cs, &base_url, base_version.as_deref())?;
            let boxed: Box<dyn CodeSystemProvider> =
                Box::new(ClonedProviderAdapter(base)) as Box<dyn CodeSystemProvider>;
            return Some(Arc::new(SupplementedProvider::new(boxed, cs)));
        }
        let _ = (url, version);
        Some(Arc::new(HierarchicalProvider::from_code_system(cs)))
    }

    fn lookup_code_system(&self, url: &str, version: Option<&str>) -> Option<CodeSystem> {
        let raw = self.snapshot.load().find_code_system(url, version)?;
        CodeSystem::from_value(raw).ok()
    }

    /// Resolves `/ValueSet/{id}/$expand` and `/ValueSet/{id}/$validate-code`:
    /// there's no generic resource store, so `{id}` is matched against the
    /// `id` field of whatever `ValueSet`s are in the catalog snapshot.
    pub fn resolve_value_set_by_id(&self, id: &str) -> Option<ValueSet> {
        let snapshot = self.snapshot.load();
        let raw = snapshot
            .value_sets
            .values()
            .flatten()
            .find(|v| v.get("id").and_then(|x| x.as_str()) == Some(id))?
            .clone();
        ValueSet::from_value(raw).ok()
    }

    /// Resolves `/CodeSystem/{id}/$validate-code` the same way.
    pub fn resolve_code_system_by_id(&self, id: &str) -> Option<Arc<dyn CodeSystemProvider>> {
        let raw = {
            let snapshot = self.snapshot.load();
            snapshot
                .code_systems
                .values()
                .flatten()
                .find(|v| v.get("id").and_then(|x| x.as_str()) == Some(id))?
                .clone()
        };
        let url = raw.get("url").and_then(|v| v.as_str())?.to_string();
        let version = raw.get("version").and_then(|v| v.as_str()).map(String::from);
        let cs = CodeSystem::from_value(raw).ok()?;
        self.build_provider(&cs, &url, version.as_deref())
    }
}

impl Default for CanonicalResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// `SupplementedProvider` wraps a `Box<dyn CodeSystemProvider>`, but our base
/// providers are held as `Arc`s (shared with the builtin map and the cache).
/// This adapter lets an `Arc` stand in for the `Box` the decorator expects.
struct ClonedProviderAdapter(Arc<dyn CodeSystemProvider>);

impl CodeSystemProvider for ClonedProviderAdapter {
    fn system_url(&self) -> &str {
        self.0.system_url()
    }
    fn version(&self) -> Option<&str> {
        self.0.version()
    }
    fn capability(&self) -> tx_providers::Capability {
        self.0.capability()
    }
    fn case_sensitive(&self) -> bool {
        self.0.case_sensitive()
    }
    fn locate(&self, code: &str) -> Option<tx_providers::ConceptContext> {
        self.0.locate(code)
    }
    fn display(&self, concept: &tx_providers::ConceptContext, language: Option<&str>) -> Option<String> {
        self.0.display(concept, language)
    }
    fn designations(&self, concept: &tx_providers::ConceptContext) -> Vec<tx_core::Designation> {
        self.0.designations(concept)
    }
    fn is_abstract(&self, concept: &tx_providers::ConceptContext) -> bool {
        self.0.is_abstract(concept)
    }
    fn is_inactive(&self, concept: &tx_providers::ConceptContext) -> bool {
        self.0.is_inactive(concept)
    }
    fn properties(&self, concept: &tx_providers::ConceptContext) -> Vec<tx_core::ConceptProperty> {
        self.0.properties(concept)
    }
    fn all_concepts(&self) -> Option<Vec<tx_providers::ConceptContext>> {
        self.0.all_concepts()
    }
    fn filter_declarations(&self) -> Vec<tx_providers::FilterDeclaration> {
        self.0.filter_declarations()
    }
    fn filter(
        &self,
        property: &str,
        op: &str,
        value: &str,
    ) -> Result<Vec<tx_providers::ConceptContext>, tx_providers::ProviderError> {
        self.0.filter(property, op, value)
    }
    fn descends_from(&self, concept: &tx_providers::ConceptContext, ancestor_code: &str) -> bool {
        self.0.descends_from(concept, ancestor_code)
    }
    fn raw(&self, concept: &tx_providers::ConceptContext) -> Option<Value> {
        self.0.raw(concept)
    }
}

impl ResourceResolver for CanonicalResolver {
    fn resolve_code_system(&self, url: &str, version: Option<&str>) -> Option<Arc<dyn CodeSystemProvider>> {
        if let Some(builtin) = self.builtins.get(url) {
            return Some(Arc::clone(builtin));
        }
        let cs = self.lookup_code_system(url, version)?;
        self.build_provider(&cs, url, version)
    }

    fn resolve_value_set(&self, url: &str, version: Option<&str>) -> Option<ValueSet> {
        let raw = self.snapshot.load().find_value_set(url, version)?;
        ValueSet::from_value(raw).ok()
    }
}

async fn fetch_all(
    manager: &octofhir_canonical_manager::CanonicalManager,
    resource_type: &str,
) -> Result<Vec<(String, Value)>, String> {
    const PAGE_SIZE: usize = 1000;
    let mut offset = 0;
    let mut out = Vec::new();
    loop {
        let page = manager
            .search()
            .await
            .resource_type(resource_type)
            .limit(PAGE_SIZE)
            .offset(offset)
            .execute()
            .await
            .map_err(|e| format!("failed to query {resource_type} at offset {offset}: {e}"))?;

        let page_count = page.resources.len();
        for m in page.resources {
            let content = m.resource.content;
            if let Some(url) = content.get("url").and_then(|v| v.as_str()) {
                out.push((url.to_string(), content));
            }
        }
        if page_count < PAGE_SIZE {
            break;
        }
        offset += PAGE_SIZE;
    }
    tracing::info!(resource_type, loaded = out.len(), "canonical snapshot refreshed");
    Ok(out)
}

async fn build_manager(
    cfg: &AppConfig,
) -> Result<Arc<octofhir_canonical_manager::CanonicalManager>, String> {
    use octofhir_canonical_manager::FcmConfig;

    let mut fcm_cfg = FcmConfig::default();
    fcm_cfg.apply_env_overrides();

    let base = std::path::PathBuf::from(&cfg.packages.base_dir);
    fcm_cfg.storage.packages_dir = base.join("packages");
    fcm_cfg.storage.cache_dir = base.join("cache");
    for dir in [&base, &fcm_cfg.storage.packages_dir, &fcm_cfg.storage.cache_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| format!("failed to create {dir:?}: {e}"))?;
    }

    let mut specs = Vec::new();
    for item in &cfg.packages.load {
        let (id, version) = parse_package_spec(item)?;
        if let Some(ref v) = version {
            fcm_cfg.add_package(&id, v, Some(1));
        }
        specs.push((id, version));
    }

    let manager = octofhir_canonical_manager::CanonicalManager::new(fcm_cfg)
        .await
        .map_err(|e| format!("failed to initialize canonical manager: {e}"))?;
    let manager = Arc::new(manager);

    for (id, version) in &specs {
        let Some(version) = version else {
            tracing::warn!(package = %id, "skipping package without a pinned version");
            continue;
        };
        tracing::info!(package = %id, version = %version, "installing canonical package");
        if let Err(e) = manager.install_package(id, version).await {
            tracing::error!(package = %id, version = %version, error = %e, "failed to install canonical package");
        }
    }

    Ok(manager)
}

fn parse_package_spec(spec: &str) -> Result<(String, Option<String>), String> {
    if spec.trim().is_empty() {
        return Err("empty package spec".into());
    }
    Ok(match spec.split_once('#') {
        Some((id, ver)) => (id.trim().to_string(), Some(ver.trim().to_string())),
        None => (spec.trim().to_string(), None),
    })
}
