//! The seam between the engine and wherever canonical resources actually
//! live. `tx-server` implements this against `octofhir-canonical-manager`;
//! the engine itself never knows how a `CodeSystem`/`ValueSet` was loaded.

use std::sync::Arc;

use tx_core::ValueSet;
use tx_providers::CodeSystemProvider;

pub trait ResourceResolver: Send + Sync {
    /// Resolve a code system provider by canonical URL and optional
    /// version, applying any supplements declared for it.
    fn resolve_code_system(
        &self,
        url: &str,
        version: Option<&str>,
    ) -> Option<Arc<dyn CodeSystemProvider>>;

    /// Resolve a `ValueSet` canonical resource by URL and optional version.
    fn resolve_value_set(&self, url: &str, version: Option<&str>) -> Option<ValueSet>;
}
