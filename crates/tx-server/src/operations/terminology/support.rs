//! Shared plumbing for the four terminology operation handlers: building a
//! per-request [`OperationContext`] from [`OperationParams`], resolving the
//! `ValueSet`/`CodeSystem` a request targets, and converting engine results
//! into the `Parameters`/`ValueSet`/`OperationOutcome` wire shapes spec §6
//! names.

use std::sync::Arc;

use serde_json::{Value, json};

use tx_core::{OperationContext, ParameterBag};
use tx_providers::CodeSystemProvider;

use crate::operations::handler::OperationError;
use crate::operations::params::OperationParams;
use crate::server::AppState;

/// Normalizes whatever transport carried the request into the
/// framework-agnostic [`ParameterBag`] the engine expects.
pub fn parameter_bag(params: &OperationParams) -> ParameterBag {
    ParameterBag::from_body(params.to_value())
}

/// Builds the per-request context: languages from `displayLanguage` (falling
/// back to the configured default), the server's default deadline, and
/// handles onto the shared caches. `debugging` has no HTTP-facing toggle
/// (spec §9's Open Question is resolved as opt-in only, never from ambient
/// request state), so it's always `false` here.
pub fn build_context(state: &AppState, bag: &ParameterBag) -> OperationContext {
    let languages = bag
        .get_string("displayLanguage")
        .map(|l| vec![l])
        .unwrap_or_else(|| vec![state.config.i18n.default_language.clone()]);

    if let Some(cache_id) = bag.get_string("cache-id") {
        let resources = bag
            .get_all("tx-resource")
            .into_iter()
            .filter(|r| r.is_object());
        state.resource_cache.merge(&cache_id, resources);
    }

    OperationContext::new(
        languages,
        Some(state.config.default_deadline()),
        false,
        Arc::clone(&state.resource_cache),
        Arc::clone(&state.expansion_cache),
    )
}

/// Looks a code system up by `url`/`version` parameters, falling back to
/// `{id}` when the route carried a path segment.
pub fn resolve_code_system(
    state: &AppState,
    bag: &ParameterBag,
    path_id: Option<&str>,
) -> Result<Arc<dyn CodeSystemProvider>, OperationError> {
    if let Some(url) = bag.get_string("url").or_else(|| bag.get_string("system")) {
        let version = bag.get_string("version");
        return state
            .resolver
            .resolve_code_system(&url, version.as_deref())
            .ok_or_else(|| OperationError::NotFound(format!("code system '{url}' not found")));
    }
    if let Some(id) = path_id {
        return state
            .resolver
            .resolve_code_system_by_id(id)
            .ok_or_else(|| OperationError::NotFound(format!("code system with id '{id}' not found")));
    }
    Err(OperationError::InvalidParameters(
        "a 'url' (or 'system') parameter, or a path id, is required".into(),
    ))
}

/// Looks a value set up by `url`/`valueSetVersion`, an inline `valueSet`
/// resource parameter, or `{id}`.
pub fn resolve_value_set(
    state: &AppState,
    bag: &ParameterBag,
    path_id: Option<&str>,
) -> Result<tx_core::ValueSet, OperationError> {
    if let Some(inline) = bag.get_resource("valueSet").or_else(|| bag.get_resource("resource")) {
        return tx_core::ValueSet::from_value(inline)
            .map_err(OperationError::InvalidParameters);
    }
    if let Some(url) = bag.get_string("url") {
        let version = bag.get_string("valueSetVersion");
        return state
            .resolver
            .resolve_value_set(&url, version.as_deref())
            .ok_or_else(|| OperationError::NotFound(format!("value set '{url}' not found")));
    }
    if let Some(id) = path_id {
        return state
            .resolver
            .resolve_value_set_by_id(id)
            .ok_or_else(|| OperationError::NotFound(format!("value set with id '{id}' not found")));
    }
    Err(OperationError::InvalidParameters(
        "a 'url' parameter, an inline 'valueSet', or a path id, is required".into(),
    ))
}

/// Wraps `entries` (each already a `{"name": ..., ...}` parameter object)
/// into a `Parameters` resource, appending a `diagnostics` step-log entry
/// when the caller asked for one (spec §6's `diagnostics` parameter).
pub fn parameters_response(entries: Vec<Value>, ctx: &OperationContext, bag: &ParameterBag) -> Value {
    let mut parameter = entries;
    if bag.get_bool("diagnostics").unwrap_or(false) {
        let steps = ctx.steps();
        let trail: Vec<String> = steps.iter().map(|(ms, note)| format!("{ms}ms: {note}")).collect();
        parameter.push(json!({"name": "diagnostics", "valueString": trail.join("; ")}));
    }
    json!({"resourceType": "Parameters", "parameter": parameter})
}

pub fn string_param(name: &str, value: impl Into<String>) -> Value {
    json!({"name": name, "valueString": value.into()})
}
