//! `$expand` (spec §6): `GET/POST /ValueSet/$expand` and `/ValueSet/{id}/$expand`.
//!
//! Computed expansions that took longer than the configured minimum
//! duration to build are served from [`tx_core::ExpansionCache`] on
//! subsequent identical requests (spec §4.5).

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Value, json};

use tx_engine::{ExpandRequest, Expander, ExpandedConcept, ExpansionResult};

use crate::operations::handler::{OperationError, OperationHandler};
use crate::operations::terminology::support::{build_context, resolve_value_set};
use crate::server::AppState;

pub struct ExpandHandler;

#[async_trait]
impl OperationHandler for ExpandHandler {
    fn code(&self) -> &str {
        "expand"
    }

    async fn handle_system(&self, state: &AppState, params: &Value) -> Result<Value, OperationError> {
        run(state, params, None)
    }

    async fn handle_instance(
        &self,
        state: &AppState,
        _resource_type: &str,
        id: &str,
        params: &Value,
    ) -> Result<Value, OperationError> {
        run(state, params, Some(id))
    }
}

fn run(state: &AppState, params: &Value, path_id: Option<&str>) -> Result<Value, OperationError> {
    let bag = tx_core::ParameterBag::from_body(params.clone());
    let value_set = resolve_value_set(state, &bag, path_id)?;
    let ctx = build_context(state, &bag);

    let system_version = parse_version_pins(&bag, "system-version");
    let force_system_version = parse_version_pins(&bag, "force-system-version");
    let check_system_version = parse_version_pins(&bag, "check-system-version");

    let request = ExpandRequest {
        filter_text: bag.get_string("filter"),
        offset: bag.get_u32("offset").unwrap_or(0) as usize,
        count: bag.get_u32("count").map(|c| c as usize),
        include_designations: bag.get_bool("includeDesignations").unwrap_or(false),
        include_definition: bag.get_bool("includeDefinition").unwrap_or(false),
        active_only: bag.get_bool("activeOnly").unwrap_or(true),
        exclude_nested: bag.get_bool("excludeNested").unwrap_or(false),
        display_language: bag.get_string("displayLanguage"),
        incomplete_ok: bag.get_bool("incomplete-ok").unwrap_or(false),
        system_version,
        force_system_version,
        check_system_version,
        ..ExpandRequest::default()
    };

    let additional_hashes: Vec<String> = state
        .resource_cache
        .all_of_type(&bag.get_string("cache-id").unwrap_or_default(), "ValueSet")
        .iter()
        .map(tx_core::hash_resource)
        .collect();

    let cache_key = tx_core::expansion_key(
        &value_set.resource.vurl(),
        &json!({
            "filter": request.filter_text,
            "offset": request.offset,
            "count": request.count,
            "includeDesignations": request.include_designations,
            "includeDefinition": request.include_definition,
            "activeOnly": request.active_only,
            "excludeNested": request.exclude_nested,
            "incompleteOk": request.incomplete_ok,
            "systemVersion": request.system_version,
            "forceSystemVersion": request.force_system_version,
            "checkSystemVersion": request.check_system_version,
        }),
        &additional_hashes,
    );

    if let Some(cached) = state.expansion_cache.get(&cache_key, ctx.debugging) {
        return Ok(cached);
    }

    let started = Instant::now();
    let expander = Expander::new(&ctx, state.resolver.as_ref());
    let result = expander.expand(&value_set, &request)?;
    let compute_duration = started.elapsed();

    let with_diagnostics = bag.get_bool("diagnostics").unwrap_or(false);
    let expansion = expansion_to_value_set(&value_set, &result, with_diagnostics, &ctx);
    state
        .expansion_cache
        .offer(cache_key, expansion.clone(), compute_duration);
    Ok(expansion)
}

/// Parses a repeating `system|version` parameter (spec §6's wire notes on
/// `system-version`/`force-system-version`/`check-system-version`) into
/// `(system, version)` pairs, discarding entries without a pipe.
fn parse_version_pins(bag: &tx_core::ParameterBag, name: &str) -> Vec<(String, String)> {
    bag.get_all(name)
        .iter()
        .filter_map(|v| v.as_str())
        .filter_map(|s| s.split_once('|'))
        .map(|(system, version)| (system.to_string(), version.to_string()))
        .collect()
}

fn expansion_to_value_set(
    value_set: &tx_core::ValueSet,
    result: &ExpansionResult,
    with_diagnostics: bool,
    ctx: &tx_core::OperationContext,
) -> Value {
    let contains: Vec<Value> = result.concepts.iter().map(concept_to_value).collect();

    let mut expansion = json!({
        "identifier": format!("urn:uuid:{}", ctx.request_id),
        "timestamp": tx_core::now_utc().to_string(),
        "total": result.total,
        "offset": result.offset,
        "contains": contains,
    });
    if with_diagnostics {
        let steps = ctx.steps();
        let trail: Vec<String> = steps.iter().map(|(ms, note)| format!("{ms}ms: {note}")).collect();
        expansion["parameter"] = json!([{"name": "diagnostics", "valueString": trail.join("; ")}]);
    }

    json!({
        "resourceType": "ValueSet",
        "url": value_set.resource.url,
        "version": value_set.resource.version,
        "expansion": expansion,
    })
}

fn concept_to_value(concept: &ExpandedConcept) -> Value {
    let mut v = json!({
        "system": concept.system,
        "code": concept.code,
    });
    if let Some(version) = &concept.version {
        v["version"] = json!(version);
    }
    if let Some(display) = &concept.display {
        v["display"] = json!(display);
    }
    if !concept.designation.is_empty() {
        v["designation"] = json!(
            concept
                .designation
                .iter()
                .map(|d| json!({"language": d.language, "value": d.value}))
                .collect::<Vec<_>>()
        );
    }
    if concept.inactive {
        v["inactive"] = json!(true);
    }
    if concept.is_abstract {
        v["abstract"] = json!(true);
    }
    v
}
