//! End-to-end coverage of the operation handlers against the scenario seeds.
//!
//! These exercise the real `OperationHandler` implementations wired in
//! `tx_server::operations`, built-in providers included, through an
//! `AppState` that never touches the network: built-in `CodeSystem`s are
//! registered synchronously by `CanonicalResolver::new()`, and `ValueSet`s
//! are supplied inline via the `valueSet` parameter rather than resolved
//! from a catalog.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use tx_core::{ExpansionCache, ResourceCache};
use tx_server::config::AppConfig;
use tx_server::operations::{
    ExpandHandler, LookupHandler, OperationHandler, OperationParams, SubsumesHandler,
    ValidateValueSetCodeHandler,
};
use tx_server::{AppState, CanonicalResolver};

fn state_with(cache: tx_server::config::CacheConfig) -> AppState {
    let mut config = AppConfig::default();
    config.cache = cache;
    let config = Arc::new(config);
    AppState {
        resolver: Arc::new(CanonicalResolver::new()),
        resource_cache: Arc::new(ResourceCache::new(config.cache.resource_max_age())),
        expansion_cache: Arc::new(ExpansionCache::new(
            config.cache.expansion_max_age(),
            config.cache.expansion_min_duration_to_admit(),
            config.cache.expansion_capacity,
        )),
        config,
    }
}

fn default_state() -> AppState {
    state_with(AppConfig::default().cache)
}

fn get(pairs: &[(&str, &str)]) -> serde_json::Value {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    OperationParams::Get(map).to_value()
}

fn post(value: serde_json::Value) -> serde_json::Value {
    OperationParams::Post(value).to_value()
}

/// Scenario 1: a whole-system include of `administrative-gender` expands to
/// its four concepts.
#[tokio::test]
async fn administrative_gender_expands_to_four_entries() {
    let state = default_state();
    let params = post(json!({
        "resourceType": "Parameters",
        "parameter": [{
            "name": "valueSet",
            "resource": {
                "resourceType": "ValueSet",
                "url": "http://hl7.org/fhir/ValueSet/administrative-gender",
                "compose": {
                    "include": [{"system": "http://hl7.org/fhir/administrative-gender"}]
                }
            }
        }]
    }));

    let expanded = ExpandHandler.handle_system(&state, &params).await.unwrap();
    let contains = expanded["expansion"]["contains"].as_array().unwrap();
    assert_eq!(contains.len(), 4);

    let codes: Vec<&str> = contains.iter().map(|c| c["code"].as_str().unwrap()).collect();
    for expected in ["male", "female", "other", "unknown"] {
        assert!(codes.contains(&expected), "missing code {expected}");
    }
}

/// Scenario 2: `$lookup` on a currency reports its provider-extended
/// `decimals`/`symbol` properties alongside the display.
#[tokio::test]
async fn currency_lookup_reports_decimals_and_symbol() {
    let state = default_state();
    let params = get(&[("system", "urn:iso:std:iso:4217"), ("code", "USD")]);

    let result = LookupHandler.handle_system(&state, &params).await.unwrap();
    let parameter = result["parameter"].as_array().unwrap();

    let display = parameter.iter().find(|p| p["name"] == "display").unwrap();
    assert_eq!(display["valueString"], "United States dollar");

    let property_value = |property_code: &str| {
        let prop = parameter
            .iter()
            .filter(|p| p["name"] == "property")
            .find(|p| {
                p["part"].as_array().unwrap().iter().any(|part| {
                    part["name"] == "code" && part["valueCode"] == property_code
                })
            })
            .unwrap_or_else(|| panic!("no '{property_code}' property in response"));
        prop["part"]
            .as_array()
            .unwrap()
            .iter()
            .find(|part| part["name"] == "value")
            .unwrap()["value"]
            .clone()
    };

    assert_eq!(property_value("decimals"), 2);
    assert_eq!(property_value("symbol"), "$");
}

/// Scenario 3: a code outside a restricted value set is rejected with
/// `result=false` and `cause=code-invalid`, not an HTTP failure.
#[tokio::test]
async fn code_outside_restricted_value_set_is_rejected() {
    let state = default_state();
    let params = post(json!({
        "resourceType": "Parameters",
        "parameter": [
            {"name": "code", "valueCode": "other"},
            {"name": "system", "valueUri": "http://hl7.org/fhir/administrative-gender"},
            {
                "name": "valueSet",
                "resource": {
                    "resourceType": "ValueSet",
                    "url": "http://example.org/ValueSet/restricted-gender",
                    "compose": {
                        "include": [{
                            "system": "http://hl7.org/fhir/administrative-gender",
                            "concept": [{"code": "male"}, {"code": "female"}]
                        }]
                    }
                }
            }
        ]
    }));

    let outcome = ValidateValueSetCodeHandler.handle_system(&state, &params).await.unwrap();
    let parameter = outcome["parameter"].as_array().unwrap();

    let result = parameter.iter().find(|p| p["name"] == "result").unwrap();
    assert_eq!(result["valueBoolean"], false);

    let cause = parameter.iter().find(|p| p["name"] == "cause").unwrap();
    assert_eq!(cause["valueCode"], "code-invalid");
}

/// Scenario 4: `male` and `female` are siblings in `administrative-gender`,
/// not in an is-a relationship.
#[tokio::test]
async fn male_and_female_do_not_subsume() {
    let state = default_state();
    let params = get(&[
        ("system", "http://hl7.org/fhir/administrative-gender"),
        ("codeA", "male"),
        ("codeB", "female"),
    ]);

    let outcome = SubsumesHandler.handle_system(&state, &params).await.unwrap();
    let parameter = outcome["parameter"].as_array().unwrap();
    let result = parameter.iter().find(|p| p["name"] == "outcome").unwrap();
    assert_eq!(result["valueCode"], "not-subsumed");
}

/// Scenario 5: expanding all currencies while excluding `XXX`, paged to 5,
/// returns exactly five entries and never `XXX`.
#[tokio::test]
async fn currency_expansion_excludes_and_pages() {
    let state = default_state();
    let params = post(json!({
        "resourceType": "Parameters",
        "parameter": [
            {"name": "count", "valueInteger": 5},
            {"name": "offset", "valueInteger": 0},
            {
                "name": "valueSet",
                "resource": {
                    "resourceType": "ValueSet",
                    "url": "http://example.org/ValueSet/all-currencies-no-xxx",
                    "compose": {
                        "include": [{"system": "urn:iso:std:iso:4217"}],
                        "exclude": [{"system": "urn:iso:std:iso:4217", "concept": [{"code": "XXX"}]}]
                    }
                }
            }
        ]
    }));

    let expanded = ExpandHandler.handle_system(&state, &params).await.unwrap();
    let contains = expanded["expansion"]["contains"].as_array().unwrap();
    assert_eq!(contains.len(), 5);
    assert!(contains.iter().all(|c| c["code"] != "XXX"));
}

/// Scenario 6: an admitted expansion is served from the cache on a repeat
/// request with the same inputs, and the cache records the hit.
#[tokio::test]
async fn repeated_expansion_is_served_from_cache() {
    // A zero admission threshold lets this fast in-memory expansion qualify
    // for caching without actually taking seconds to compute; `offer` admits
    // whenever `compute_duration >= min_duration_to_admit`.
    let mut cache_cfg = AppConfig::default().cache;
    cache_cfg.expansion_min_duration_to_admit_ms = 0;
    let state = state_with(cache_cfg);

    let value_set = json!({
        "resourceType": "ValueSet",
        "url": "http://example.org/ValueSet/all-currencies",
        "compose": {"include": [{"system": "urn:iso:std:iso:4217"}]}
    });
    let params = post(json!({
        "resourceType": "Parameters",
        "parameter": [{"name": "valueSet", "resource": value_set}]
    }));

    assert!(state.expansion_cache.is_empty());

    let first = ExpandHandler.handle_system(&state, &params).await.unwrap();
    assert_eq!(state.expansion_cache.len(), 1);

    let second = ExpandHandler.handle_system(&state, &params).await.unwrap();
    assert_eq!(
        first["expansion"]["contains"],
        second["expansion"]["contains"]
    );
    assert_eq!(state.expansion_cache.len(), 1, "same inputs reuse the existing entry");
}
