//! `$validate-code` (spec §6): `GET/POST /ValueSet/$validate-code`,
//! `/ValueSet/{id}/$validate-code`, `/CodeSystem/$validate-code` and
//! `/CodeSystem/{id}/$validate-code`.
//!
//! A rejected code is never an HTTP failure (spec §7: `CodeInvalid` carries
//! HTTP 200) -- it's a `Parameters` response with `result: false`.

use async_trait::async_trait;
use serde_json::{Value, json};

use tx_core::TxError;
use tx_engine::{CheckRequest, CheckResult, Checker, DisplayMode, DisplayVerdict};

use crate::operations::handler::{OperationError, OperationHandler};
use crate::operations::terminology::support::{
    build_context, parameters_response, resolve_code_system, resolve_value_set,
};
use crate::server::AppState;

/// `ValueSet/$validate-code`.
pub struct ValidateValueSetCodeHandler;

#[async_trait]
impl OperationHandler for ValidateValueSetCodeHandler {
    fn code(&self) -> &str {
        "validate-code"
    }

    async fn handle_system(&self, state: &AppState, params: &Value) -> Result<Value, OperationError> {
        run_value_set(state, params, None)
    }

    async fn handle_instance(
        &self,
        state: &AppState,
        _resource_type: &str,
        id: &str,
        params: &Value,
    ) -> Result<Value, OperationError> {
        run_value_set(state, params, Some(id))
    }
}

/// `CodeSystem/$validate-code`.
pub struct ValidateCodeSystemCodeHandler;

#[async_trait]
impl OperationHandler for ValidateCodeSystemCodeHandler {
    fn code(&self) -> &str {
        "validate-code"
    }

    async fn handle_system(&self, state: &AppState, params: &Value) -> Result<Value, OperationError> {
        run_code_system(state, params, None)
    }

    async fn handle_instance(
        &self,
        state: &AppState,
        _resource_type: &str,
        id: &str,
        params: &Value,
    ) -> Result<Value, OperationError> {
        run_code_system(state, params, Some(id))
    }
}

fn run_value_set(state: &AppState, params: &Value, path_id: Option<&str>) -> Result<Value, OperationError> {
    let bag = tx_core::ParameterBag::from_body(params.clone());
    let code = bag
        .get_string("code")
        .ok_or_else(|| OperationError::InvalidParameters("'code' is required".into()))?;
    let value_set = resolve_value_set(state, &bag, path_id)?;
    let ctx = build_context(state, &bag);

    let lenient = bag.get_bool("lenient-display-validation").unwrap_or(false);
    let system_owned = bag.get_string("system");
    let display_owned = bag.get_string("display");
    let request = CheckRequest {
        system: system_owned.as_deref(),
        code: &code,
        display: display_owned.as_deref(),
        display_mode: DisplayMode::CaseInsensitive,
        lenient_display_validation: lenient,
        infer_system: bag.get_bool("inferSystem").unwrap_or(false),
        allow_abstract: bag.get_bool("abstract").unwrap_or(false),
    };

    let checker = Checker::new(&ctx, state.resolver.as_ref());
    let result = match checker.check(&value_set, &request) {
        Ok(r) => r,
        Err(TxError::NotFound(msg)) => return Err(OperationError::NotFound(msg)),
        Err(other) => return Err(OperationError::from(other)),
    };

    Ok(parameters_response(result_to_parameters(&result), &ctx, &bag))
}

fn run_code_system(state: &AppState, params: &Value, path_id: Option<&str>) -> Result<Value, OperationError> {
    let bag = tx_core::ParameterBag::from_body(params.clone());
    let code = bag
        .get_string("code")
        .ok_or_else(|| OperationError::InvalidParameters("'code' is required".into()))?;
    let provider = resolve_code_system(state, &bag, path_id)?;
    let ctx = build_context(state, &bag);

    let allow_abstract = bag.get_bool("abstract").unwrap_or(false);
    let concept = provider.locate(&code);
    let parameter = match concept {
        None => vec![
            json!({"name": "result", "valueBoolean": false}),
            json!({"name": "message", "valueString": format!("code '{code}' not found in system '{}'", provider.system_url())}),
            json!({"name": "cause", "valueCode": "code-invalid"}),
        ],
        Some(concept) if provider.is_abstract(&concept) && !allow_abstract => vec![
            json!({"name": "result", "valueBoolean": false}),
            json!({"name": "message", "valueString": format!("code '{code}' is abstract and cannot be selected")}),
            json!({"name": "cause", "valueCode": "business-rule"}),
            json!({"name": "abstract", "valueBoolean": true}),
        ],
        Some(concept) => {
            let display = provider.display(&concept, bag.get_string("displayLanguage").as_deref());
            let mut parameter = vec![json!({"name": "result", "valueBoolean": true})];
            if let Some(display) = &display {
                parameter.push(json!({"name": "display", "valueString": display}));
            }
            if provider.is_abstract(&concept) {
                parameter.push(json!({"name": "abstract", "valueBoolean": true}));
            }
            if let Some(supplied) = bag.get_string("display") {
                if let Some(expected) = &display {
                    if !supplied.eq_ignore_ascii_case(expected) {
                        parameter.push(json!({
                            "name": "message",
                            "valueString": format!("display '{supplied}' does not match expected '{expected}'"),
                        }));
                    }
                }
            }
            parameter
        }
    };

    Ok(parameters_response(parameter, &ctx, &bag))
}

fn result_to_parameters(result: &CheckResult) -> Vec<Value> {
    let mut parameter = vec![json!({"name": "result", "valueBoolean": result.valid})];
    if !result.valid {
        parameter.push(json!({"name": "cause", "valueCode": result.cause.unwrap_or("code-invalid")}));
    }
    if let Some(system) = &result.matched_system {
        parameter.push(json!({"name": "system", "valueUri": system}));
    }
    if let Some(display) = &result.matched_display {
        parameter.push(json!({"name": "display", "valueString": display}));
    }
    match &result.display_verdict {
        Some(DisplayVerdict::Mismatch { expected }) => {
            parameter.push(json!({
                "name": "message",
                "valueString": format!("display does not match expected '{expected}'"),
            }));
        }
        Some(DisplayVerdict::NormalisedMismatch { expected }) => {
            parameter.push(json!({
                "name": "message",
                "valueString": format!("display matches '{expected}' only after normalization"),
            }));
        }
        _ => {}
    }
    if result.is_abstract {
        parameter.push(json!({"name": "abstract", "valueBoolean": true}));
    }
    if result.inactive {
        parameter.push(json!({"name": "inactive", "valueBoolean": true}));
    }
    parameter
}
