//! `$lookup` (spec §6): `GET/POST /CodeSystem/$lookup`.

use async_trait::async_trait;
use serde_json::{Value, json};

use tx_engine::{Lookup, LookupRequest, LookupResult};

use crate::operations::handler::{OperationError, OperationHandler};
use crate::operations::terminology::support::{build_context, parameters_response, resolve_code_system, string_param};
use crate::server::AppState;

pub struct LookupHandler;

#[async_trait]
impl OperationHandler for LookupHandler {
    fn code(&self) -> &str {
        "lookup"
    }

    async fn handle_system(&self, state: &AppState, params: &Value) -> Result<Value, OperationError> {
        let bag = tx_core::ParameterBag::from_body(params.clone());
        let code = bag
            .get_string("code")
            .ok_or_else(|| OperationError::InvalidParameters("'code' is required".into()))?;

        let provider = resolve_code_system(state, &bag, None)?;
        let requested: Vec<String> = bag
            .get_all("property")
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect();

        let ctx = build_context(state, &bag);
        let lookup = Lookup::new(&ctx, state.resolver.as_ref());
        let result = lookup.lookup(&LookupRequest {
            system: provider.system_url(),
            version: provider.version(),
            code: &code,
            display_language: bag.get_string("displayLanguage").as_deref(),
            requested_properties: &requested,
        })?;

        Ok(parameters_response(result_to_parameters(&result), &ctx, &bag))
    }
}

fn result_to_parameters(result: &LookupResult) -> Vec<Value> {
    let mut parameter = vec![json!({"name": "system", "valueUri": result.system})];
    if let Some(version) = &result.version {
        parameter.push(string_param("version", version.clone()));
    }
    if let Some(display) = &result.display {
        parameter.push(string_param("display", display.clone()));
    }
    for designation in &result.designations {
        let mut part = vec![json!({"name": "value", "valueString": designation.value})];
        if let Some(language) = &designation.language {
            part.push(json!({"name": "language", "valueCode": language}));
        }
        parameter.push(json!({"name": "designation", "part": part}));
    }
    for property in &result.properties {
        parameter.push(json!({
            "name": "property",
            "part": [
                {"name": "code", "valueCode": property.code},
                {"name": "value", "value": property.value},
            ],
        }));
    }
    parameter.push(json!({"name": "abstract", "valueBoolean": result.is_abstract}));
    if result.inactive {
        parameter.push(json!({"name": "inactive", "valueBoolean": true}));
    }
    parameter
}
