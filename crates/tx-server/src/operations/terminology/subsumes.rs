//! `$subsumes` (spec §6): `GET/POST /CodeSystem/$subsumes`.

use async_trait::async_trait;
use serde_json::{Value, json};

use tx_engine::{Subsumes, SubsumesRequest};

use crate::operations::handler::{OperationError, OperationHandler};
use crate::operations::terminology::support::{build_context, parameters_response};
use crate::server::AppState;

pub struct SubsumesHandler;

#[async_trait]
impl OperationHandler for SubsumesHandler {
    fn code(&self) -> &str {
        "subsumes"
    }

    async fn handle_system(&self, state: &AppState, params: &Value) -> Result<Value, OperationError> {
        let bag = tx_core::ParameterBag::from_body(params.clone());
        let system = bag
            .get_string("system")
            .ok_or_else(|| OperationError::InvalidParameters("'system' is required".into()))?;
        let code_a = bag
            .get_string("codeA")
            .ok_or_else(|| OperationError::InvalidParameters("'codeA' is required".into()))?;
        let code_b = bag
            .get_string("codeB")
            .ok_or_else(|| OperationError::InvalidParameters("'codeB' is required".into()))?;
        let version = bag.get_string("version");

        let ctx = build_context(state, &bag);
        let subsumes = Subsumes::new(&ctx, state.resolver.as_ref());
        let outcome = subsumes.subsumes(&SubsumesRequest {
            system: &system,
            version: version.as_deref(),
            code_a: &code_a,
            code_b: &code_b,
        })?;

        let parameter = vec![
            json!({"name": "system", "valueUri": system}),
            json!({"name": "outcome", "valueCode": outcome.code()}),
        ];
        Ok(parameters_response(parameter, &ctx, &bag))
    }
}
