//! HTTP wiring for the 8 terminology operation routes.
//!
//! Unlike a general FHIR server, this surface is fixed and small enough that
//! each route is wired directly to its handler rather than looked up through
//! a dynamic operation registry.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, http::StatusCode};

use super::handler::{OperationError, OperationHandler};
use super::params::OperationParams;
use super::terminology::{
    ExpandHandler, LookupHandler, SubsumesHandler, ValidateCodeSystemCodeHandler,
    ValidateValueSetCodeHandler,
};
use crate::server::AppState;

fn respond(result: Result<serde_json::Value, OperationError>) -> Response {
    match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn value_set_expand(State(state): State<AppState>, params: OperationParams) -> Response {
    let value = params.to_value();
    respond(ExpandHandler.handle_system(&state, &value).await)
}

pub async fn value_set_expand_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: OperationParams,
) -> Response {
    let value = params.to_value();
    respond(
        ExpandHandler
            .handle_instance(&state, "ValueSet", &id, &value)
            .await,
    )
}

pub async fn code_system_lookup(State(state): State<AppState>, params: OperationParams) -> Response {
    let value = params.to_value();
    respond(LookupHandler.handle_system(&state, &value).await)
}

pub async fn value_set_validate_code(State(state): State<AppState>, params: OperationParams) -> Response {
    let value = params.to_value();
    respond(
        ValidateValueSetCodeHandler
            .handle_system(&state, &value)
            .await,
    )
}

pub async fn value_set_validate_code_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: OperationParams,
) -> Response {
    let value = params.to_value();
    respond(
        ValidateValueSetCodeHandler
            .handle_instance(&state, "ValueSet", &id, &value)
            .await,
    )
}

pub async fn code_system_validate_code(
    State(state): State<AppState>,
    params: OperationParams,
) -> Response {
    let value = params.to_value();
    respond(
        ValidateCodeSystemCodeHandler
            .handle_system(&state, &value)
            .await,
    )
}

pub async fn code_system_validate_code_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: OperationParams,
) -> Response {
    let value = params.to_value();
    respond(
        ValidateCodeSystemCodeHandler
            .handle_instance(&state, "CodeSystem", &id, &value)
            .await,
    )
}

pub async fn code_system_subsumes(State(state): State<AppState>, params: OperationParams) -> Response {
    let value = params.to_value();
    respond(SubsumesHandler.handle_system(&state, &value).await)
}
