//! Operation handler trait and error types.
//!
//! This module defines the trait that must be implemented by concrete
//! operation handlers, as well as the error types for operation failures.

use async_trait::async_trait;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};

use crate::server::AppState;
use tx_core::TxError;

/// Error type for FHIR operation failures.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// Invalid or missing parameters
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Operation not supported at this level
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Validation failed
    #[error("Validation failed")]
    ValidationFailed(Value),
}

/// Trait for implementing FHIR operations.
///
/// Each operation handler implements this trait to provide the logic for
/// executing the operation at different levels (system, type, instance).
///
/// # Implementation Notes
///
/// - Implement only the methods that are relevant for your operation's level(s)
/// - Default implementations return `NotSupported` errors
/// - The `code` method returns the operation code without the `$` prefix
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Returns the operation code (without the `$` prefix).
    fn code(&self) -> &str;

    /// Handles the operation at system level (e.g., `GET /$operation`).
    ///
    /// Override this method if your operation supports system-level invocation.
    async fn handle_system(
        &self,
        _state: &AppState,
        _params: &Value,
    ) -> Result<Value, OperationError> {
        Err(OperationError::NotSupported(format!(
            "Operation ${} is not supported at system level",
            self.code()
        )))
    }

    /// Handles the operation at type level (e.g., `GET /Patient/$operation`).
    ///
    /// Override this method if your operation supports type-level invocation.
    async fn handle_type(
        &self,
        _state: &AppState,
        _resource_type: &str,
        _params: &Value,
    ) -> Result<Value, OperationError> {
        Err(OperationError::NotSupported(format!(
            "Operation ${} is not supported at type level",
            self.code()
        )))
    }

    /// Handles the operation at instance level (e.g., `GET /Patient/123/$operation`).
    ///
    /// Override this method if your operation supports instance-level invocation.
    async fn handle_instance(
        &self,
        _state: &AppState,
        _resource_type: &str,
        _id: &str,
        _params: &Value,
    ) -> Result<Value, OperationError> {
        Err(OperationError::NotSupported(format!(
            "Operation ${} is not supported at instance level",
            self.code()
        )))
    }
}

impl From<TxError> for OperationError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::Invalid(m) | TxError::CycleDetected(m) => OperationError::InvalidParameters(m),
            TxError::NotFound(m) => OperationError::NotFound(m),
            other => OperationError::ValidationFailed(outcome_from_error(&other)),
        }
    }
}

/// Builds an `OperationOutcome` carrying a single issue per spec §7's status
/// table; `TooCostly` additionally carries the accumulated step log as
/// diagnostics.
pub fn outcome_from_error(err: &TxError) -> Value {
    let mut diagnostics = err.to_string();
    if let TxError::TooCostly { diagnostics: steps, .. } = err {
        let trail: Vec<String> = steps.iter().map(|(ms, note)| format!("{ms}ms: {note}")).collect();
        diagnostics = format!("{diagnostics} [{}]", trail.join(", "));
    }
    json!({
        "resourceType": "OperationOutcome",
        "issue": [{
            "severity": "error",
            "code": err.issue_code(),
            "diagnostics": diagnostics,
        }]
    })
}

impl IntoResponse for OperationError {
    fn into_response(self) -> Response {
        match self {
            OperationError::InvalidParameters(msg) => (
                StatusCode::BAD_REQUEST,
                Json(outcome_from_error(&TxError::invalid(msg))),
            )
                .into_response(),
            OperationError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                Json(outcome_from_error(&TxError::not_found(msg))),
            )
                .into_response(),
            OperationError::NotSupported(msg) => (
                StatusCode::OK,
                Json(outcome_from_error(&TxError::not_supported(msg))),
            )
                .into_response(),
            OperationError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "resourceType": "OperationOutcome",
                    "issue": [{"severity": "fatal", "code": "exception", "diagnostics": msg}]
                })),
            )
                .into_response(),
            OperationError::ValidationFailed(outcome) => {
                let status = outcome
                    .get("issue")
                    .and_then(|i| i.as_array())
                    .and_then(|a| a.first())
                    .and_then(|i| i.get("code"))
                    .and_then(|c| c.as_str())
                    .map(status_for_issue_code)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status, Json(outcome)).into_response()
            }
        }
    }
}

fn status_for_issue_code(code: &str) -> StatusCode {
    match code {
        "invalid" => StatusCode::BAD_REQUEST,
        "not-found" => StatusCode::NOT_FOUND,
        "too-costly" | "processing" => StatusCode::UNPROCESSABLE_ENTITY,
        "code-invalid" | "business-rule" | "not-supported" => StatusCode::OK,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
