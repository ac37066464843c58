//! Operation parameter extraction and conversion.
//!
//! This module provides utilities for extracting operation parameters from
//! HTTP requests (both GET and POST) and converting them to FHIR Parameters
//! resources.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

/// Operation parameters extracted from an HTTP request.
///
/// Parameters can come from either:
/// - GET request query string (converted to Parameters resource)
/// - POST request body (either Parameters resource or single resource)
#[derive(Debug, Clone)]
pub enum OperationParams {
    /// Parameters from query string (GET request)
    Get(HashMap<String, String>),
    /// Parameters from request body (POST request)
    Post(Value),
}

impl OperationParams {
    /// Converts the operation parameters to a FHIR Parameters resource.
    ///
    /// For GET requests, query parameters are converted to Parameters.parameter
    /// entries with valueString.
    ///
    /// For POST requests:
    /// - If the body is already a Parameters resource, it's returned as-is
    /// - Otherwise, the body is wrapped as a "resource" parameter
    pub fn to_value(&self) -> Value {
        match self {
            Self::Get(params) => {
                let parameters: Vec<Value> = params
                    .iter()
                    .map(|(name, value)| {
                        json!({
                            "name": name,
                            "valueString": value
                        })
                    })
                    .collect();

                json!({
                    "resourceType": "Parameters",
                    "parameter": parameters
                })
            }
            Self::Post(value) => {
                if value.get("resourceType").and_then(|v| v.as_str()) == Some("Parameters") {
                    value.clone()
                } else {
                    // Single resource parameter - wrap it
                    json!({
                        "resourceType": "Parameters",
                        "parameter": [{
                            "name": "resource",
                            "resource": value
                        }]
                    })
                }
            }
        }
    }

    /// Gets a named parameter value from the Parameters resource.
    ///
    /// For valueX types, returns the value directly.
    /// For resource parameters, returns the resource.
    pub fn get_parameter(&self, name: &str) -> Option<Value> {
        let params = self.to_value();

        params
            .get("parameter")
            .and_then(|arr| arr.as_array())
            .and_then(|arr| {
                arr.iter()
                    .find(|p| p.get("name").and_then(|n| n.as_str()) == Some(name))
            })
            .and_then(|p| {
                p.as_object().and_then(|obj| {
                    // Find the value field (valueString, valueCode, resource, etc.)
                    obj.iter()
                        .find(|(k, _)| k.starts_with("value") || *k == "resource")
                        .map(|(_, v)| v.clone())
                })
            })
    }

    /// Gets all parameter values with the given name.
    ///
    /// Useful for repeating parameters.
    pub fn get_parameters(&self, name: &str) -> Vec<Value> {
        let params = self.to_value();

        params
            .get("parameter")
            .and_then(|arr| arr.as_array())
            .map(|arr| {
                arr.iter()
                    .filter(|p| p.get("name").and_then(|n| n.as_str()) == Some(name))
                    .filter_map(|p| {
                        p.as_object().and_then(|obj| {
                            obj.iter()
                                .find(|(k, _)| k.starts_with("value") || *k == "resource")
                                .map(|(_, v)| v.clone())
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Gets a string parameter value.
    pub fn get_string(&self, name: &str) -> Option<String> {
        self.get_parameter(name)
            .and_then(|v| v.as_str().map(String::from))
    }

    /// Gets a boolean parameter value.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get_parameter(name).and_then(|v| v.as_bool())
    }

    /// Gets a resource parameter value.
    pub fn get_resource(&self, name: &str) -> Option<Value> {
        self.get_parameter(name).filter(|v| v.is_object())
    }

    /// Checks if the parameters are empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Get(params) => params.is_empty(),
            Self::Post(value) => value
                .get("parameter")
                .and_then(|arr| arr.as_array())
                .map(|arr| arr.is_empty())
                .unwrap_or(true),
        }
    }
}

/// Rejection type for operation parameter extraction failures.
#[derive(Debug)]
pub struct OperationParamsRejection {
    message: String,
}

impl IntoResponse for OperationParamsRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "resourceType": "OperationOutcome",
                "issue": [{
                    "severity": "error",
                    "code": "invalid",
                    "diagnostics": self.message
                }]
            })),
        )
            .into_response()
    }
}

impl<S> FromRequest<S> for OperationParams
where
    S: Send + Sync,
{
    type Rejection = OperationParamsRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();

        if method == axum::http::Method::GET {
            // Extract query parameters from parts
            let (mut parts, body) = req.into_parts();
            let Query(params): Query<HashMap<String, String>> =
                Query::from_request_parts(&mut parts, state)
                    .await
                    .map_err(|e| OperationParamsRejection {
                        message: format!("Failed to parse query parameters: {}", e),
                    })?;
            // Reconstruct request for potential further use (though we don't need it here)
            drop(body);
            Ok(OperationParams::Get(params))
        } else {
            // Extract JSON body for POST
            let Json(value): Json<Value> =
                Json::from_request(req, state)
                    .await
                    .map_err(|e| OperationParamsRejection {
                        message: format!("Failed to parse request body: {}", e),
                    })?;
            Ok(OperationParams::Post(value))
        }
    }
}
