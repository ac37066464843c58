//! The unified error taxonomy for the terminology engine (spec §7).
//!
//! Every crate downstream of `tx-core` converts its local errors into a
//! `TxError` at the point it crosses back into request-scoped code, so the
//! HTTP layer in `tx-server` only ever has one error type to turn into an
//! `OperationOutcome`.

use thiserror::Error;

/// The failure taxonomy from spec §7.
#[derive(Debug, Error, Clone)]
pub enum TxError {
    /// Malformed input or conflicting parameters.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// An unknown code system, value set, or code.
    #[error("not found: {0}")]
    NotFound(String),

    /// A code was rejected by the target system or value set.
    #[error("code invalid: {0}")]
    CodeInvalid(String),

    /// Abstract used where forbidden, inactive used under `activeOnly`, etc.
    #[error("business rule violation: {0}")]
    BusinessRule(String),

    /// A filter operator or resource shape the provider refuses to handle.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Deadline expired or an expansion limit was breached.
    #[error("too costly: {message}")]
    TooCostly {
        message: String,
        /// The accumulated `(elapsed_ms, note)` step log at the time of failure.
        diagnostics: Vec<(u64, String)>,
    },

    /// A value-set reference graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A `CodeSystem` with `content = supplement` has no resolvable parent.
    #[error("supplement missing parent: {0}")]
    SupplementMissing(String),
}

impl TxError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn code_invalid(msg: impl Into<String>) -> Self {
        Self::CodeInvalid(msg.into())
    }

    pub fn business_rule(msg: impl Into<String>) -> Self {
        Self::BusinessRule(msg.into())
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::NotSupported(msg.into())
    }

    pub fn too_costly(msg: impl Into<String>, diagnostics: Vec<(u64, String)>) -> Self {
        Self::TooCostly {
            message: msg.into(),
            diagnostics,
        }
    }

    pub fn cycle_detected(msg: impl Into<String>) -> Self {
        Self::CycleDetected(msg.into())
    }

    pub fn supplement_missing(msg: impl Into<String>) -> Self {
        Self::SupplementMissing(msg.into())
    }

    /// The issue `code` this error maps to in an `OperationOutcome.issue`.
    pub fn issue_code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid",
            Self::NotFound(_) => "not-found",
            Self::CodeInvalid(_) => "code-invalid",
            Self::BusinessRule(_) => "business-rule",
            Self::NotSupported(_) => "not-supported",
            Self::TooCostly { .. } => "too-costly",
            Self::CycleDetected(_) => "invalid",
            Self::SupplementMissing(_) => "processing",
        }
    }

    /// The HTTP status spec §6/§7 maps this error kind to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Invalid(_) | Self::CycleDetected(_) => 400,
            Self::NotFound(_) => 404,
            Self::CodeInvalid(_) | Self::BusinessRule(_) | Self::NotSupported(_) => 200,
            Self::TooCostly { .. } | Self::SupplementMissing(_) => 422,
        }
    }
}

pub type Result<T> = std::result::Result<T, TxError>;
