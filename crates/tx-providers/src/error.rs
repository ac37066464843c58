//! Provider-local failures (spec §12), converted to [`tx_core::TxError`] at
//! the provider-contract boundary.

use thiserror::Error;
use tx_core::TxError;

#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("code must not be empty")]
    EmptyCode,

    #[error("code '{0}' not found")]
    NotFound(String),

    #[error("filter on property '{property}' with op '{op}' is not supported by this provider")]
    FilterNotSupported { property: String, op: String },
}

impl From<ProviderError> for TxError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::EmptyCode => TxError::invalid("code must not be empty"),
            ProviderError::NotFound(code) => TxError::not_found(format!("code '{code}' not found")),
            ProviderError::FilterNotSupported { property, op } => TxError::not_supported(format!(
                "filter on property '{property}' with op '{op}' is not supported"
            )),
        }
    }
}
