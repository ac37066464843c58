//! The terminology operation surface (spec §6): parameter extraction,
//! the `OperationHandler` trait operations are implemented against, the
//! 4 concrete handlers, and the axum routes wiring them up.

pub mod handler;
pub mod params;
pub mod router;
pub mod terminology;

pub use handler::{OperationError, OperationHandler};
pub use params::OperationParams;
pub use terminology::{
    ExpandHandler, LookupHandler, SubsumesHandler, ValidateCodeSystemCodeHandler,
    ValidateValueSetCodeHandler,
};
