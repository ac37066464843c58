pub mod canonical;
pub mod config;
pub mod observability;
pub mod operations;
pub mod server;

pub use canonical::CanonicalResolver;
pub use config::AppConfig;
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level, shutdown_tracing};
pub use server::{AppState, ServerBuilder, TxServer};
