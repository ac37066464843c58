//! Axum wiring: [`AppState`], the route table, and [`ServerBuilder`]/[`TxServer`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use tx_core::{ExpansionCache, ResourceCache};

use crate::canonical::CanonicalResolver;
use crate::config::AppConfig;
use crate::operations::router;

/// Shared, per-process server state handed to every request handler.
///
/// `resource_cache`/`expansion_cache` are shared across requests by design
/// (spec §4.5) -- everything else here is either immutable configuration or
/// itself internally synchronized (`CanonicalResolver`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub resolver: Arc<CanonicalResolver>,
    pub resource_cache: Arc<ResourceCache>,
    pub expansion_cache: Arc<ExpansionCache>,
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "resourceType": "CapabilityStatement",
        "status": "active",
        "kind": "instance",
        "fhirVersion": "4.0.1",
        "rest": [{
            "mode": "server",
            "resource": [
                {"type": "CodeSystem", "operation": [
                    {"name": "lookup", "definition": "http://hl7.org/fhir/OperationDefinition/CodeSystem-lookup"},
                    {"name": "validate-code", "definition": "http://hl7.org/fhir/OperationDefinition/CodeSystem-validate-code"},
                    {"name": "subsumes", "definition": "http://hl7.org/fhir/OperationDefinition/CodeSystem-subsumes"},
                ]},
                {"type": "ValueSet", "operation": [
                    {"name": "expand", "definition": "http://hl7.org/fhir/OperationDefinition/ValueSet-expand"},
                    {"name": "validate-code", "definition": "http://hl7.org/fhir/OperationDefinition/ValueSet-validate-code"},
                ]},
            ],
        }],
    }))
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route(
            "/ValueSet/$expand",
            get(router::value_set_expand).post(router::value_set_expand),
        )
        .route(
            "/ValueSet/{id}/$expand",
            get(router::value_set_expand_instance).post(router::value_set_expand_instance),
        )
        .route(
            "/ValueSet/$validate-code",
            get(router::value_set_validate_code).post(router::value_set_validate_code),
        )
        .route(
            "/ValueSet/{id}/$validate-code",
            get(router::value_set_validate_code_instance).post(router::value_set_validate_code_instance),
        )
        .route(
            "/CodeSystem/$lookup",
            get(router::code_system_lookup).post(router::code_system_lookup),
        )
        .route(
            "/CodeSystem/$validate-code",
            get(router::code_system_validate_code).post(router::code_system_validate_code),
        )
        .route(
            "/CodeSystem/{id}/$validate-code",
            get(router::code_system_validate_code_instance).post(router::code_system_validate_code_instance),
        )
        .route(
            "/CodeSystem/$subsumes",
            get(router::code_system_subsumes).post(router::code_system_subsumes),
        )
        .layer(DefaultBodyLimit::max(state.config.server.body_limit_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct TxServer {
    addr: SocketAddr,
    app: Router,
}

impl TxServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

pub struct ServerBuilder {
    config: AppConfig,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the server: constructs the canonical resolver and loads its
    /// configured packages. A failed package load is logged and the server
    /// still starts on built-in systems only (spec §1: the catalog is an
    /// external collaborator, not a hard startup dependency).
    pub async fn build(self) -> anyhow::Result<TxServer> {
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

        let addr = self.config.addr();
        let config = Arc::new(self.config);

        let resolver = Arc::new(CanonicalResolver::new());
        if let Err(e) = resolver.init(&config).await {
            tracing::warn!(error = %e, "canonical manager initialization failed, continuing on built-in systems only");
        }

        let state = AppState {
            resource_cache: Arc::new(ResourceCache::new(config.cache.resource_max_age())),
            expansion_cache: Arc::new(ExpansionCache::new(
                config.cache.expansion_max_age(),
                config.cache.expansion_min_duration_to_admit(),
                config.cache.expansion_capacity,
            )),
            resolver,
            config,
        };

        Ok(TxServer {
            addr,
            app: build_router(state),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
