//! Server configuration, per spec §13.
//!
//! Loaded via the `config` crate from an optional TOML file plus
//! `TX__`-prefixed, double-underscore-separated environment overrides,
//! mirroring the teacher's `octofhir-config` loader shape.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub packages: PackagesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub i18n: I18nConfig,
}

impl AppConfig {
    /// Rejects invalid combinations at startup, before the server binds a
    /// socket -- the same fail-fast shape as the teacher's `validate()`.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if self.server.default_deadline_ms == 0 {
            return Err("server.default_deadline_ms must be > 0".into());
        }

        let level = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&level.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }

        if self.cache.expansion_min_duration_to_admit_ms == 0 {
            return Err("cache.expansion_min_duration_to_admit_ms must be > 0".into());
        }
        if self.cache.expansion_capacity == 0 {
            return Err("cache.expansion_capacity must be > 0".into());
        }

        if self.i18n.default_language.trim().is_empty() {
            return Err("i18n.default_language must not be empty".into());
        }

        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn default_deadline(&self) -> Duration {
        Duration::from_millis(self.server.default_deadline_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Default per-request deadline budget (spec §2) used to build each
    /// request's `OperationContext` unless a client supplies its own.
    #[serde(default = "default_deadline_ms")]
    pub default_deadline_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    1024 * 1024
}
fn default_deadline_ms() -> u64 {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
            default_deadline_ms: default_deadline_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Canonical package preload configuration, mirroring the teacher's
/// `PackagesConfig`/`PackageSpec`, trimmed to the shorthand form this server
/// needs ("id#version").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagesConfig {
    #[serde(default)]
    pub load: Vec<String>,
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
}

fn default_base_dir() -> String {
    ".fhir".into()
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            load: Vec::new(),
            base_dir: default_base_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_resource_cache_max_age_secs")]
    pub resource_max_age_secs: u64,
    #[serde(default = "default_expansion_cache_max_age_secs")]
    pub expansion_max_age_secs: u64,
    /// Minimum compute duration for an expansion to be admitted into the
    /// cache (spec §4.5 default: 2000 ms).
    #[serde(default = "default_min_duration_ms")]
    pub expansion_min_duration_to_admit_ms: u64,
    #[serde(default = "default_expansion_capacity")]
    pub expansion_capacity: usize,
}

fn default_resource_cache_max_age_secs() -> u64 {
    3600
}
fn default_expansion_cache_max_age_secs() -> u64 {
    3600
}
fn default_min_duration_ms() -> u64 {
    2000
}
fn default_expansion_capacity() -> usize {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            resource_max_age_secs: default_resource_cache_max_age_secs(),
            expansion_max_age_secs: default_expansion_cache_max_age_secs(),
            expansion_min_duration_to_admit_ms: default_min_duration_ms(),
            expansion_capacity: default_expansion_capacity(),
        }
    }
}

impl CacheConfig {
    pub fn resource_max_age(&self) -> Duration {
        Duration::from_secs(self.resource_max_age_secs)
    }
    pub fn expansion_max_age(&self) -> Duration {
        Duration::from_secs(self.expansion_max_age_secs)
    }
    pub fn expansion_min_duration_to_admit(&self) -> Duration {
        Duration::from_millis(self.expansion_min_duration_to_admit_ms)
    }
}

/// Backs the `OperationContext`'s i18n message source (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I18nConfig {
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: String,
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default = "default_language")]
    pub fallback_language: String,
}

fn default_catalog_dir() -> String {
    "i18n".into()
}
fn default_language() -> String {
    "en".into()
}

impl Default for I18nConfig {
    fn default() -> Self {
        Self {
            catalog_dir: default_catalog_dir(),
            default_language: default_language(),
            fallback_language: default_language(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                let default_path = PathBuf::from("tx-server.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        builder = builder.add_source(
            Environment::with_prefix("TX")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
