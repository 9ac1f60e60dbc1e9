use secrecy::Secret;
use serde::Deserialize;
use service_core::config::{self as core_config, get_env, is_production};
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct BackofficeConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub store: StoreConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

/// Which [`DocumentStore`](crate::store::DocumentStore) backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Mongodb,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(StoreBackend::Mongodb),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::ConfigError(anyhow::anyhow!(
                "STORE_BACKEND must be 'mongodb' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// When set, spans are exported over OTLP as well as logged.
    pub otlp_endpoint: Option<String>,
}

impl BackofficeConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = is_production();

        let backend: StoreBackend = get_env("STORE_BACKEND", Some("mongodb"), is_prod)?.parse()?;
        // The URI is only mandatory when MongoDB actually backs the service.
        let uri = match backend {
            StoreBackend::Mongodb => {
                get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?
            }
            StoreBackend::Memory => env::var("MONGODB_URI").unwrap_or_default(),
        };

        Ok(BackofficeConfig {
            common: common_config,
            mongodb: MongoConfig {
                uri: Secret::new(uri),
                database: get_env("MONGODB_DATABASE", Some("backoffice_db"), is_prod)?,
            },
            store: StoreConfig { backend },
            observability: ObservabilityConfig {
                log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
                otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
            },
        })
    }

    /// In-memory configuration on a random port, for tests and local runs.
    pub fn in_memory() -> Self {
        BackofficeConfig {
            common: core_config::Config { port: 0 },
            mongodb: MongoConfig {
                uri: Secret::new(String::new()),
                database: "backoffice_db".to_string(),
            },
            store: StoreConfig {
                backend: StoreBackend::Memory,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                otlp_endpoint: None,
            },
        }
    }
}
