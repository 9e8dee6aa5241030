//! Configuration module for directory-service.

use crate::dn::DirectoryContext;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    /// Naming suffix of the directory, e.g. `dc=example,dc=com`.
    pub suffix: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl DirectoryConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let config = Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "directory-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            suffix: env::var("DIRECTORY_SUFFIX").map_err(|_| {
                AppError::ConfigError(anyhow::anyhow!("DIRECTORY_SUFFIX is required"))
            })?,
        };

        // Fail at startup rather than on the first insert.
        config.context()?;
        Ok(config)
    }

    /// Normalization context for the configured suffix.
    pub fn context(&self) -> Result<DirectoryContext, AppError> {
        DirectoryContext::new(&self.suffix).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid DIRECTORY_SUFFIX: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(suffix: &str) -> DirectoryConfig {
        DirectoryConfig {
            common: core_config::Config::default(),
            service_name: "directory-service".to_string(),
            service_version: "test".to_string(),
            log_level: "debug".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: "postgres://localhost/directory".to_string(),
                max_connections: 2,
                min_connections: 1,
            },
            suffix: suffix.to_string(),
        }
    }

    #[test]
    fn context_uses_configured_suffix() {
        let ctx = config("dc=Example,dc=com").context().unwrap();
        assert_eq!(ctx.suffix().norm(), "dc=example,dc=com");
    }

    #[test]
    fn invalid_suffix_is_a_config_error() {
        let err = config("example.com").context().unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }
}
