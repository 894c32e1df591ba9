//! Configuración de variables de entorno
//!
//! Este módulo maneja la configuración del entorno y variables de configuración.

use std::env;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Backend que implementa el store de identidad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityBackend {
    Postgres,
    Rest,
    Memory,
}

impl FromStr for IdentityBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" => Ok(IdentityBackend::Postgres),
            "rest" => Ok(IdentityBackend::Rest),
            "memory" => Ok(IdentityBackend::Memory),
            other => Err(ConfigError::Invalid {
                name: "IDENTITY_BACKEND",
                value: other.to_string(),
            }),
        }
    }
}

/// Configuración del entorno
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub environment: String,
    pub port: u16,
    pub host: String,
    pub jwt_secret: String,
    pub jwt_expiration: u64,
    pub cors_origins: Vec<String>,
    pub log_level: String,
    pub backend: IdentityBackend,
    pub database_url: Option<String>,
    pub data_service_url: Option<String>,
    pub data_service_key: Option<String>,
}

impl EnvironmentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: IdentityBackend = optional("IDENTITY_BACKEND")
            .unwrap_or_else(|| "postgres".to_string())
            .parse()?;

        let config = Self {
            environment: optional("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            port: parse_or("PORT", 3000)?,
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration: parse_or("JWT_EXPIRATION", 86_400)?,
            cors_origins: optional("CORS_ORIGINS")
                .map(|origins| {
                    origins
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            log_level: optional("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
            backend,
            database_url: optional("DATABASE_URL"),
            data_service_url: optional("DATA_SERVICE_URL"),
            data_service_key: optional("DATA_SERVICE_KEY"),
        };

        match config.backend {
            IdentityBackend::Postgres if config.database_url.is_none() => {
                Err(ConfigError::Missing("DATABASE_URL"))
            }
            IdentityBackend::Rest if config.data_service_url.is_none() => {
                Err(ConfigError::Missing("DATA_SERVICE_URL"))
            }
            IdentityBackend::Rest if config.data_service_key.is_none() => {
                Err(ConfigError::Missing("DATA_SERVICE_KEY"))
            }
            _ => Ok(config),
        }
    }

    /// Verificar si estamos en modo desarrollo
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Verificar si estamos en modo producción
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Obtener la URL del servidor
    pub fn server_url(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub(crate) fn optional(name: &'static str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn required(name: &'static str) -> Result<String, ConfigError> {
    optional(name).ok_or(ConfigError::Missing(name))
}

pub(crate) fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
