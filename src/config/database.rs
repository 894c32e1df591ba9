//! Configuración de base de datos
//!
//! Este módulo maneja la configuración del pool de PostgreSQL con SQLx.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::environment::{parse_or, ConfigError};

/// Configuración de la base de datos
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 20,
            min_connections: 0,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(3600),
        }
    }

    pub fn from_env(url: impl Into<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(url);
        config.max_connections = parse_or("DATABASE_MAX_CONNECTIONS", config.max_connections)?;
        config.connect_timeout =
            Duration::from_secs(parse_or("DATABASE_CONNECT_TIMEOUT_SECS", config.connect_timeout.as_secs())?);
        Ok(config)
    }

    /// Crear el pool sin abrir conexiones: el arranque no falla si la base
    /// no responde, el gate de conectividad lo reporta después.
    pub fn create_lazy_pool(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
            .connect_lazy(&self.url)
    }
}
