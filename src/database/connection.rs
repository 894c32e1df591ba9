//! Configuración de conexión a PostgreSQL
//!
//! Este módulo crea el pool usado por `PgIdentityStore`.

use sqlx::PgPool;
use tracing::info;

use crate::config::{database::DatabaseConfig, ConfigError};

/// Crear un pool de conexiones a la base de datos (perezoso)
pub fn create_pool(database_url: &str) -> Result<PgPool, ConfigError> {
    let config = DatabaseConfig::from_env(database_url)?;
    info!("🗄️ Pool de base de datos configurado para {}", mask_database_url(database_url));

    config.create_lazy_pool().map_err(|e| ConfigError::Invalid {
        name: "DATABASE_URL",
        value: format!("{} ({})", mask_database_url(database_url), e),
    })
}

/// Función helper para enmascarar la URL de la base de datos en logs
pub fn mask_database_url(url: &str) -> String {
    let Some(at_pos) = url.find('@') else {
        return url.to_string();
    };
    if url[..at_pos].rfind(':').is_none() {
        return url.to_string();
    }

    let protocol = match url.find("://") {
        Some(idx) => &url[..idx + 3],
        None => "",
    };
    format!("{}***:***@{}", protocol, &url[at_pos + 1..])
}
