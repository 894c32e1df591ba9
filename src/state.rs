//! Estado compartido de la aplicación
//!
//! Este módulo define el estado que se pasa a través del router de Axum.

use std::sync::Arc;

use crate::config::environment::EnvironmentConfig;
use crate::services::IdentityService;
use crate::utils::jwt::JwtConfig;

#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<IdentityService>,
    pub config: EnvironmentConfig,
    pub jwt: JwtConfig,
}

impl AppState {
    pub fn new(identity: Arc<IdentityService>, config: EnvironmentConfig) -> Self {
        let jwt = JwtConfig::from(&config);
        Self {
            identity,
            config,
            jwt,
        }
    }
}
