//! Entrega de tokens de recuperación
//!
//! El envío real (email, webhook) es externo. El notificador por defecto solo
//! deja constancia en el log, con el prefijo del token.

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::services::token_lifecycle::{token_prefix, IssuedToken};
use crate::utils::errors::IdentityResult;

#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn deliver(&self, email: &str, token: &IssuedToken) -> IdentityResult<()>;
}

#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl ResetNotifier for TracingNotifier {
    async fn deliver(&self, email: &str, token: &IssuedToken) -> IdentityResult<()> {
        info!(
            "📧 Token de recuperación {}… listo para {} (expira {})",
            token_prefix(&token.value),
            email,
            token.expires_at
        );
        Ok(())
    }
}

/// Guarda los tokens entregados en memoria (desarrollo local y tests)
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<(String, IssuedToken)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_token_for(&self, email: &str) -> Option<IssuedToken> {
        self.delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, token)| token.clone())
    }
}

#[async_trait]
impl ResetNotifier for RecordingNotifier {
    async fn deliver(&self, email: &str, token: &IssuedToken) -> IdentityResult<()> {
        self.delivered
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((email.to_string(), token.clone()));
        Ok(())
    }
}
