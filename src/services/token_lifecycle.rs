//! Motor genérico de tokens de un solo uso
//!
//! Un token es un valor opaco con expiración. La expiración es un predicado
//! (`now > expires_at`), nunca un borrado. Invitaciones y recuperación de
//! contraseña implementan `TokenLifecycle` sobre este motor.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;

use crate::config::IdentityConfig;
use crate::utils::clock::Clock;
use crate::utils::deadline::CallContext;
use crate::utils::errors::{IdentityError, IdentityResult, TokenErrorKind};

/// Token recién emitido
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

/// Prefijo corto para logs; nunca se loguea un token completo
pub fn token_prefix(token: &str) -> &str {
    token.get(..6).unwrap_or("")
}

/// Resultado de una validación, sin consumir el token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenVerdict {
    pub is_valid: bool,
    pub reason: Option<TokenErrorKind>,
    /// Email asociado (el del usuario, o el de una invitación dirigida)
    pub email: Option<String>,
}

impl TokenVerdict {
    pub fn valid(email: Option<String>) -> Self {
        Self {
            is_valid: true,
            reason: None,
            email,
        }
    }

    pub fn rejected(reason: TokenErrorKind) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason),
            email: None,
        }
    }

    pub fn into_result(self) -> IdentityResult<Option<String>> {
        match self.reason {
            None if self.is_valid => Ok(self.email),
            Some(reason) => Err(IdentityError::Token(reason)),
            None => Err(IdentityError::Token(TokenErrorKind::NotFound)),
        }
    }
}

/// Ventanas de validez configurables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenWindow {
    TargetedInvitation,
    UniversalInvitation,
    PasswordReset,
}

/// Estado mínimo de un token guardado
#[derive(Debug, Clone, Copy)]
pub struct TokenState {
    pub used: bool,
    pub expires_at: DateTime<Utc>,
}

/// Genera valores de token y calcula expiraciones con el reloj inyectado
pub struct TokenMint {
    token_bytes: usize,
    targeted_ttl: Duration,
    universal_ttl: Duration,
    reset_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenMint {
    pub fn new(config: &IdentityConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            token_bytes: config.token_bytes,
            targeted_ttl: config.targeted_invitation_ttl,
            universal_ttl: config.universal_invitation_ttl,
            reset_ttl: config.reset_token_ttl,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn ttl(&self, window: TokenWindow) -> Duration {
        match window {
            TokenWindow::TargetedInvitation => self.targeted_ttl,
            TokenWindow::UniversalInvitation => self.universal_ttl,
            TokenWindow::PasswordReset => self.reset_ttl,
        }
    }

    /// Valor opaco: bytes de `OsRng` en base64 url-safe
    pub fn generate(&self) -> String {
        let mut bytes = vec![0u8; self.token_bytes];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn mint(&self, window: TokenWindow) -> IssuedToken {
        IssuedToken {
            value: self.generate(),
            expires_at: self.now() + self.ttl(window),
        }
    }

    /// Reglas comunes de validez: existe, no usado, no expirado
    pub fn evaluate(&self, state: Option<TokenState>) -> Result<(), TokenErrorKind> {
        let Some(state) = state else {
            return Err(TokenErrorKind::NotFound);
        };
        if state.used {
            return Err(TokenErrorKind::AlreadyUsed);
        }
        if self.now() > state.expires_at {
            return Err(TokenErrorKind::Expired);
        }
        Ok(())
    }
}

/// Ciclo de vida de un token de un solo uso
#[async_trait]
pub trait TokenLifecycle: Send + Sync {
    /// A quién o qué se emite el token
    type Scope: Send + 'static;
    /// Lo que el consumidor presenta junto al token
    type Proof: Send + 'static;
    type Outcome: Send;

    async fn issue(&self, ctx: &CallContext, scope: Self::Scope) -> IdentityResult<IssuedToken>;

    async fn validate(&self, ctx: &CallContext, token: &str) -> IdentityResult<TokenVerdict>;

    async fn consume(&self, ctx: &CallContext, token: &str, proof: Self::Proof) -> IdentityResult<Self::Outcome>;
}
