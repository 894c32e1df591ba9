//! Recuperación de credenciales
//!
//! El token de recuperación vive embebido en el usuario: emitir uno nuevo
//! sobrescribe el anterior, y el cambio de contraseña limpia el token en la
//! misma escritura que actualiza el hash.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::models::credentials::hash_password;
use crate::models::user::check_password_pair;
use crate::models::Password;
use crate::repositories::identity_store::IdentityStore;
use crate::services::connectivity::ConnectivityGate;
use crate::services::token_lifecycle::{
    token_prefix, IssuedToken, TokenLifecycle, TokenMint, TokenState, TokenVerdict, TokenWindow,
};
use crate::utils::deadline::CallContext;
use crate::utils::errors::{IdentityError, IdentityResult, TokenErrorKind};
use crate::utils::validation::normalize_email;

/// Nueva contraseña con su confirmación
#[derive(Debug, Clone)]
pub struct NewPassword {
    pub password: Password,
    pub confirmation: Password,
}

pub struct CredentialRecoveryLifecycle {
    store: Arc<dyn IdentityStore>,
    gate: Arc<ConnectivityGate>,
    mint: Arc<TokenMint>,
    bcrypt_cost: u32,
}

impl CredentialRecoveryLifecycle {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        gate: Arc<ConnectivityGate>,
        mint: Arc<TokenMint>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            store,
            gate,
            mint,
            bcrypt_cost,
        }
    }
}

#[async_trait]
impl TokenLifecycle for CredentialRecoveryLifecycle {
    type Scope = String;
    type Proof = NewPassword;
    type Outcome = ();

    async fn issue(&self, ctx: &CallContext, email: String) -> IdentityResult<IssuedToken> {
        self.gate.ensure_reachable()?;

        let email = normalize_email(&email);
        let issued = self.mint.mint(TokenWindow::PasswordReset);

        let stored = self
            .gate
            .call(
                ctx,
                "set_reset_token",
                self.store.set_reset_token(&email, &issued.value, issued.expires_at),
            )
            .await?;

        if !stored {
            warn!("🔑 Recuperación pedida para un email desconocido");
            return Err(IdentityError::Token(TokenErrorKind::NotFound));
        }

        info!(
            "🔑 Token de recuperación {}… emitido (expira {})",
            token_prefix(&issued.value),
            issued.expires_at
        );
        Ok(issued)
    }

    async fn validate(&self, ctx: &CallContext, token: &str) -> IdentityResult<TokenVerdict> {
        self.gate.ensure_reachable()?;

        let snapshot = self
            .gate
            .call(ctx, "validate_reset_token", self.store.validate_reset_token(token))
            .await?;

        let state = snapshot.as_ref().map(|s| TokenState {
            used: false,
            expires_at: s.expires_at,
        });

        Ok(match self.mint.evaluate(state) {
            Ok(()) => TokenVerdict::valid(snapshot.map(|s| s.email)),
            Err(reason) => TokenVerdict::rejected(reason),
        })
    }

    async fn consume(&self, ctx: &CallContext, token: &str, proof: NewPassword) -> IdentityResult<()> {
        check_password_pair(&proof.password, &proof.confirmation).map_err(IdentityError::Validation)?;

        let email = self
            .validate(ctx, token)
            .await?
            .into_result()?
            .ok_or(IdentityError::Token(TokenErrorKind::NotFound))?;

        let password_hash = hash_password(&proof.password, self.bcrypt_cost).await?;
        let now = self.mint.now();

        // Guardado en el store: solo si el token sigue vigente y es este
        let applied = self
            .gate
            .call(
                ctx,
                "apply_password_reset",
                self.store.apply_password_reset(&email, token, &password_hash, now),
            )
            .await?;

        if !applied {
            warn!("🔑 Token {}… reemplazado o consumido en paralelo", token_prefix(token));
            return Err(IdentityError::Token(TokenErrorKind::NotFound));
        }

        info!("🔑 Contraseña actualizada con el token {}…", token_prefix(token));
        Ok(())
    }
}
