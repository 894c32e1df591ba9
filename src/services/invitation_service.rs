//! Ciclo de vida de invitaciones
//!
//! Un admin activo emite invitaciones para su empresa. Consumir una invitación
//! es un update condicional en el store: de dos consumidores concurrentes
//! exactamente uno ve `Marked`, el otro `AlreadyUsed`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{InvitationClaim, InvitationMark, InvitationScope, NewInvitation, UserRole};
use crate::repositories::identity_store::{IdentityStore, StoreError};
use crate::services::connectivity::ConnectivityGate;
use crate::services::token_lifecycle::{
    token_prefix, IssuedToken, TokenLifecycle, TokenMint, TokenState, TokenVerdict, TokenWindow,
};
use crate::utils::deadline::CallContext;
use crate::utils::errors::{IdentityError, IdentityResult, TokenErrorKind, ValidationKind};
use crate::utils::validation::normalize_email;

/// Petición de emisión: alcance, empresa y admin que la firma
#[derive(Debug, Clone)]
pub struct InvitationRequest {
    pub scope: InvitationScope,
    pub company_id: Uuid,
    pub created_by: Uuid,
}

pub struct InvitationLifecycle {
    store: Arc<dyn IdentityStore>,
    gate: Arc<ConnectivityGate>,
    mint: Arc<TokenMint>,
}

impl InvitationLifecycle {
    pub fn new(store: Arc<dyn IdentityStore>, gate: Arc<ConnectivityGate>, mint: Arc<TokenMint>) -> Self {
        Self { store, gate, mint }
    }

    /// Relee al creador: solo un admin activo de la empresa puede invitar
    async fn authorize_creator(&self, ctx: &CallContext, request: &InvitationRequest) -> IdentityResult<()> {
        let creator = match self
            .gate
            .call(ctx, "get_user_by_id", self.store.get_user_by_id(request.created_by))
            .await
        {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                return Err(IdentityError::Permission(format!(
                    "creator {} does not exist",
                    request.created_by
                )))
            }
            Err(err) => return Err(err.into()),
        };

        if creator.role != UserRole::Admin
            || !creator.is_active
            || creator.company_id != Some(request.company_id)
        {
            warn!(
                "🚫 Usuario {} no puede invitar a la empresa {}",
                request.created_by, request.company_id
            );
            return Err(IdentityError::Permission(format!(
                "user {} is not an active admin of company {}",
                request.created_by, request.company_id
            )));
        }
        Ok(())
    }

    /// Consumir la invitación para registrar un colaborador con `email`
    pub async fn consume_for_registration(
        &self,
        ctx: &CallContext,
        token: &str,
        email: &str,
    ) -> IdentityResult<InvitationClaim> {
        self.consume(ctx, token, email.to_string()).await
    }

    /// Deshacer un consumo cuyo registro posterior falló
    pub async fn release(&self, ctx: &CallContext, token: &str) -> IdentityResult<()> {
        match self
            .gate
            .call(ctx, "release_invitation", self.store.release_invitation(token))
            .await
        {
            Ok(()) => {
                info!("↩️ Invitación {}… liberada", token_prefix(token));
                Ok(())
            }
            Err(err) => {
                error!(
                    "❌ No se pudo liberar la invitación {}…: {}",
                    token_prefix(token),
                    err
                );
                Err(IdentityError::Persistence(format!(
                    "invitation {}… stays consumed: {}",
                    token_prefix(token),
                    err
                )))
            }
        }
    }
}

#[async_trait]
impl TokenLifecycle for InvitationLifecycle {
    type Scope = InvitationRequest;
    type Proof = String;
    type Outcome = InvitationClaim;

    async fn issue(&self, ctx: &CallContext, request: InvitationRequest) -> IdentityResult<IssuedToken> {
        self.gate.ensure_reachable()?;

        let (email, window) = match request.scope.bound_email() {
            None => (None, TokenWindow::UniversalInvitation),
            Some(email) => {
                let email = normalize_email(email);
                if !validator::validate_email(email.as_str()) {
                    return Err(IdentityError::Validation(ValidationKind::MalformedEmail));
                }
                (Some(email), TokenWindow::TargetedInvitation)
            }
        };

        self.authorize_creator(ctx, &request).await?;

        let issued = self.mint.mint(window);
        let invitation = NewInvitation {
            token: issued.value.clone(),
            email,
            company_id: request.company_id,
            created_by: request.created_by,
            expires_at: issued.expires_at,
        };

        self.gate
            .call(ctx, "create_invitation", self.store.create_invitation(&invitation))
            .await?;

        info!(
            "✉️ Invitación {}… emitida para la empresa {} ({:?}, expira {})",
            token_prefix(&issued.value),
            request.company_id,
            window,
            issued.expires_at
        );
        Ok(issued)
    }

    async fn validate(&self, ctx: &CallContext, token: &str) -> IdentityResult<TokenVerdict> {
        self.gate.ensure_reachable()?;

        let snapshot = self
            .gate
            .call(ctx, "validate_invitation", self.store.validate_invitation(token))
            .await?;

        let state = snapshot.as_ref().map(|s| TokenState {
            used: s.used,
            expires_at: s.expires_at,
        });

        Ok(match self.mint.evaluate(state) {
            Ok(()) => TokenVerdict::valid(snapshot.and_then(|s| s.email)),
            Err(reason) => TokenVerdict::rejected(reason),
        })
    }

    /// El email se compara dentro del update condicional, no en una
    /// validación previa
    async fn consume(&self, ctx: &CallContext, token: &str, email: String) -> IdentityResult<InvitationClaim> {
        self.gate.ensure_reachable()?;

        let email = normalize_email(&email);
        let now = self.mint.now();

        let mark = self
            .gate
            .call(ctx, "mark_invitation_used", self.store.mark_invitation_used(token, &email, now))
            .await?;

        let reason = match mark {
            InvitationMark::Marked { company_id } => {
                info!("🎟️ Invitación {}… consumida por {}", token_prefix(token), email);
                return Ok(InvitationClaim {
                    company_id,
                    is_valid: true,
                });
            }
            InvitationMark::AlreadyUsed => TokenErrorKind::AlreadyUsed,
            InvitationMark::Expired => TokenErrorKind::Expired,
            InvitationMark::EmailMismatch => TokenErrorKind::EmailMismatch,
            InvitationMark::NotFound => TokenErrorKind::NotFound,
        };

        warn!("🎟️ Invitación {}… rechazada: {}", token_prefix(token), reason);
        Err(IdentityError::Token(reason))
    }
}
