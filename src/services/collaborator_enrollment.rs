//! Registro de colaboradores por invitación
//!
//! Consume la invitación y crea el usuario colaborador en la empresa que la
//! emitió. Si el insert falla, la invitación se libera para que pueda
//! reintentarse. Un insert sin respuesta se relee antes de liberar nada.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::models::credentials::hash_password;
use crate::models::{CollaboratorInput, NewUser};
use crate::repositories::identity_store::{IdentityStore, StoreError};
use crate::services::connectivity::ConnectivityGate;
use crate::services::invitation_service::InvitationLifecycle;
use crate::services::token_lifecycle::token_prefix;
use crate::utils::deadline::CallContext;
use crate::utils::errors::{IdentityError, IdentityResult, ValidationKind};
use crate::utils::validation::validation_kind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EnrollmentOutcome {
    pub user_id: Uuid,
    pub company_id: Uuid,
}

pub struct CollaboratorEnrollment {
    store: Arc<dyn IdentityStore>,
    gate: Arc<ConnectivityGate>,
    invitations: Arc<InvitationLifecycle>,
    bcrypt_cost: u32,
    compensation_timeout: Duration,
}

impl CollaboratorEnrollment {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        gate: Arc<ConnectivityGate>,
        invitations: Arc<InvitationLifecycle>,
        bcrypt_cost: u32,
        compensation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gate,
            invitations,
            bcrypt_cost,
            compensation_timeout,
        }
    }

    pub async fn enroll(
        &self,
        ctx: &CallContext,
        token: &str,
        input: CollaboratorInput,
    ) -> IdentityResult<EnrollmentOutcome> {
        let input = input.normalized();
        input
            .validate()
            .map_err(|e| IdentityError::Validation(validation_kind(&e)))?;
        input.check_password().map_err(IdentityError::Validation)?;

        self.gate.ensure_reachable()?;

        let taken = self
            .gate
            .call(ctx, "exists_by_user_email", self.store.exists_by_user_email(&input.email))
            .await?;
        if taken {
            return Err(IdentityError::Validation(ValidationKind::DuplicateUserEmail));
        }

        // Hashear antes de consumir: un fallo aquí no debe gastar la invitación
        let password_hash = hash_password(&input.password, self.bcrypt_cost).await?;

        let claim = self
            .invitations
            .consume_for_registration(ctx, token, &input.email)
            .await?;

        let user = NewUser::collaborator(input.name, input.email, password_hash, claim.company_id);
        let store = self.store.clone();
        let gate = self.gate.clone();
        let invitations = self.invitations.clone();
        let compensation_timeout = self.compensation_timeout;
        let token = token.to_string();
        let ctx = *ctx;

        // Con la invitación ya consumida, el resto corre en su propia tarea
        let commit = tokio::spawn(async move {
            let cause = match gate.call(&ctx, "insert_user", store.insert_user(&user)).await {
                Ok(user_id) => {
                    info!(
                        "👤 Colaborador {} registrado en la empresa {}",
                        user_id, user.company_id
                    );
                    return Ok(EnrollmentOutcome {
                        user_id,
                        company_id: user.company_id,
                    });
                }
                Err(err) if err.is_indeterminate() => {
                    // El insert pudo haberse aplicado: releer antes de liberar
                    let check_ctx = CallContext::with_timeout(compensation_timeout);
                    match gate
                        .call(&check_ctx, "find_user_by_email", store.find_user_by_email(&user.email))
                        .await
                    {
                        Ok(Some(found)) if found.company_id == Some(user.company_id) => {
                            info!(
                                "👤 Colaborador {} confirmado en la empresa {} tras {}",
                                found.id, user.company_id, err
                            );
                            return Ok(EnrollmentOutcome {
                                user_id: found.id,
                                company_id: user.company_id,
                            });
                        }
                        Ok(Some(_)) => IdentityError::Validation(ValidationKind::DuplicateUserEmail),
                        Ok(None) => err.into(),
                        Err(check_err) => {
                            error!(
                                "🚨 Resultado desconocido con la invitación {}…, queda consumida: {}",
                                token_prefix(&token),
                                check_err
                            );
                            return Err(IdentityError::Persistence(format!(
                                "enrollment with invitation {}… has an unknown outcome: {}",
                                token_prefix(&token),
                                check_err
                            )));
                        }
                    }
                }
                Err(StoreError::Duplicate(_)) => IdentityError::Validation(ValidationKind::DuplicateUserEmail),
                Err(other) => other.into(),
            };

            warn!(
                "↩️ Insert del colaborador falló con la invitación {}…: {}. Liberando",
                token_prefix(&token),
                cause
            );

            let release_ctx = CallContext::with_timeout(compensation_timeout);
            match invitations.release(&release_ctx, &token).await {
                Ok(()) => Err(cause),
                Err(release_err) => {
                    error!(
                        "🚨 Invitación {}… consumida sin usuario creado: {}",
                        token_prefix(&token),
                        release_err
                    );
                    Err(release_err)
                }
            }
        });

        commit
            .await
            .map_err(|e| IdentityError::Persistence(format!("enrollment task failed: {}", e)))?
    }
}
