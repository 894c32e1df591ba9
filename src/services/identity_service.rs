//! Fachada del núcleo de identidad
//!
//! Es la interfaz que consumen la UI y las rutas HTTP. Valida y normaliza los
//! inputs, aplica el gate de conectividad y delega en la saga, los ciclos de
//! vida de tokens y la autenticación. Cada operación devuelve un
//! `IdentityResult`: ningún error de transporte sale crudo.

use std::sync::Arc;

use tracing::info;
use validator::Validate;

use crate::config::IdentityConfig;
use crate::models::credentials::hash_password;
use crate::models::{AdminDraft, AdminInput, CollaboratorInput, CompanyInput, InvitationScope, Password, Session};
use crate::repositories::identity_store::IdentityStore;
use crate::services::auth_service::AuthService;
use crate::services::collaborator_enrollment::{CollaboratorEnrollment, EnrollmentOutcome};
use crate::services::connectivity::{ConnectivityGate, ConnectivityStatus};
use crate::services::identity_session::IdentitySession;
use crate::services::invitation_service::{InvitationLifecycle, InvitationRequest};
use crate::services::notifier::{ResetNotifier, TracingNotifier};
use crate::services::recovery_service::{CredentialRecoveryLifecycle, NewPassword};
use crate::services::registration_saga::{RegistrationOutcome, RegistrationSaga};
use crate::services::token_lifecycle::{IssuedToken, TokenLifecycle, TokenMint, TokenVerdict};
use crate::utils::clock::Clock;
use crate::utils::deadline::CallContext;
use crate::utils::errors::{IdentityError, IdentityResult};
use crate::utils::validation::{normalize_email, validation_kind};

pub struct IdentityService {
    config: IdentityConfig,
    gate: Arc<ConnectivityGate>,
    saga: RegistrationSaga,
    invitations: Arc<InvitationLifecycle>,
    recovery: CredentialRecoveryLifecycle,
    enrollment: CollaboratorEnrollment,
    auth: Arc<AuthService>,
    notifier: Arc<dyn ResetNotifier>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn IdentityStore>, config: IdentityConfig, clock: Arc<dyn Clock>) -> Self {
        let gate = Arc::new(ConnectivityGate::new(store.clone(), clock.clone(), config.request_timeout));
        let mint = Arc::new(TokenMint::new(&config, clock));

        let invitations = Arc::new(InvitationLifecycle::new(store.clone(), gate.clone(), mint.clone()));
        let recovery = CredentialRecoveryLifecycle::new(store.clone(), gate.clone(), mint, config.bcrypt_cost);
        let saga = RegistrationSaga::new(
            store.clone(),
            gate.clone(),
            config.fallback_policy,
            config.compensation_timeout,
        );
        let enrollment = CollaboratorEnrollment::new(
            store.clone(),
            gate.clone(),
            invitations.clone(),
            config.bcrypt_cost,
            config.compensation_timeout,
        );
        let auth = Arc::new(AuthService::new(store, gate.clone()));

        Self {
            config,
            gate,
            saga,
            invitations,
            recovery,
            enrollment,
            auth,
            notifier: Arc::new(TracingNotifier),
        }
    }

    /// Construir el servicio y evaluar la conectividad de arranque
    pub async fn bootstrap(store: Arc<dyn IdentityStore>, config: IdentityConfig, clock: Arc<dyn Clock>) -> Self {
        let service = Self::new(store, config, clock);
        service.check_connectivity().await;
        service
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ResetNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Contexto con el timeout por defecto de la configuración
    pub fn context(&self) -> CallContext {
        CallContext::with_timeout(self.config.request_timeout)
    }

    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }

    pub async fn check_connectivity(&self) -> bool {
        self.gate.check_connectivity().await
    }

    pub fn connectivity_status(&self) -> ConnectivityStatus {
        self.gate.status()
    }

    pub async fn register_company_and_admin(
        &self,
        ctx: &CallContext,
        company: CompanyInput,
        admin: AdminInput,
    ) -> IdentityResult<RegistrationOutcome> {
        let company = company.normalized();
        company
            .validate()
            .map_err(|e| IdentityError::Validation(validation_kind(&e)))?;

        let admin = admin.normalized();
        admin
            .validate()
            .map_err(|e| IdentityError::Validation(validation_kind(&e)))?;
        admin.check_password().map_err(IdentityError::Validation)?;

        self.gate.ensure_reachable()?;

        let draft = AdminDraft {
            password_hash: hash_password(&admin.password, self.config.bcrypt_cost).await?,
            name: admin.name,
            email: admin.email,
        };

        self.saga.register(ctx, company, draft).await
    }

    pub async fn register_collaborator_with_invitation(
        &self,
        ctx: &CallContext,
        token: &str,
        input: CollaboratorInput,
    ) -> IdentityResult<EnrollmentOutcome> {
        self.enrollment.enroll(ctx, token, input).await
    }

    pub async fn login(&self, ctx: &CallContext, email: &str, password: &Password) -> IdentityResult<Session> {
        self.auth.login(ctx, email, password).await
    }

    pub async fn refresh_session(&self, ctx: &CallContext, session: &Session) -> IdentityResult<Session> {
        self.auth.refresh(ctx, session).await
    }

    /// Sesión con estado para un cliente de este proceso
    pub fn session(&self) -> IdentitySession {
        IdentitySession::new(self.auth.clone())
    }

    /// Emite el token y lo entrega al notificador
    pub async fn request_password_reset(&self, ctx: &CallContext, email: &str) -> IdentityResult<IssuedToken> {
        let issued = self.recovery.issue(ctx, email.to_string()).await?;
        self.notifier.deliver(&normalize_email(email), &issued).await?;
        Ok(issued)
    }

    pub async fn validate_reset_token(&self, ctx: &CallContext, token: &str) -> IdentityResult<TokenVerdict> {
        self.recovery.validate(ctx, token).await
    }

    pub async fn reset_password(
        &self,
        ctx: &CallContext,
        token: &str,
        password: Password,
        confirmation: Password,
    ) -> IdentityResult<()> {
        self.recovery
            .consume(ctx, token, NewPassword { password, confirmation })
            .await
    }

    /// Emitir una invitación en nombre del admin de la sesión
    pub async fn create_invitation(
        &self,
        ctx: &CallContext,
        session: &Session,
        scope: InvitationScope,
    ) -> IdentityResult<IssuedToken> {
        let company_id = session.company_id.ok_or_else(|| {
            IdentityError::Permission(format!("user {} has no company", session.user_id))
        })?;

        let issued = self
            .invitations
            .issue(
                ctx,
                InvitationRequest {
                    scope,
                    company_id,
                    created_by: session.user_id,
                },
            )
            .await?;

        info!("✉️ {} invitó a la empresa {}", session.user_id, company_id);
        Ok(issued)
    }

    pub async fn validate_invitation(&self, ctx: &CallContext, token: &str) -> IdentityResult<TokenVerdict> {
        self.invitations.validate(ctx, token).await
    }

    /// Acceso directo al ciclo de vida de invitaciones
    pub fn invitations(&self) -> &InvitationLifecycle {
        &self.invitations
    }
}
