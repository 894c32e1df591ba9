use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::models::{Password, Session, UserRole};
use crate::services::auth_service::AuthService;
use crate::utils::deadline::CallContext;
use crate::utils::errors::{AuthErrorKind, IdentityError, IdentityResult};

/// Sesión del lado del cliente sobre el `AuthService` stateless.
/// Logout no llama al servidor; un usuario desactivado pierde la sesión en
/// el siguiente `refresh`.
pub struct IdentitySession {
    auth: Arc<AuthService>,
    current: RwLock<Option<Session>>,
}

impl IdentitySession {
    pub fn new(auth: Arc<AuthService>) -> Self {
        Self {
            auth,
            current: RwLock::new(None),
        }
    }

    pub async fn login(&self, ctx: &CallContext, email: &str, password: &Password) -> IdentityResult<Session> {
        let session = self.auth.login(ctx, email, password).await?;
        *self.current.write().await = Some(session.clone());
        Ok(session)
    }

    pub async fn logout(&self) {
        if let Some(session) = self.current.write().await.take() {
            info!("👋 Logout de {}", session.user_id);
        }
    }

    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    /// Releer al usuario. Si ya no puede autenticarse, la sesión se descarta.
    pub async fn refresh(&self, ctx: &CallContext) -> IdentityResult<Option<Session>> {
        let Some(held) = self.current().await else {
            return Ok(None);
        };

        match self.auth.refresh(ctx, &held).await {
            Ok(session) => {
                *self.current.write().await = Some(session.clone());
                Ok(Some(session))
            }
            Err(err @ IdentityError::Auth(_)) => {
                self.current.write().await.take();
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn require_role(&self, role: UserRole) -> IdentityResult<Session> {
        let session = self
            .current()
            .await
            .ok_or(IdentityError::Auth(AuthErrorKind::InvalidCredentials))?;

        if session.role != role {
            return Err(IdentityError::Permission(format!(
                "role {} required, session has {}",
                role, session.role
            )));
        }
        Ok(session)
    }
}
