//! Servicio de autenticación
//!
//! La verificación de credenciales se delega siempre al procedimiento remoto;
//! este servicio nunca compara contraseñas. Es stateless: el snapshot de
//! sesión se devuelve al llamador.

use std::sync::Arc;

use tracing::{info, warn};

use crate::models::{Password, Session};
use crate::repositories::identity_store::{IdentityStore, StoreError};
use crate::services::connectivity::ConnectivityGate;
use crate::utils::deadline::CallContext;
use crate::utils::errors::{AuthErrorKind, IdentityError, IdentityResult};
use crate::utils::validation::normalize_email;

pub struct AuthService {
    store: Arc<dyn IdentityStore>,
    gate: Arc<ConnectivityGate>,
}

impl AuthService {
    pub fn new(store: Arc<dyn IdentityStore>, gate: Arc<ConnectivityGate>) -> Self {
        Self { store, gate }
    }

    pub async fn login(&self, ctx: &CallContext, email: &str, password: &Password) -> IdentityResult<Session> {
        self.gate.ensure_reachable()?;

        let email = normalize_email(email);
        if email.is_empty() || password.char_count() == 0 {
            return Err(IdentityError::Auth(AuthErrorKind::InvalidCredentials));
        }

        let outcome = self
            .gate
            .call(ctx, "authenticate_user", self.store.authenticate(&email, password))
            .await?;

        let user_id = match outcome.user_id {
            Some(user_id) if outcome.authenticated => user_id,
            _ => {
                warn!("🔐 Login rechazado");
                return Err(IdentityError::Auth(AuthErrorKind::InvalidCredentials));
            }
        };

        let session = self.load_session(ctx, user_id).await?;
        info!("🔐 Login de {} ({})", session.user_id, session.role);
        Ok(session)
    }

    /// Releer al usuario de una sesión existente
    pub async fn refresh(&self, ctx: &CallContext, session: &Session) -> IdentityResult<Session> {
        self.gate.ensure_reachable()?;
        self.load_session(ctx, session.user_id).await
    }

    async fn load_session(&self, ctx: &CallContext, user_id: uuid::Uuid) -> IdentityResult<Session> {
        let user = match self
            .gate
            .call(ctx, "get_user_by_id", self.store.get_user_by_id(user_id))
            .await
        {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                return Err(IdentityError::Auth(AuthErrorKind::InvalidCredentials))
            }
            Err(err) => return Err(err.into()),
        };

        if !user.is_active {
            warn!("🔐 Usuario {} inactivo", user.id);
            return Err(IdentityError::Auth(AuthErrorKind::Inactive));
        }

        Ok(Session::from(&user))
    }
}
