//! Utilidades JWT
//!
//! La sesión vive en el cliente: el snapshot del usuario se firma en un JWT
//! HS256 y el servidor no guarda estado.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::environment::EnvironmentConfig,
    models::{Session, UserRole},
    utils::errors::{AuthErrorKind, IdentityError},
};

#[derive(Error, Debug)]
pub enum SessionTokenError {
    #[error("Error generating session token: {0}")]
    Encode(String),
    #[error("Invalid session token: {0}")]
    Invalid(String),
    #[error("Authorization header must start with 'Bearer '")]
    MissingBearer,
}

impl From<SessionTokenError> for IdentityError {
    fn from(err: SessionTokenError) -> Self {
        match err {
            SessionTokenError::Encode(msg) => IdentityError::Persistence(msg),
            SessionTokenError::Invalid(_) | SessionTokenError::MissingBearer => {
                IdentityError::Auth(AuthErrorKind::InvalidCredentials)
            }
        }
    }
}

/// Claims del JWT de sesión
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // user_id
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub company_id: Option<String>,
    pub is_active: bool,
    pub exp: usize,
    pub iat: usize,
}

impl SessionClaims {
    pub fn into_session(self) -> Result<Session, SessionTokenError> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|e| SessionTokenError::Invalid(format!("bad subject: {}", e)))?;
        let company_id = self
            .company_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| SessionTokenError::Invalid(format!("bad company id: {}", e)))?;

        Ok(Session {
            user_id,
            name: self.name,
            email: self.email,
            role: self.role,
            company_id,
            is_active: self.is_active,
        })
    }
}

/// Configuración de JWT
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration: u64,
}

impl From<&EnvironmentConfig> for JwtConfig {
    fn from(config: &EnvironmentConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            expiration: config.jwt_expiration,
        }
    }
}

/// Firmar el snapshot de sesión
pub fn generate_session_token(session: &Session, config: &JwtConfig) -> Result<String, SessionTokenError> {
    let now = chrono::Utc::now();
    let expires_at = now + chrono::Duration::seconds(config.expiration as i64);

    let claims = SessionClaims {
        sub: session.user_id.to_string(),
        name: session.name.clone(),
        email: session.email.clone(),
        role: session.role,
        company_id: session.company_id.map(|id| id.to_string()),
        is_active: session.is_active,
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    let encoding_key = EncodingKey::from_secret(config.secret.as_ref());

    encode(&Header::default(), &claims, &encoding_key)
        .map_err(|e| SessionTokenError::Encode(e.to_string()))
}

/// Verificar y decodificar el JWT de sesión
pub fn verify_session_token(token: &str, config: &JwtConfig) -> Result<Session, SessionTokenError> {
    let decoding_key = DecodingKey::from_secret(config.secret.as_ref());

    let token_data = decode::<SessionClaims>(token, &decoding_key, &Validation::default())
        .map_err(|e| SessionTokenError::Invalid(e.to_string()))?;

    token_data.claims.into_session()
}

/// Extraer token del header Authorization
pub fn extract_token_from_header(auth_header: &str) -> Result<&str, SessionTokenError> {
    match auth_header.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(SessionTokenError::MissingBearer),
    }
}
