//! Sistema de manejo de errores
//!
//! Este módulo define la taxonomía de errores que devuelve cada operación
//! pública y su conversión a respuestas HTTP. Ningún error de transporte sale
//! crudo: todo se clasifica aquí antes de llegar a la UI.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::repositories::identity_store::{InvalidField, StoreError, UniqueField};

/// Errores de validación corregibles por el usuario
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationKind {
    #[error("tax identifier already registered")]
    DuplicateTaxId,
    #[error("company email already registered")]
    DuplicateCompanyEmail,
    #[error("user email already registered")]
    DuplicateUserEmail,
    #[error("malformed tax identifier")]
    MalformedTaxId,
    #[error("malformed postal code")]
    MalformedPostalCode,
    #[error("malformed email")]
    MalformedEmail,
    #[error("malformed field '{0}'")]
    MalformedField(String),
    #[error("password too short")]
    PasswordTooShort,
    #[error("password confirmation does not match")]
    PasswordMismatch,
}

impl ValidationKind {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationKind::DuplicateTaxId => "VALIDATION_DUPLICATE_TAX_ID",
            ValidationKind::DuplicateCompanyEmail => "VALIDATION_DUPLICATE_COMPANY_EMAIL",
            ValidationKind::DuplicateUserEmail => "VALIDATION_DUPLICATE_USER_EMAIL",
            ValidationKind::MalformedTaxId => "VALIDATION_MALFORMED_TAX_ID",
            ValidationKind::MalformedPostalCode => "VALIDATION_MALFORMED_POSTAL_CODE",
            ValidationKind::MalformedEmail => "VALIDATION_MALFORMED_EMAIL",
            ValidationKind::MalformedField(_) => "VALIDATION_MALFORMED_FIELD",
            ValidationKind::PasswordTooShort => "VALIDATION_PASSWORD_TOO_SHORT",
            ValidationKind::PasswordMismatch => "VALIDATION_PASSWORD_MISMATCH",
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            ValidationKind::DuplicateTaxId
                | ValidationKind::DuplicateCompanyEmail
                | ValidationKind::DuplicateUserEmail
        )
    }
}

impl From<UniqueField> for ValidationKind {
    fn from(field: UniqueField) -> Self {
        match field {
            UniqueField::TaxId => ValidationKind::DuplicateTaxId,
            UniqueField::CompanyEmail => ValidationKind::DuplicateCompanyEmail,
            UniqueField::UserEmail => ValidationKind::DuplicateUserEmail,
        }
    }
}

impl From<InvalidField> for ValidationKind {
    fn from(field: InvalidField) -> Self {
        match field {
            InvalidField::TaxId => ValidationKind::MalformedTaxId,
            InvalidField::PostalCode => ValidationKind::MalformedPostalCode,
            InvalidField::Other(name) => ValidationKind::MalformedField(name),
        }
    }
}

/// Motivos de rechazo de un token de un solo uso
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorKind {
    #[error("token expired")]
    Expired,
    #[error("token already used")]
    AlreadyUsed,
    #[error("token not found")]
    NotFound,
    #[error("email does not match the invitation")]
    EmailMismatch,
}

impl TokenErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            TokenErrorKind::Expired => "TOKEN_EXPIRED",
            TokenErrorKind::AlreadyUsed => "TOKEN_ALREADY_USED",
            TokenErrorKind::NotFound => "TOKEN_NOT_FOUND",
            TokenErrorKind::EmailMismatch => "TOKEN_EMAIL_MISMATCH",
        }
    }
}

/// Fallos de autenticación. Nunca dice si falló el email o la contraseña.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user is inactive")]
    Inactive,
}

impl AuthErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            AuthErrorKind::InvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            AuthErrorKind::Inactive => "AUTH_INACTIVE",
        }
    }
}

/// Errores que devuelve cada operación pública del núcleo de identidad
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Data service unreachable: {0}")]
    Connectivity(String),

    #[error("Validation error: {0}")]
    Validation(ValidationKind),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Token error: {0}")]
    Token(TokenErrorKind),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Authentication error: {0}")]
    Auth(AuthErrorKind),
}

impl IdentityError {
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::Connectivity(_) => "CONNECTIVITY_ERROR",
            IdentityError::Validation(kind) => kind.code(),
            IdentityError::Permission(_) => "PERMISSION_DENIED",
            IdentityError::Token(kind) => kind.code(),
            IdentityError::Persistence(_) => "PERSISTENCE_ERROR",
            IdentityError::Auth(kind) => kind.code(),
        }
    }
}

/// Clasificación por defecto de un fallo del store. Los flujos que necesitan
/// otra lectura (el saga, el consumo de tokens) hacen su propio `match`.
impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(field) => IdentityError::Validation(field.into()),
            StoreError::Invalid(field) => IdentityError::Validation(field.into()),
            StoreError::PermissionDenied(msg) => IdentityError::Permission(msg),
            StoreError::Unavailable(msg) => IdentityError::Connectivity(msg),
            StoreError::DeadlineElapsed(msg) => IdentityError::Connectivity(msg),
            StoreError::NotFound => IdentityError::Persistence("record not found".to_string()),
            StoreError::Backend(msg) => IdentityError::Persistence(msg),
        }
    }
}

/// Respuesta de error para la API
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    code: String,
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let status = match &self {
            IdentityError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            IdentityError::Validation(kind) if kind.is_duplicate() => StatusCode::CONFLICT,
            IdentityError::Validation(_) => StatusCode::BAD_REQUEST,
            IdentityError::Permission(_) => StatusCode::FORBIDDEN,
            IdentityError::Token(TokenErrorKind::NotFound) => StatusCode::NOT_FOUND,
            IdentityError::Token(TokenErrorKind::Expired) => StatusCode::GONE,
            IdentityError::Token(_) => StatusCode::CONFLICT,
            IdentityError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IdentityError::Auth(AuthErrorKind::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            IdentityError::Auth(AuthErrorKind::Inactive) => StatusCode::FORBIDDEN,
        };

        let (error, message) = match &self {
            IdentityError::Connectivity(msg) => {
                warn!("Data service unreachable: {}", msg);
                ("Service Unavailable", "The data service is unreachable".to_string())
            }
            IdentityError::Validation(kind) => ("Validation Error", kind.to_string()),
            IdentityError::Permission(msg) => {
                warn!("Permission denied: {}", msg);
                ("Forbidden", "Operation not permitted".to_string())
            }
            IdentityError::Token(kind) => ("Token Error", kind.to_string()),
            IdentityError::Persistence(msg) => {
                error!("Persistence error: {}", msg);
                ("Internal Server Error", "An unexpected error occurred".to_string())
            }
            IdentityError::Auth(kind) => ("Unauthorized", kind.to_string()),
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
            code: self.code().to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Resultado tipado para operaciones del núcleo
pub type IdentityResult<T> = Result<T, IdentityError>;
