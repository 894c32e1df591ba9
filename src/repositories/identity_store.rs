//! Contrato del store de identidad
//!
//! Interfaz fina sobre los registros remotos de empresas, usuarios,
//! invitaciones y tokens de recuperación. El store es la única fuente de verdad
//! para conflictos: las unicidades y los updates condicionales viven allí.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AdminDraft, AuthOutcome, CompanyInput, Invitation, InvitationMark, InvitationSnapshot,
    NewInvitation, NewUser, Password, PasswordHash, ProvisionedTenant, ResetTokenSnapshot, User,
};

pub const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";
pub const SQLSTATE_INSUFFICIENT_PRIVILEGE: &str = "42501";
pub const SQLSTATE_RAISE_EXCEPTION: &str = "P0001";

/// Campo cuya unicidad violó una escritura
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    TaxId,
    CompanyEmail,
    UserEmail,
}

impl UniqueField {
    /// Deducir el campo a partir del nombre de la constraint o del mensaje
    pub fn from_hint(hint: &str) -> Self {
        let hint = hint.to_lowercase();
        if hint.contains("cnpj") || hint.contains("tax") {
            UniqueField::TaxId
        } else if hint.contains("compan") {
            UniqueField::CompanyEmail
        } else {
            UniqueField::UserEmail
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidField {
    TaxId,
    PostalCode,
    Other(String),
}

/// Clasificación cruda de un fallo del store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate value for {0:?}")]
    Duplicate(UniqueField),

    #[error("invalid value for {0:?}")]
    Invalid(InvalidField),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("record not found")]
    NotFound,

    #[error("data service unavailable: {0}")]
    Unavailable(String),

    /// Venció el deadline del llamador. No dice nada del estado del servicio.
    #[error("deadline elapsed: {0}")]
    DeadlineElapsed(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// La escritura pudo haberse aplicado aunque el llamador no vio la respuesta
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::DeadlineElapsed(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Clasificar un error de Postgres (o de PostgREST, que expone los mismos
/// campos) por SQLSTATE, nombre de constraint y mensaje.
pub fn classify_database_error(code: Option<&str>, constraint: Option<&str>, message: &str) -> StoreError {
    match code {
        Some(SQLSTATE_UNIQUE_VIOLATION) => {
            let hint = constraint.unwrap_or(message);
            StoreError::Duplicate(UniqueField::from_hint(hint))
        }
        Some(SQLSTATE_INSUFFICIENT_PRIVILEGE) => StoreError::PermissionDenied(message.to_string()),
        Some(SQLSTATE_RAISE_EXCEPTION) => classify_procedure_message(message)
            .unwrap_or_else(|| StoreError::Backend(message.to_string())),
        _ => classify_procedure_message(message).unwrap_or_else(|| StoreError::Backend(message.to_string())),
    }
}

/// Excepciones levantadas por los procedimientos de registro
fn classify_procedure_message(message: &str) -> Option<StoreError> {
    if message.contains("CNPJ já cadastrado") {
        Some(StoreError::Duplicate(UniqueField::TaxId))
    } else if message.contains("Email da empresa") {
        Some(StoreError::Duplicate(UniqueField::CompanyEmail))
    } else if message.contains("Email já cadastrado") || message.contains("Email do usuário") {
        Some(StoreError::Duplicate(UniqueField::UserEmail))
    } else if message.contains("CNPJ inválido") {
        Some(StoreError::Invalid(InvalidField::TaxId))
    } else if message.contains("CEP inválido") {
        Some(StoreError::Invalid(InvalidField::PostalCode))
    } else {
        None
    }
}

/// Store de identidad consumido por los servicios
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Sonda barata de alcanzabilidad
    async fn ping(&self) -> StoreResult<()>;

    /// Crear empresa y admin en una sola unidad del lado del servidor
    async fn run_atomic_company_admin_procedure(
        &self,
        company: &CompanyInput,
        admin: &AdminDraft,
    ) -> StoreResult<ProvisionedTenant>;

    async fn exists_by_tax_id(&self, tax_id: &str) -> StoreResult<bool>;

    async fn exists_by_company_email(&self, email: &str) -> StoreResult<bool>;

    async fn exists_by_user_email(&self, email: &str) -> StoreResult<bool>;

    async fn insert_company(&self, company: &CompanyInput) -> StoreResult<Uuid>;

    /// `NotFound` si la empresa ya no existe
    async fn delete_company(&self, company_id: Uuid) -> StoreResult<()>;

    async fn insert_user(&self, user: &NewUser) -> StoreResult<Uuid>;

    /// Verificación de credenciales en el servidor. Es la única llamada que
    /// recibe la contraseña en claro.
    async fn authenticate(&self, email: &str, password: &Password) -> StoreResult<AuthOutcome>;

    async fn get_user_by_id(&self, user_id: Uuid) -> StoreResult<User>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn create_invitation(&self, invitation: &NewInvitation) -> StoreResult<Invitation>;

    async fn validate_invitation(&self, token: &str) -> StoreResult<Option<InvitationSnapshot>>;

    /// Update condicional `used = true`. Las guardas de uso, expiración y
    /// email se evalúan en la misma escritura.
    async fn mark_invitation_used(
        &self,
        token: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<InvitationMark>;

    /// Deshacer un consumo (`used = false`, solo si estaba en `true`)
    async fn release_invitation(&self, token: &str) -> StoreResult<()>;

    /// Sobrescribe el token del usuario. `false` si el email no existe.
    async fn set_reset_token(&self, email: &str, token: &str, expires_at: DateTime<Utc>) -> StoreResult<bool>;

    async fn validate_reset_token(&self, token: &str) -> StoreResult<Option<ResetTokenSnapshot>>;

    /// Cambia el hash y limpia el token en la misma escritura, solo si el
    /// token presentado sigue siendo el vigente. `false` si no tocó filas.
    async fn apply_password_reset(
        &self,
        email: &str,
        token: &str,
        password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;
}
