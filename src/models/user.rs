//! Modelo de User
//!
//! Usuarios de una empresa: un admin creado junto con la empresa y los
//! colaboradores que entran por invitación.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::credentials::{Password, PasswordHash};
use crate::utils::errors::ValidationKind;
use crate::utils::validation::{normalize_email, validate_not_empty, MIN_PASSWORD_CHARS};

/// Roles del sistema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Collaborator,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Collaborator => "collaborator",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "collaborator" => Ok(UserRole::Collaborator),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User tal como lo devuelve el store (sin hash ni token de recuperación)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub company_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Datos personales de una cuenta (admin en el registro de empresa,
/// colaborador en el registro por invitación)
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AccountInput {
    #[validate(custom = "validate_not_empty")]
    pub name: String,

    #[validate(email)]
    pub email: String,

    pub password: Password,

    #[serde(alias = "confirmPassword")]
    pub confirm_password: Password,
}

pub type AdminInput = AccountInput;
pub type CollaboratorInput = AccountInput;

impl AccountInput {
    pub fn normalized(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.email = normalize_email(&self.email);
        self
    }

    /// Reglas de contraseña que `Validate` no cubre sobre el newtype
    pub fn check_password(&self) -> Result<(), ValidationKind> {
        check_password_pair(&self.password, &self.confirm_password)
    }
}

pub fn check_password_pair(password: &Password, confirmation: &Password) -> Result<(), ValidationKind> {
    if password.char_count() < MIN_PASSWORD_CHARS {
        return Err(ValidationKind::PasswordTooShort);
    }
    if password != confirmation {
        return Err(ValidationKind::PasswordMismatch);
    }
    Ok(())
}

/// Admin ya validado y con la contraseña hasheada, listo para el saga
#[derive(Debug, Clone)]
pub struct AdminDraft {
    pub name: String,
    pub email: String,
    pub password_hash: PasswordHash,
}

/// Fila a insertar en `users`
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: PasswordHash,
    pub role: UserRole,
    pub company_id: Uuid,
    pub is_active: bool,
}

impl NewUser {
    pub fn admin(draft: &AdminDraft, company_id: Uuid) -> Self {
        Self {
            name: draft.name.clone(),
            email: draft.email.clone(),
            password_hash: draft.password_hash.clone(),
            role: UserRole::Admin,
            company_id,
            is_active: true,
        }
    }

    pub fn collaborator(name: String, email: String, password_hash: PasswordHash, company_id: Uuid) -> Self {
        Self {
            name,
            email,
            password_hash,
            role: UserRole::Collaborator,
            company_id,
            is_active: true,
        }
    }
}

/// Resultado del procedimiento remoto de autenticación
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub user_id: Option<Uuid>,
    #[serde(alias = "is_authenticated")]
    pub authenticated: bool,
}

/// Token de recuperación embebido en el usuario, visto desde la validación
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetTokenSnapshot {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}
