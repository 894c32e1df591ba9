//! Modelo de Invitation
//!
//! Invitaciones de un solo uso para que colaboradores se registren en una
//! empresa. Una invitación universal la puede usar cualquier email; una
//! dirigida solo el email al que se emitió.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Alcance de una invitación
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InvitationScope {
    Universal,
    Targeted { email: String },
}

impl InvitationScope {
    pub fn bound_email(&self) -> Option<&str> {
        match self {
            InvitationScope::Universal => None,
            InvitationScope::Targeted { email } => Some(email),
        }
    }
}

/// Invitation - mapea a la tabla invitations
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invitation {
    pub id: Uuid,
    pub token: String,
    pub email: Option<String>,
    pub company_id: Uuid,
    pub created_by: Uuid,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Fila a insertar en `invitations`
#[derive(Debug, Clone, Serialize)]
pub struct NewInvitation {
    pub token: String,
    pub email: Option<String>,
    pub company_id: Uuid,
    pub created_by: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Estado de una invitación según el store, sin juicio de validez
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct InvitationSnapshot {
    pub email: Option<String>,
    pub company_id: Uuid,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
}

/// Resultado del update condicional `used = true`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationMark {
    Marked { company_id: Uuid },
    AlreadyUsed,
    Expired,
    EmailMismatch,
    NotFound,
}

impl InvitationMark {
    /// Explica por qué el update condicional no tocó ninguna fila, a partir
    /// de una relectura de la invitación.
    pub fn diagnose(snapshot: Option<&InvitationSnapshot>, email: &str, now: DateTime<Utc>) -> Self {
        let Some(snapshot) = snapshot else {
            return InvitationMark::NotFound;
        };

        if snapshot.used {
            return InvitationMark::AlreadyUsed;
        }
        if now > snapshot.expires_at {
            return InvitationMark::Expired;
        }
        match &snapshot.email {
            Some(bound) if !bound.eq_ignore_ascii_case(email) => InvitationMark::EmailMismatch,
            // Perdimos la carrera entre el update y la relectura
            _ => InvitationMark::AlreadyUsed,
        }
    }
}

/// Lo que obtiene un registro de colaborador al consumir su invitación
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationClaim {
    pub company_id: Uuid,
    pub is_valid: bool,
}
