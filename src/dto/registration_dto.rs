use serde::Deserialize;

use crate::models::{AdminInput, CollaboratorInput, CompanyInput};

// Registro de empresa + administrador
#[derive(Debug, Deserialize)]
pub struct RegisterCompanyRequest {
    pub company: CompanyInput,
    pub admin: AdminInput,
}

// Registro de colaborador con invitación
#[derive(Debug, Deserialize)]
pub struct RegisterCollaboratorRequest {
    pub token: String,
    #[serde(flatten)]
    pub collaborator: CollaboratorInput,
}
