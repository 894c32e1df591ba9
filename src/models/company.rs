//! Modelo de Company
//!
//! Este módulo contiene el struct Company y el input de registro.
//! Mapea a la tabla `companies` del servicio de datos (el identificador fiscal
//! se guarda en la columna `cnpj`).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::utils::validation::{
    normalize_digits, normalize_email, validate_cep, validate_cnpj, validate_not_empty,
    validate_state,
};

/// Company principal - mapea a la tabla companies
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub id: Uuid,
    pub trade_name: String,
    pub email: String,
    pub phone: String,
    #[sqlx(rename = "cnpj")]
    pub tax_id: String,
    pub address: String,
    pub neighborhood: String,
    pub zip_code: String,
    pub city: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Datos de la empresa recogidos en el formulario de registro
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CompanyInput {
    #[validate(custom = "validate_not_empty")]
    pub trade_name: String,

    #[validate(email)]
    pub email: String,

    #[validate(custom = "validate_not_empty")]
    pub phone: String,

    #[serde(alias = "cnpj")]
    #[validate(custom = "validate_cnpj")]
    pub tax_id: String,

    #[validate(custom = "validate_not_empty")]
    pub address: String,

    #[validate(custom = "validate_not_empty")]
    pub neighborhood: String,

    #[validate(custom = "validate_cep")]
    pub zip_code: String,

    #[validate(custom = "validate_not_empty")]
    pub city: String,

    #[validate(custom = "validate_state")]
    pub state: String,
}

impl CompanyInput {
    /// Forma canónica enviada al store: CNPJ y CEP solo dígitos, email en minúsculas
    pub fn normalized(mut self) -> Self {
        self.trade_name = self.trade_name.trim().to_string();
        self.email = normalize_email(&self.email);
        self.phone = self.phone.trim().to_string();
        self.tax_id = normalize_digits(&self.tax_id);
        self.address = self.address.trim().to_string();
        self.neighborhood = self.neighborhood.trim().to_string();
        self.zip_code = normalize_digits(&self.zip_code);
        self.city = self.city.trim().to_string();
        self.state = self.state.trim().to_uppercase();
        self
    }
}

/// Identificadores creados por un registro completo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ProvisionedTenant {
    pub company_id: Uuid,
    #[serde(alias = "user_id")]
    #[sqlx(rename = "user_id")]
    pub admin_id: Uuid,
}
