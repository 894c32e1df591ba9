use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Password;

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

// El token nunca viaja en la respuesta, solo por el notificador
#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: Password,
    pub confirm_password: Password,
}
