use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Password, Session};

// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: Password,
}

// Login response: snapshot de sesión + JWT firmado
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub session: Session,
}
