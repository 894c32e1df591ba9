use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::InvitationScope;
use crate::services::IssuedToken;

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    /// Sin email la invitación es universal
    pub email: Option<String>,
}

impl CreateInvitationRequest {
    pub fn scope(self) -> InvitationScope {
        match self.email {
            Some(email) if !email.trim().is_empty() => InvitationScope::Targeted { email },
            _ => InvitationScope::Universal,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedToken> for InvitationResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.value,
            expires_at: issued.expires_at,
        }
    }
}
