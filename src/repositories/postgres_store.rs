use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{
    AdminDraft, AuthOutcome, CompanyInput, Invitation, InvitationMark, InvitationSnapshot,
    NewInvitation, NewUser, Password, PasswordHash, ProvisionedTenant, ResetTokenSnapshot, User,
    UserRole,
};
use crate::repositories::identity_store::{
    classify_database_error, IdentityStore, StoreError, StoreResult,
};

/// Traducir un error de sqlx a la clasificación del store
fn map_sqlx_error(context: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) => {
            let code = db.code();
            classify_database_error(code.as_deref(), db.constraint(), db.message())
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("{}: {}", context, err))
        }
        other => StoreError::Backend(format!("{}: {}", context, other)),
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    company_id: Option<Uuid>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<UserRole>()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role,
            company_id: row.company_id,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Error pinging database", e))?;

        Ok(())
    }

    async fn run_atomic_company_admin_procedure(
        &self,
        company: &CompanyInput,
        admin: &AdminDraft,
    ) -> StoreResult<ProvisionedTenant> {
        let result = sqlx::query_as::<_, ProvisionedTenant>(
            r#"
            SELECT company_id, user_id
            FROM register_company_and_admin(
                p_trade_name => $1, p_company_email => $2, p_phone => $3, p_cnpj => $4,
                p_address => $5, p_neighborhood => $6, p_zip_code => $7, p_city => $8,
                p_state => $9, p_admin_name => $10, p_admin_email => $11,
                p_admin_password_hash => $12
            )
            "#,
        )
        .bind(&company.trade_name)
        .bind(&company.email)
        .bind(&company.phone)
        .bind(&company.tax_id)
        .bind(&company.address)
        .bind(&company.neighborhood)
        .bind(&company.zip_code)
        .bind(&company.city)
        .bind(&company.state)
        .bind(&admin.name)
        .bind(&admin.email)
        .bind(admin.password_hash.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error running register_company_and_admin", e))?;

        Ok(result)
    }

    async fn exists_by_tax_id(&self, tax_id: &str) -> StoreResult<bool> {
        let result: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM companies WHERE cnpj = $1)")
            .bind(tax_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Error checking cnpj", e))?;

        Ok(result.0)
    }

    async fn exists_by_company_email(&self, email: &str) -> StoreResult<bool> {
        let result: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM companies WHERE lower(email) = lower($1))")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("Error checking company email", e))?;

        Ok(result.0)
    }

    async fn exists_by_user_email(&self, email: &str) -> StoreResult<bool> {
        let result: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = lower($1))")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("Error checking user email", e))?;

        Ok(result.0)
    }

    async fn insert_company(&self, company: &CompanyInput) -> StoreResult<Uuid> {
        let result: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO companies (
                trade_name, email, phone, cnpj, address, neighborhood, zip_code, city, state
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(&company.trade_name)
        .bind(&company.email)
        .bind(&company.phone)
        .bind(&company.tax_id)
        .bind(&company.address)
        .bind(&company.neighborhood)
        .bind(&company.zip_code)
        .bind(&company.city)
        .bind(&company.state)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error creating company", e))?;

        Ok(result.0)
    }

    async fn delete_company(&self, company_id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM companies WHERE id = $1")
            .bind(company_id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Error deleting company", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_user(&self, user: &NewUser) -> StoreResult<Uuid> {
        let result: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO users (name, email, password_hash, role, company_id, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.password_hash.as_str())
        .bind(user.role.as_str())
        .bind(user.company_id)
        .bind(user.is_active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error creating user", e))?;

        Ok(result.0)
    }

    async fn authenticate(&self, email: &str, password: &Password) -> StoreResult<AuthOutcome> {
        let result: Option<(Option<Uuid>, bool)> = sqlx::query_as(
            "SELECT user_id, is_authenticated FROM authenticate_user(user_email => $1, user_password => $2)",
        )
        .bind(email)
        .bind(password.expose())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error authenticating user", e))?;

        Ok(match result {
            Some((user_id, authenticated)) => AuthOutcome { user_id, authenticated },
            None => AuthOutcome { user_id: None, authenticated: false },
        })
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, role, company_id, is_active, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error finding user", e))?
        .ok_or(StoreError::NotFound)?;

        row.try_into()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, name, email, role, company_id, is_active, created_at FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error finding user by email", e))?;

        row.map(User::try_from).transpose()
    }

    async fn create_invitation(&self, invitation: &NewInvitation) -> StoreResult<Invitation> {
        let result = sqlx::query_as::<_, Invitation>(
            r#"
            INSERT INTO invitations (token, email, company_id, created_by, expires_at, used)
            VALUES ($1, $2, $3, $4, $5, false)
            RETURNING id, token, email, company_id, created_by, used, expires_at, created_at
            "#,
        )
        .bind(&invitation.token)
        .bind(&invitation.email)
        .bind(invitation.company_id)
        .bind(invitation.created_by)
        .bind(invitation.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error creating invitation", e))?;

        Ok(result)
    }

    async fn validate_invitation(&self, token: &str) -> StoreResult<Option<InvitationSnapshot>> {
        let result = sqlx::query_as::<_, InvitationSnapshot>(
            "SELECT email, company_id, used, expires_at FROM invitations WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error validating invitation", e))?;

        Ok(result)
    }

    async fn mark_invitation_used(
        &self,
        token: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<InvitationMark> {
        let marked: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE invitations
            SET used = true
            WHERE token = $1
              AND used = false
              AND expires_at >= $2
              AND (email IS NULL OR lower(email) = lower($3))
            RETURNING company_id
            "#,
        )
        .bind(token)
        .bind(now)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error marking invitation as used", e))?;

        if let Some((company_id,)) = marked {
            return Ok(InvitationMark::Marked { company_id });
        }

        // Ninguna fila: releer para explicar el rechazo
        let snapshot = self.validate_invitation(token).await?;
        Ok(InvitationMark::diagnose(snapshot.as_ref(), email, now))
    }

    async fn release_invitation(&self, token: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE invitations SET used = false WHERE token = $1 AND used = true")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("Error releasing invitation", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_reset_token(&self, email: &str, token: &str, expires_at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $2, reset_token_expires_at = $3
            WHERE lower(email) = lower($1)
            "#,
        )
        .bind(email)
        .bind(token)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error storing reset token", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn validate_reset_token(&self, token: &str) -> StoreResult<Option<ResetTokenSnapshot>> {
        let result: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT email, reset_token_expires_at
            FROM users
            WHERE reset_token = $1 AND reset_token_expires_at IS NOT NULL
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error validating reset token", e))?;

        Ok(result.map(|(email, expires_at)| ResetTokenSnapshot { email, expires_at }))
    }

    async fn apply_password_reset(
        &self,
        email: &str,
        token: &str,
        password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $3, reset_token = NULL, reset_token_expires_at = NULL
            WHERE lower(email) = lower($1)
              AND reset_token = $2
              AND reset_token_expires_at >= $4
            "#,
        )
        .bind(email)
        .bind(token)
        .bind(password_hash.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("Error applying password reset", e))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_transport_errors_to_unavailable() {
        assert!(matches!(
            map_sqlx_error("ping", sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error("ping", sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
        assert_eq!(map_sqlx_error("find", sqlx::Error::RowNotFound), StoreError::NotFound);
    }

    #[test]
    fn test_user_row_with_unknown_role() {
        let row = UserRow {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            email: "ana@example.com".to_string(),
            role: "livreur".to_string(),
            company_id: None,
            is_active: true,
            created_at: Utc::now(),
        };
        assert!(matches!(User::try_from(row), Err(StoreError::Backend(_))));
    }
}
