//! Store de identidad sobre el servicio de datos REST
//!
//! Habla con la API estilo PostgREST del servicio de datos: procedimientos en
//! `/rest/v1/rpc/<nombre>` y tablas en `/rest/v1/<tabla>` con filtros
//! `col=eq.valor`. Los errores traen los mismos SQLSTATE que Postgres.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::{debug, error};
use uuid::Uuid;

use crate::models::{
    AdminDraft, AuthOutcome, CompanyInput, Invitation, InvitationMark, InvitationSnapshot,
    NewInvitation, NewUser, Password, PasswordHash, ProvisionedTenant, ResetTokenSnapshot, User,
};
use crate::repositories::identity_store::{
    classify_database_error, IdentityStore, StoreError, StoreResult,
};

const USER_COLUMNS: &str = "id,name,email,role,company_id,is_active,created_at";
const INVITATION_COLUMNS: &str = "id,token,email,company_id,created_by,used,expires_at,created_at";

/// Cuerpo de error de PostgREST
#[derive(Debug, Default, Deserialize)]
struct RestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: Uuid,
}

#[derive(Debug, Deserialize)]
struct CompanyRefRow {
    company_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct ResetTokenRow {
    email: String,
    reset_token_expires_at: DateTime<Utc>,
}

fn map_transport_error(context: &str, err: reqwest::Error) -> StoreError {
    if err.is_connect() || err.is_timeout() || err.is_request() {
        StoreError::Unavailable(format!("{}: {}", context, err))
    } else {
        StoreError::Backend(format!("{}: {}", context, err))
    }
}

/// Clasificar una respuesta no exitosa del servicio de datos
fn classify_http_error(status: StatusCode, body: &str) -> StoreError {
    if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        return StoreError::Unavailable(format!("data service answered {}", status));
    }

    let parsed: RestErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = match (&parsed.message, &parsed.details) {
        (Some(message), Some(details)) => format!("{} ({})", message, details),
        (Some(message), None) => message.clone(),
        (None, _) => body.to_string(),
    };

    match parsed.code.as_deref() {
        Some(code) => classify_database_error(Some(code), None, &message),
        None if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN => {
            StoreError::PermissionDenied(message)
        }
        None if status == StatusCode::NOT_FOUND => StoreError::NotFound,
        None => StoreError::Backend(format!("{}: {}", status, message)),
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Los procedimientos pueden devolver un objeto o un array de filas
fn first_row<T: DeserializeOwned>(value: Value) -> StoreResult<Option<T>> {
    let row = match value {
        Value::Array(rows) if rows.is_empty() => return Ok(None),
        Value::Array(mut rows) => rows.swap_remove(0),
        Value::Null => return Ok(None),
        other => other,
    };
    serde_json::from_value(row)
        .map(Some)
        .map_err(|e| StoreError::Backend(format!("unexpected response shape: {}", e)))
}

pub struct RestIdentityStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestIdentityStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.authorized(method, format!("{}/rest/v1/{}", self.base_url, table))
    }

    fn rpc(&self, procedure: &str) -> RequestBuilder {
        self.authorized(Method::POST, format!("{}/rest/v1/rpc/{}", self.base_url, procedure))
    }

    fn authorized(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send<T: DeserializeOwned>(&self, context: &str, request: RequestBuilder) -> StoreResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(context, e))?;

        let status = response.status();
        debug!("📡 {} -> {}", context, status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let classified = classify_http_error(status, &body);
            if matches!(classified, StoreError::Backend(_)) {
                error!("❌ {} failed with status {}: {}", context, status, body);
            }
            return Err(classified);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Backend(format!("{}: {}", context, e)))
    }

    /// Escritura con `Prefer: return=representation` que devuelve filas
    async fn write_rows<T: DeserializeOwned>(&self, context: &str, request: RequestBuilder) -> StoreResult<Vec<T>> {
        self.send(context, request.header("Prefer", "return=representation")).await
    }
}

#[async_trait]
impl IdentityStore for RestIdentityStore {
    async fn ping(&self) -> StoreResult<()> {
        let response = self
            .table(Method::GET, "users")
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| map_transport_error("Error pinging data service", e))?;

        // Cualquier respuesta que no sea 5xx demuestra que el servicio contesta
        if response.status().is_server_error() {
            return Err(StoreError::Unavailable(format!(
                "data service answered {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn run_atomic_company_admin_procedure(
        &self,
        company: &CompanyInput,
        admin: &AdminDraft,
    ) -> StoreResult<ProvisionedTenant> {
        let body = json!({
            "p_trade_name": company.trade_name,
            "p_company_email": company.email,
            "p_phone": company.phone,
            "p_cnpj": company.tax_id,
            "p_address": company.address,
            "p_neighborhood": company.neighborhood,
            "p_zip_code": company.zip_code,
            "p_city": company.city,
            "p_state": company.state,
            "p_admin_name": admin.name,
            "p_admin_email": admin.email,
            "p_admin_password_hash": admin.password_hash.as_str(),
        });

        let value: Value = self
            .send("register_company_and_admin", self.rpc("register_company_and_admin").json(&body))
            .await?;

        first_row(value)?.ok_or_else(|| StoreError::Backend("register_company_and_admin returned no ids".to_string()))
    }

    async fn exists_by_tax_id(&self, tax_id: &str) -> StoreResult<bool> {
        let cnpj = format!("eq.{}", tax_id);
        let rows: Vec<IdRow> = self
            .send(
                "Error checking cnpj",
                self.table(Method::GET, "companies")
                    .query(&[("select", "id"), ("cnpj", cnpj.as_str()), ("limit", "1")]),
            )
            .await?;

        Ok(!rows.is_empty())
    }

    async fn exists_by_company_email(&self, email: &str) -> StoreResult<bool> {
        let filter = format!("eq.{}", email);
        let rows: Vec<IdRow> = self
            .send(
                "Error checking company email",
                self.table(Method::GET, "companies")
                    .query(&[("select", "id"), ("email", filter.as_str()), ("limit", "1")]),
            )
            .await?;

        Ok(!rows.is_empty())
    }

    async fn exists_by_user_email(&self, email: &str) -> StoreResult<bool> {
        let filter = format!("eq.{}", email);
        let rows: Vec<IdRow> = self
            .send(
                "Error checking user email",
                self.table(Method::GET, "users")
                    .query(&[("select", "id"), ("email", filter.as_str()), ("limit", "1")]),
            )
            .await?;

        Ok(!rows.is_empty())
    }

    async fn insert_company(&self, company: &CompanyInput) -> StoreResult<Uuid> {
        let body = json!({
            "trade_name": company.trade_name,
            "email": company.email,
            "phone": company.phone,
            "cnpj": company.tax_id,
            "address": company.address,
            "neighborhood": company.neighborhood,
            "zip_code": company.zip_code,
            "city": company.city,
            "state": company.state,
        });

        let rows: Vec<IdRow> = self
            .write_rows(
                "Error creating company",
                self.table(Method::POST, "companies").query(&[("select", "id")]).json(&body),
            )
            .await?;

        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| StoreError::Backend("company insert returned no rows".to_string()))
    }

    async fn delete_company(&self, company_id: Uuid) -> StoreResult<()> {
        let filter = format!("eq.{}", company_id);
        let rows: Vec<IdRow> = self
            .write_rows(
                "Error deleting company",
                self.table(Method::DELETE, "companies")
                    .query(&[("id", filter.as_str()), ("select", "id")]),
            )
            .await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_user(&self, user: &NewUser) -> StoreResult<Uuid> {
        let body = json!({
            "name": user.name,
            "email": user.email,
            "password_hash": user.password_hash.as_str(),
            "role": user.role.as_str(),
            "company_id": user.company_id,
            "is_active": user.is_active,
        });

        let rows: Vec<IdRow> = self
            .write_rows(
                "Error creating user",
                self.table(Method::POST, "users").query(&[("select", "id")]).json(&body),
            )
            .await?;

        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| StoreError::Backend("user insert returned no rows".to_string()))
    }

    async fn authenticate(&self, email: &str, password: &Password) -> StoreResult<AuthOutcome> {
        let body = json!({ "user_email": email, "user_password": password.expose() });
        let value: Value = self
            .send("authenticate_user", self.rpc("authenticate_user").json(&body))
            .await?;

        Ok(first_row(value)?.unwrap_or(AuthOutcome {
            user_id: None,
            authenticated: false,
        }))
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> StoreResult<User> {
        let filter = format!("eq.{}", user_id);
        let rows: Vec<User> = self
            .send(
                "Error finding user",
                self.table(Method::GET, "users")
                    .query(&[("select", USER_COLUMNS), ("id", filter.as_str())]),
            )
            .await?;

        rows.into_iter().next().ok_or(StoreError::NotFound)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let filter = format!("eq.{}", email);
        let rows: Vec<User> = self
            .send(
                "Error finding user by email",
                self.table(Method::GET, "users")
                    .query(&[("select", USER_COLUMNS), ("email", filter.as_str()), ("limit", "1")]),
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn create_invitation(&self, invitation: &NewInvitation) -> StoreResult<Invitation> {
        let body = json!({
            "token": invitation.token,
            "email": invitation.email,
            "company_id": invitation.company_id,
            "created_by": invitation.created_by,
            "expires_at": timestamp(invitation.expires_at),
            "used": false,
        });

        let rows: Vec<Invitation> = self
            .write_rows(
                "Error creating invitation",
                self.table(Method::POST, "invitations")
                    .query(&[("select", INVITATION_COLUMNS)])
                    .json(&body),
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("invitation insert returned no rows".to_string()))
    }

    async fn validate_invitation(&self, token: &str) -> StoreResult<Option<InvitationSnapshot>> {
        let filter = format!("eq.{}", token);
        let rows: Vec<InvitationSnapshot> = self
            .send(
                "Error validating invitation",
                self.table(Method::GET, "invitations")
                    .query(&[("select", "email,company_id,used,expires_at"), ("token", filter.as_str())]),
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    async fn mark_invitation_used(
        &self,
        token: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<InvitationMark> {
        let token_filter = format!("eq.{}", token);
        let expiry_filter = format!("gte.{}", timestamp(now));
        let email_filter = format!("(email.is.null,email.eq.\"{}\")", email.replace('"', ""));

        let rows: Vec<CompanyRefRow> = self
            .write_rows(
                "Error marking invitation as used",
                self.table(Method::PATCH, "invitations")
                    .query(&[
                        ("token", token_filter.as_str()),
                        ("used", "is.false"),
                        ("expires_at", expiry_filter.as_str()),
                        ("or", email_filter.as_str()),
                        ("select", "company_id"),
                    ])
                    .json(&json!({ "used": true })),
            )
            .await?;

        if let Some(row) = rows.into_iter().next() {
            return Ok(InvitationMark::Marked {
                company_id: row.company_id,
            });
        }

        // Ninguna fila: releer para explicar el rechazo
        let snapshot = self.validate_invitation(token).await?;
        Ok(InvitationMark::diagnose(snapshot.as_ref(), email, now))
    }

    async fn release_invitation(&self, token: &str) -> StoreResult<()> {
        let filter = format!("eq.{}", token);
        let rows: Vec<CompanyRefRow> = self
            .write_rows(
                "Error releasing invitation",
                self.table(Method::PATCH, "invitations")
                    .query(&[("token", filter.as_str()), ("used", "is.true"), ("select", "company_id")])
                    .json(&json!({ "used": false })),
            )
            .await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_reset_token(&self, email: &str, token: &str, expires_at: DateTime<Utc>) -> StoreResult<bool> {
        let filter = format!("eq.{}", email);
        let rows: Vec<IdRow> = self
            .write_rows(
                "Error storing reset token",
                self.table(Method::PATCH, "users")
                    .query(&[("email", filter.as_str()), ("select", "id")])
                    .json(&json!({
                        "reset_token": token,
                        "reset_token_expires_at": timestamp(expires_at),
                    })),
            )
            .await?;

        Ok(!rows.is_empty())
    }

    async fn validate_reset_token(&self, token: &str) -> StoreResult<Option<ResetTokenSnapshot>> {
        let filter = format!("eq.{}", token);
        let rows: Vec<ResetTokenRow> = self
            .send(
                "Error validating reset token",
                self.table(Method::GET, "users").query(&[
                    ("select", "email,reset_token_expires_at"),
                    ("reset_token", filter.as_str()),
                    ("reset_token_expires_at", "not.is.null"),
                ]),
            )
            .await?;

        Ok(rows.into_iter().next().map(|row| ResetTokenSnapshot {
            email: row.email,
            expires_at: row.reset_token_expires_at,
        }))
    }

    async fn apply_password_reset(
        &self,
        email: &str,
        token: &str,
        password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let email_filter = format!("eq.{}", email);
        let token_filter = format!("eq.{}", token);
        let expiry_filter = format!("gte.{}", timestamp(now));

        let rows: Vec<IdRow> = self
            .write_rows(
                "Error applying password reset",
                self.table(Method::PATCH, "users")
                    .query(&[
                        ("email", email_filter.as_str()),
                        ("reset_token", token_filter.as_str()),
                        ("reset_token_expires_at", expiry_filter.as_str()),
                        ("select", "id"),
                    ])
                    .json(&json!({
                        "password_hash": password_hash.as_str(),
                        "reset_token": Value::Null,
                        "reset_token_expires_at": Value::Null,
                    })),
            )
            .await?;

        Ok(!rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::identity_store::UniqueField;

    #[test]
    fn test_classify_unique_violation_body() {
        let body = r#"{"code":"23505","message":"duplicate key value violates unique constraint \"companies_cnpj_key\"","details":"Key (cnpj)=(11222333000181) already exists."}"#;
        assert_eq!(
            classify_http_error(StatusCode::CONFLICT, body),
            StoreError::Duplicate(UniqueField::TaxId)
        );
    }

    #[test]
    fn test_classify_row_level_security_body() {
        let body = r#"{"code":"42501","message":"new row violates row-level security policy for table \"companies\""}"#;
        assert!(matches!(
            classify_http_error(StatusCode::FORBIDDEN, body),
            StoreError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_classify_gateway_errors_as_unavailable() {
        assert!(matches!(
            classify_http_error(StatusCode::SERVICE_UNAVAILABLE, ""),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            classify_http_error(StatusCode::UNAUTHORIZED, "Invalid API key"),
            StoreError::PermissionDenied(_)
        ));
    }

    #[test]
    fn test_first_row_accepts_object_or_array() {
        let id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        let object = json!({ "company_id": id, "user_id": user_id });
        let array = json!([{ "company_id": id, "user_id": user_id }]);

        let from_object: ProvisionedTenant = first_row(object).unwrap().unwrap();
        let from_array: ProvisionedTenant = first_row(array).unwrap().unwrap();
        assert_eq!(from_object, from_array);
        assert_eq!(from_object.admin_id, user_id);
        assert!(first_row::<ProvisionedTenant>(json!([])).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let store = RestIdentityStore::new("http://127.0.0.1:1", "key", Duration::from_secs(2)).unwrap();
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
    }
}
