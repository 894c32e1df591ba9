//! Store de identidad en memoria
//!
//! Aplica las mismas unicidades y updates condicionales que el store real,
//! todo bajo un único `RwLock`. Sirve para desarrollo local y para los tests,
//! que pueden inyectar fallos, latencia y caídas de red por operación.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    AdminDraft, AuthOutcome, Company, CompanyInput, Invitation, InvitationMark, InvitationSnapshot,
    NewInvitation, NewUser, Password, PasswordHash, ProvisionedTenant, ResetTokenSnapshot, User,
};
use crate::repositories::identity_store::{IdentityStore, StoreError, StoreResult, UniqueField};

/// Operaciones del store, para dirigir la inyección de fallos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Ping,
    AtomicProcedure,
    ExistsByTaxId,
    ExistsByCompanyEmail,
    ExistsByUserEmail,
    InsertCompany,
    DeleteCompany,
    InsertUser,
    Authenticate,
    GetUserById,
    FindUserByEmail,
    CreateInvitation,
    ValidateInvitation,
    MarkInvitationUsed,
    ReleaseInvitation,
    SetResetToken,
    ValidateResetToken,
    ApplyPasswordReset,
}

#[derive(Debug, Clone)]
struct UserRecord {
    user: User,
    password_hash: PasswordHash,
    reset_token: Option<(String, DateTime<Utc>)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    companies: HashMap<Uuid, Company>,
    users: HashMap<Uuid, UserRecord>,
    invitations: HashMap<String, Invitation>,
}

impl MemoryState {
    fn user_by_email(&self, email: &str) -> Option<&UserRecord> {
        self.users.values().find(|r| r.user.email.eq_ignore_ascii_case(email))
    }

    fn user_by_email_mut(&mut self, email: &str) -> Option<&mut UserRecord> {
        self.users.values_mut().find(|r| r.user.email.eq_ignore_ascii_case(email))
    }

    fn check_company_unique(&self, company: &CompanyInput) -> StoreResult<()> {
        if self.companies.values().any(|c| c.tax_id == company.tax_id) {
            return Err(StoreError::Duplicate(UniqueField::TaxId));
        }
        if self.companies.values().any(|c| c.email.eq_ignore_ascii_case(&company.email)) {
            return Err(StoreError::Duplicate(UniqueField::CompanyEmail));
        }
        Ok(())
    }

    fn put_company(&mut self, company: &CompanyInput) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        self.companies.insert(
            id,
            Company {
                id,
                trade_name: company.trade_name.clone(),
                email: company.email.clone(),
                phone: company.phone.clone(),
                tax_id: company.tax_id.clone(),
                address: company.address.clone(),
                neighborhood: company.neighborhood.clone(),
                zip_code: company.zip_code.clone(),
                city: company.city.clone(),
                state: company.state.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    fn put_user(&mut self, user: &NewUser) -> StoreResult<Uuid> {
        if self.user_by_email(&user.email).is_some() {
            return Err(StoreError::Duplicate(UniqueField::UserEmail));
        }
        if !self.companies.contains_key(&user.company_id) {
            return Err(StoreError::Backend(
                "insert or update on table \"users\" violates foreign key constraint".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        self.users.insert(
            id,
            UserRecord {
                user: User {
                    id,
                    name: user.name.clone(),
                    email: user.email.clone(),
                    role: user.role,
                    company_id: Some(user.company_id),
                    is_active: user.is_active,
                    created_at: Utc::now(),
                },
                password_hash: user.password_hash.clone(),
                reset_token: None,
            },
        );
        Ok(id)
    }
}

pub struct MemoryIdentityStore {
    state: RwLock<MemoryState>,
    faults: Mutex<HashMap<StoreOperation, VecDeque<StoreError>>>,
    delays: Mutex<HashMap<StoreOperation, VecDeque<Duration>>>,
    settle_delays: Mutex<HashMap<StoreOperation, VecDeque<Duration>>>,
    calls: Mutex<HashMap<StoreOperation, usize>>,
    reachable: AtomicBool,
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            faults: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            settle_delays: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// La próxima llamada a `operation` falla con `error`. Se encolan en orden.
    pub fn fail_next(&self, operation: StoreOperation, error: StoreError) {
        lock(&self.faults).entry(operation).or_default().push_back(error);
    }

    /// La próxima llamada a `operation` espera `delay` antes de ejecutarse
    pub fn delay_next(&self, operation: StoreOperation, delay: Duration) {
        lock(&self.delays).entry(operation).or_default().push_back(delay);
    }

    /// La próxima escritura de `operation` se aplica y la respuesta tarda
    /// `delay` en volver: el llamador puede vencer con el dato ya persistido
    pub fn settle_next(&self, operation: StoreOperation, delay: Duration) {
        lock(&self.settle_delays).entry(operation).or_default().push_back(delay);
    }

    /// Simular caída de red: todas las llamadas devuelven `Unavailable`
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn call_count(&self, operation: StoreOperation) -> usize {
        lock(&self.calls).get(&operation).copied().unwrap_or(0)
    }

    pub async fn company_count(&self) -> usize {
        self.state.read().await.companies.len()
    }

    pub async fn companies_with_tax_id(&self, tax_id: &str) -> usize {
        self.state.read().await.companies.values().filter(|c| c.tax_id == tax_id).count()
    }

    pub async fn admins_of(&self, company_id: Uuid) -> usize {
        self.state
            .read()
            .await
            .users
            .values()
            .filter(|r| r.user.company_id == Some(company_id) && r.user.role == crate::models::UserRole::Admin)
            .count()
    }

    pub async fn user_by_email(&self, email: &str) -> Option<User> {
        self.state.read().await.user_by_email(email).map(|r| r.user.clone())
    }

    pub async fn set_user_active(&self, user_id: Uuid, is_active: bool) {
        if let Some(record) = self.state.write().await.users.get_mut(&user_id) {
            record.user.is_active = is_active;
        }
    }

    pub async fn invitation(&self, token: &str) -> Option<Invitation> {
        self.state.read().await.invitations.get(token).cloned()
    }

    async fn enter(&self, operation: StoreOperation) -> StoreResult<()> {
        *lock(&self.calls).entry(operation).or_insert(0) += 1;

        if !self.reachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }

        let delay = lock(&self.delays).get_mut(&operation).and_then(VecDeque::pop_front);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let fault = lock(&self.faults).get_mut(&operation).and_then(VecDeque::pop_front);
        match fault {
            Some(error) => {
                debug!("💉 Fallo inyectado en {:?}: {}", operation, error);
                Err(error)
            }
            None => Ok(()),
        }
    }

    async fn settle(&self, operation: StoreOperation) {
        let delay = lock(&self.settle_delays).get_mut(&operation).and_then(VecDeque::pop_front);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn ping(&self) -> StoreResult<()> {
        self.enter(StoreOperation::Ping).await
    }

    async fn run_atomic_company_admin_procedure(
        &self,
        company: &CompanyInput,
        admin: &AdminDraft,
    ) -> StoreResult<ProvisionedTenant> {
        self.enter(StoreOperation::AtomicProcedure).await?;

        let mut state = self.state.write().await;
        state.check_company_unique(company)?;
        if state.user_by_email(&admin.email).is_some() {
            return Err(StoreError::Duplicate(UniqueField::UserEmail));
        }

        let company_id = state.put_company(company);
        let admin_id = state.put_user(&NewUser::admin(admin, company_id))?;
        Ok(ProvisionedTenant { company_id, admin_id })
    }

    async fn exists_by_tax_id(&self, tax_id: &str) -> StoreResult<bool> {
        self.enter(StoreOperation::ExistsByTaxId).await?;
        Ok(self.state.read().await.companies.values().any(|c| c.tax_id == tax_id))
    }

    async fn exists_by_company_email(&self, email: &str) -> StoreResult<bool> {
        self.enter(StoreOperation::ExistsByCompanyEmail).await?;
        Ok(self
            .state
            .read()
            .await
            .companies
            .values()
            .any(|c| c.email.eq_ignore_ascii_case(email)))
    }

    async fn exists_by_user_email(&self, email: &str) -> StoreResult<bool> {
        self.enter(StoreOperation::ExistsByUserEmail).await?;
        Ok(self.state.read().await.user_by_email(email).is_some())
    }

    async fn insert_company(&self, company: &CompanyInput) -> StoreResult<Uuid> {
        self.enter(StoreOperation::InsertCompany).await?;

        let mut state = self.state.write().await;
        state.check_company_unique(company)?;
        Ok(state.put_company(company))
    }

    async fn delete_company(&self, company_id: Uuid) -> StoreResult<()> {
        self.enter(StoreOperation::DeleteCompany).await?;

        let mut state = self.state.write().await;
        if state.users.values().any(|r| r.user.company_id == Some(company_id)) {
            return Err(StoreError::Backend(
                "update or delete on table \"companies\" violates foreign key constraint".to_string(),
            ));
        }
        state.companies.remove(&company_id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn insert_user(&self, user: &NewUser) -> StoreResult<Uuid> {
        self.enter(StoreOperation::InsertUser).await?;
        let id = self.state.write().await.put_user(user)?;
        self.settle(StoreOperation::InsertUser).await;
        Ok(id)
    }

    async fn authenticate(&self, email: &str, password: &Password) -> StoreResult<AuthOutcome> {
        self.enter(StoreOperation::Authenticate).await?;

        let candidate = self
            .state
            .read()
            .await
            .user_by_email(email)
            .map(|r| (r.user.id, r.password_hash.clone()));

        let Some((user_id, hash)) = candidate else {
            return Ok(AuthOutcome { user_id: None, authenticated: false });
        };

        let password = password.clone();
        let matches = tokio::task::spawn_blocking(move || hash.matches(&password))
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(AuthOutcome {
            user_id: matches.then_some(user_id),
            authenticated: matches,
        })
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> StoreResult<User> {
        self.enter(StoreOperation::GetUserById).await?;
        self.state
            .read()
            .await
            .users
            .get(&user_id)
            .map(|r| r.user.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.enter(StoreOperation::FindUserByEmail).await?;
        Ok(self.state.read().await.user_by_email(email).map(|r| r.user.clone()))
    }

    async fn create_invitation(&self, invitation: &NewInvitation) -> StoreResult<Invitation> {
        self.enter(StoreOperation::CreateInvitation).await?;

        let mut state = self.state.write().await;
        if state.invitations.contains_key(&invitation.token) {
            return Err(StoreError::Backend("duplicate invitation token".to_string()));
        }

        let row = Invitation {
            id: Uuid::new_v4(),
            token: invitation.token.clone(),
            email: invitation.email.clone(),
            company_id: invitation.company_id,
            created_by: invitation.created_by,
            used: false,
            expires_at: invitation.expires_at,
            created_at: Utc::now(),
        };
        state.invitations.insert(row.token.clone(), row.clone());
        Ok(row)
    }

    async fn validate_invitation(&self, token: &str) -> StoreResult<Option<InvitationSnapshot>> {
        self.enter(StoreOperation::ValidateInvitation).await?;
        Ok(self.state.read().await.invitations.get(token).map(|inv| InvitationSnapshot {
            email: inv.email.clone(),
            company_id: inv.company_id,
            used: inv.used,
            expires_at: inv.expires_at,
        }))
    }

    async fn mark_invitation_used(
        &self,
        token: &str,
        email: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<InvitationMark> {
        self.enter(StoreOperation::MarkInvitationUsed).await?;

        let mut state = self.state.write().await;
        let Some(invitation) = state.invitations.get_mut(token) else {
            return Ok(InvitationMark::NotFound);
        };

        if invitation.used {
            return Ok(InvitationMark::AlreadyUsed);
        }
        if now > invitation.expires_at {
            return Ok(InvitationMark::Expired);
        }
        if let Some(bound) = &invitation.email {
            if !bound.eq_ignore_ascii_case(email) {
                return Ok(InvitationMark::EmailMismatch);
            }
        }

        invitation.used = true;
        Ok(InvitationMark::Marked {
            company_id: invitation.company_id,
        })
    }

    async fn release_invitation(&self, token: &str) -> StoreResult<()> {
        self.enter(StoreOperation::ReleaseInvitation).await?;

        let mut state = self.state.write().await;
        match state.invitations.get_mut(token) {
            Some(invitation) if invitation.used => {
                invitation.used = false;
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    async fn set_reset_token(&self, email: &str, token: &str, expires_at: DateTime<Utc>) -> StoreResult<bool> {
        self.enter(StoreOperation::SetResetToken).await?;

        let mut state = self.state.write().await;
        match state.user_by_email_mut(email) {
            Some(record) => {
                record.reset_token = Some((token.to_string(), expires_at));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn validate_reset_token(&self, token: &str) -> StoreResult<Option<ResetTokenSnapshot>> {
        self.enter(StoreOperation::ValidateResetToken).await?;

        let state = self.state.read().await;
        Ok(state.users.values().find_map(|r| match &r.reset_token {
            Some((value, expires_at)) if value == token => Some(ResetTokenSnapshot {
                email: r.user.email.clone(),
                expires_at: *expires_at,
            }),
            _ => None,
        }))
    }

    async fn apply_password_reset(
        &self,
        email: &str,
        token: &str,
        password_hash: &PasswordHash,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.enter(StoreOperation::ApplyPasswordReset).await?;

        let mut state = self.state.write().await;
        let Some(record) = state.user_by_email_mut(email) else {
            return Ok(false);
        };

        let live = matches!(&record.reset_token, Some((value, expires_at)) if value == token && now <= *expires_at);
        if !live {
            return Ok(false);
        }

        record.password_hash = password_hash.clone();
        record.reset_token = None;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as TtlDuration;

    fn company(tax_id: &str, email: &str) -> CompanyInput {
        CompanyInput {
            trade_name: "Horizonte".to_string(),
            email: email.to_string(),
            phone: "11999990000".to_string(),
            tax_id: tax_id.to_string(),
            address: "Rua A, 1".to_string(),
            neighborhood: "Centro".to_string(),
            zip_code: "01310100".to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_company_enforces_uniqueness() {
        let store = MemoryIdentityStore::new();
        store.insert_company(&company("11222333000181", "a@x.com")).await.unwrap();

        assert_eq!(
            store.insert_company(&company("11222333000181", "b@x.com")).await,
            Err(StoreError::Duplicate(UniqueField::TaxId))
        );
        assert_eq!(
            store.insert_company(&company("11444777000161", "A@X.com")).await,
            Err(StoreError::Duplicate(UniqueField::CompanyEmail))
        );
        assert_eq!(store.company_count().await, 1);
    }

    #[tokio::test]
    async fn test_injected_fault_is_consumed_once() {
        let store = MemoryIdentityStore::new();
        store.fail_next(StoreOperation::Ping, StoreError::Backend("boom".into()));

        assert!(store.ping().await.is_err());
        assert!(store.ping().await.is_ok());
        assert_eq!(store.call_count(StoreOperation::Ping), 2);
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let store = MemoryIdentityStore::new();
        store.set_reachable(false);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_mark_invitation_guards() {
        let store = MemoryIdentityStore::new();
        let company_id = store.insert_company(&company("11222333000181", "a@x.com")).await.unwrap();
        let now = Utc::now();

        store
            .create_invitation(&NewInvitation {
                token: "tok".to_string(),
                email: Some("a@x.com".to_string()),
                company_id,
                created_by: Uuid::new_v4(),
                expires_at: now + TtlDuration::minutes(10),
            })
            .await
            .unwrap();

        assert_eq!(
            store.mark_invitation_used("tok", "b@x.com", now).await.unwrap(),
            InvitationMark::EmailMismatch
        );
        assert_eq!(
            store.mark_invitation_used("tok", "A@x.com", now).await.unwrap(),
            InvitationMark::Marked { company_id }
        );
        assert_eq!(
            store.mark_invitation_used("tok", "a@x.com", now).await.unwrap(),
            InvitationMark::AlreadyUsed
        );
        assert_eq!(
            store.mark_invitation_used("missing", "a@x.com", now).await.unwrap(),
            InvitationMark::NotFound
        );
    }
}
