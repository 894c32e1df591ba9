//! Saga de registro de empresa + admin
//!
//! Primero se intenta el procedimiento atómico del servidor. Si la política lo
//! bloquea, se sigue una secuencia de inserts con compensación: nunca queda
//! una empresa sin su admin.
//!
//! ```text
//! Primary ──ok──────────────────────────────────────────▶ Finished(Ok)
//!    │ fallo de política
//!    ▼
//! PreCheck ──duplicado──▶ Finished(Err)
//!    ▼
//! InsertCompany ──error──▶ Finished(Err)
//!    ▼
//! InsertAdmin ──ok──▶ Finished(Ok)
//!    │ error
//!    ▼
//! Compensate ──▶ Finished(Err)
//! ```
//!
//! Desde `InsertCompany` la saga corre en su propia tarea: si el llamador
//! abandona el futuro, la compensación se ejecuta igual.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::FallbackPolicy;
use crate::models::{AdminDraft, CompanyInput, NewUser};
use crate::repositories::identity_store::{IdentityStore, StoreError, UniqueField};
use crate::services::connectivity::ConnectivityGate;
use crate::utils::deadline::CallContext;
use crate::utils::errors::{IdentityError, IdentityResult, ValidationKind};

/// Camino por el que se completó el registro
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPath {
    Atomic,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistrationOutcome {
    pub company_id: Uuid,
    pub admin_id: Uuid,
    pub path: RegistrationPath,
}

/// Qué hacer con un fallo del procedimiento atómico
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryFailure {
    Terminal(IdentityError),
    Fallback(StoreError),
}

pub fn classify_primary_failure(err: StoreError, policy: FallbackPolicy) -> PrimaryFailure {
    match err {
        StoreError::Duplicate(field) => PrimaryFailure::Terminal(IdentityError::Validation(field.into())),
        StoreError::Invalid(field) => PrimaryFailure::Terminal(IdentityError::Validation(field.into())),
        StoreError::PermissionDenied(_) => PrimaryFailure::Fallback(err),
        other if policy == FallbackPolicy::AnyRemoteFailure => PrimaryFailure::Fallback(other),
        StoreError::Unavailable(msg) | StoreError::DeadlineElapsed(msg) => {
            PrimaryFailure::Terminal(IdentityError::Connectivity(msg))
        }
        other => PrimaryFailure::Terminal(IdentityError::Persistence(other.to_string())),
    }
}

/// Estados de la saga
#[derive(Debug)]
pub enum SagaStep {
    Primary,
    PreCheck { trigger: StoreError },
    InsertCompany,
    InsertAdmin { company_id: Uuid },
    Compensate { company_id: Uuid, cause: IdentityError },
    Finished(IdentityResult<RegistrationOutcome>),
}

impl SagaStep {
    fn is_commit_phase(&self) -> bool {
        matches!(
            self,
            SagaStep::InsertCompany | SagaStep::InsertAdmin { .. } | SagaStep::Compensate { .. }
        )
    }
}

pub struct RegistrationSaga {
    store: Arc<dyn IdentityStore>,
    gate: Arc<ConnectivityGate>,
    policy: FallbackPolicy,
    compensation_timeout: Duration,
}

impl RegistrationSaga {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        gate: Arc<ConnectivityGate>,
        policy: FallbackPolicy,
        compensation_timeout: Duration,
    ) -> Self {
        Self {
            store,
            gate,
            policy,
            compensation_timeout,
        }
    }

    /// Registrar empresa y admin. Los inputs llegan ya validados y
    /// normalizados, con la contraseña hasheada.
    pub async fn register(
        &self,
        ctx: &CallContext,
        company: CompanyInput,
        admin: AdminDraft,
    ) -> IdentityResult<RegistrationOutcome> {
        self.gate.ensure_reachable()?;

        let mut run = SagaRun {
            store: self.store.clone(),
            gate: self.gate.clone(),
            policy: self.policy,
            compensation_timeout: self.compensation_timeout,
            company,
            admin,
        };

        let mut step = SagaStep::Primary;
        while !matches!(step, SagaStep::Finished(_)) && !step.is_commit_phase() {
            step = run.advance(ctx, step).await;
        }

        if let SagaStep::Finished(result) = step {
            return result;
        }

        let ctx = *ctx;
        let commit = tokio::spawn(async move { run.drive(&ctx, step).await });
        commit
            .await
            .map_err(|e| IdentityError::Persistence(format!("registration task failed: {}", e)))?
    }
}

/// Una ejecución concreta de la saga, dueña de sus inputs
struct SagaRun {
    store: Arc<dyn IdentityStore>,
    gate: Arc<ConnectivityGate>,
    policy: FallbackPolicy,
    compensation_timeout: Duration,
    company: CompanyInput,
    admin: AdminDraft,
}

impl SagaRun {
    async fn drive(&mut self, ctx: &CallContext, mut step: SagaStep) -> IdentityResult<RegistrationOutcome> {
        loop {
            step = match step {
                SagaStep::Finished(result) => return result,
                other => self.advance(ctx, other).await,
            };
        }
    }

    async fn advance(&mut self, ctx: &CallContext, step: SagaStep) -> SagaStep {
        match step {
            SagaStep::Primary => self.primary(ctx).await,
            SagaStep::PreCheck { trigger } => self.pre_check(ctx, trigger).await,
            SagaStep::InsertCompany => self.insert_company(ctx).await,
            SagaStep::InsertAdmin { company_id } => self.insert_admin(ctx, company_id).await,
            SagaStep::Compensate { company_id, cause } => self.compensate(company_id, cause).await,
            finished @ SagaStep::Finished(_) => finished,
        }
    }

    async fn primary(&mut self, ctx: &CallContext) -> SagaStep {
        info!("🏢 Registro atómico de empresa (cnpj {})", self.company.tax_id);

        let result = self
            .gate
            .call(
                ctx,
                "register_company_and_admin",
                self.store.run_atomic_company_admin_procedure(&self.company, &self.admin),
            )
            .await;

        match result {
            Ok(tenant) => {
                info!(
                    "✅ Empresa {} creada por el procedimiento atómico (cnpj {})",
                    tenant.company_id, self.company.tax_id
                );
                SagaStep::Finished(Ok(RegistrationOutcome {
                    company_id: tenant.company_id,
                    admin_id: tenant.admin_id,
                    path: RegistrationPath::Atomic,
                }))
            }
            Err(err) => match classify_primary_failure(err, self.policy) {
                PrimaryFailure::Terminal(err) => {
                    warn!("⚠️ Registro rechazado (cnpj {}): {}", self.company.tax_id, err);
                    SagaStep::Finished(Err(err))
                }
                PrimaryFailure::Fallback(trigger) => {
                    warn!(
                        "🔀 Procedimiento atómico bloqueado (cnpj {}), siguiendo con inserts directos: {}",
                        self.company.tax_id, trigger
                    );
                    SagaStep::PreCheck { trigger }
                }
            },
        }
    }

    /// Pre-chequeo para dar un error amable antes de escribir. La unicidad
    /// del store sigue siendo la autoridad final.
    async fn pre_check(&mut self, ctx: &CallContext, trigger: StoreError) -> SagaStep {
        let checks = futures::try_join!(
            self.gate.call(ctx, "exists_by_tax_id", self.store.exists_by_tax_id(&self.company.tax_id)),
            self.gate.call(
                ctx,
                "exists_by_company_email",
                self.store.exists_by_company_email(&self.company.email)
            ),
            self.gate.call(ctx, "exists_by_user_email", self.store.exists_by_user_email(&self.admin.email)),
        );

        let duplicate = match checks {
            Ok((true, _, _)) => Some(ValidationKind::DuplicateTaxId),
            Ok((_, true, _)) => Some(ValidationKind::DuplicateCompanyEmail),
            Ok((_, _, true)) => Some(ValidationKind::DuplicateUserEmail),
            Ok(_) => None,
            Err(err) => {
                warn!(
                    "⚠️ Pre-chequeo falló (cnpj {}) tras {}: {}",
                    self.company.tax_id, trigger, err
                );
                return SagaStep::Finished(Err(err.into()));
            }
        };

        match duplicate {
            Some(kind) => SagaStep::Finished(Err(IdentityError::Validation(kind))),
            None => SagaStep::InsertCompany,
        }
    }

    async fn insert_company(&mut self, ctx: &CallContext) -> SagaStep {
        match self
            .gate
            .call(ctx, "insert_company", self.store.insert_company(&self.company))
            .await
        {
            Ok(company_id) => {
                info!("🏢 Empresa {} insertada (cnpj {})", company_id, self.company.tax_id);
                SagaStep::InsertAdmin { company_id }
            }
            Err(StoreError::PermissionDenied(msg)) => {
                error!(
                    "🚫 Insert de empresa bloqueado (cnpj {}), sin más alternativas: {}",
                    self.company.tax_id, msg
                );
                SagaStep::Finished(Err(IdentityError::Permission(msg)))
            }
            Err(err) => SagaStep::Finished(Err(err.into())),
        }
    }

    async fn insert_admin(&mut self, ctx: &CallContext, company_id: Uuid) -> SagaStep {
        let user = NewUser::admin(&self.admin, company_id);

        match self.gate.call(ctx, "insert_user", self.store.insert_user(&user)).await {
            Ok(admin_id) => {
                info!(
                    "✅ Empresa {} y admin {} creados por inserts directos (cnpj {})",
                    company_id, admin_id, self.company.tax_id
                );
                SagaStep::Finished(Ok(RegistrationOutcome {
                    company_id,
                    admin_id,
                    path: RegistrationPath::Fallback,
                }))
            }
            Err(err) if err.is_indeterminate() => self.reconcile_admin(company_id, err).await,
            Err(err) => {
                let cause = match err {
                    StoreError::Duplicate(_) => IdentityError::Validation(UniqueField::UserEmail.into()),
                    other => other.into(),
                };
                warn!(
                    "↩️ Insert del admin falló para la empresa {} (cnpj {}): {}. Compensando",
                    company_id, self.company.tax_id, cause
                );
                SagaStep::Compensate { company_id, cause }
            }
        }
    }

    /// El insert del admin venció o perdió la conexión sin respuesta. Se
    /// relee con un contexto nuevo antes de decidir: solo se compensa si el
    /// admin no quedó escrito.
    async fn reconcile_admin(&mut self, company_id: Uuid, err: StoreError) -> SagaStep {
        let ctx = CallContext::with_timeout(self.compensation_timeout);

        match self
            .gate
            .call(&ctx, "find_user_by_email", self.store.find_user_by_email(&self.admin.email))
            .await
        {
            Ok(Some(user)) if user.company_id == Some(company_id) => {
                info!(
                    "✅ Admin {} confirmado para la empresa {} tras {} (cnpj {})",
                    user.id, company_id, err, self.company.tax_id
                );
                SagaStep::Finished(Ok(RegistrationOutcome {
                    company_id,
                    admin_id: user.id,
                    path: RegistrationPath::Fallback,
                }))
            }
            Ok(Some(_)) => SagaStep::Compensate {
                company_id,
                cause: IdentityError::Validation(UniqueField::UserEmail.into()),
            },
            Ok(None) => {
                warn!(
                    "↩️ Admin no escrito para la empresa {} (cnpj {}): {}. Compensando",
                    company_id, self.company.tax_id, err
                );
                SagaStep::Compensate {
                    company_id,
                    cause: err.into(),
                }
            }
            Err(check_err) => {
                error!(
                    company_id = %company_id,
                    tax_id = %self.company.tax_id,
                    "🚨 Resultado del insert del admin desconocido ({}), sin compensar: {}",
                    err,
                    check_err
                );
                SagaStep::Finished(Err(IdentityError::Persistence(format!(
                    "admin insert for company {} (cnpj {}) has an unknown outcome: {}",
                    company_id, self.company.tax_id, check_err
                ))))
            }
        }
    }

    /// Borrar la empresa recién creada. Corre con un contexto nuevo: el
    /// deadline del llamador puede haber vencido ya.
    async fn compensate(&mut self, company_id: Uuid, cause: IdentityError) -> SagaStep {
        let ctx = CallContext::with_timeout(self.compensation_timeout);

        match self
            .gate
            .call(&ctx, "delete_company", self.store.delete_company(company_id))
            .await
        {
            Ok(()) => {
                info!("↩️ Empresa {} eliminada (cnpj {})", company_id, self.company.tax_id);
                SagaStep::Finished(Err(cause))
            }
            Err(StoreError::NotFound) => {
                warn!("↩️ Empresa {} ya no existía al compensar", company_id);
                SagaStep::Finished(Err(cause))
            }
            Err(StoreError::PermissionDenied(msg)) => {
                error!(
                    company_id = %company_id,
                    tax_id = %self.company.tax_id,
                    "🚨 Compensación bloqueada: empresa huérfana sin admin ({}). Causa original: {}",
                    msg,
                    cause
                );
                SagaStep::Finished(Err(IdentityError::Permission(format!(
                    "compensating delete of company {} (cnpj {}) was denied: {}",
                    company_id, self.company.tax_id, msg
                ))))
            }
            Err(err) => {
                error!(
                    company_id = %company_id,
                    tax_id = %self.company.tax_id,
                    "🚨 Compensación fallida: empresa huérfana sin admin ({}). Causa original: {}",
                    err,
                    cause
                );
                SagaStep::Finished(Err(IdentityError::Persistence(format!(
                    "orphaned company {} (cnpj {}) needs manual cleanup: {}",
                    company_id, self.company.tax_id, err
                ))))
            }
        }
    }
}
