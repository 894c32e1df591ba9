#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use kontu_identity::config::IdentityConfig;
use kontu_identity::models::{AccountInput, CompanyInput, Password};
use kontu_identity::repositories::{IdentityStore, MemoryIdentityStore};
use kontu_identity::services::{IdentityService, RecordingNotifier, RegistrationOutcome};
use kontu_identity::utils::clock::ManualClock;

pub const TAX_ID_A: &str = "11.222.333/0001-81";
pub const TAX_ID_B: &str = "12.345.678/0001-95";
pub const TAX_ID_C: &str = "98765432000198";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn company(tax_id: &str, email: &str) -> CompanyInput {
    CompanyInput {
        trade_name: "Padaria Central".to_string(),
        email: email.to_string(),
        phone: "(11) 3333-4444".to_string(),
        tax_id: tax_id.to_string(),
        address: "Av. Paulista, 1000".to_string(),
        neighborhood: "Bela Vista".to_string(),
        zip_code: "01310-100".to_string(),
        city: "São Paulo".to_string(),
        state: "SP".to_string(),
    }
}

pub fn account(name: &str, email: &str, password: &str) -> AccountInput {
    AccountInput {
        name: name.to_string(),
        email: email.to_string(),
        password: Password::from(password),
        confirm_password: Password::from(password),
    }
}

pub struct Harness {
    pub store: Arc<MemoryIdentityStore>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub service: Arc<IdentityService>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(IdentityConfig::for_tests()).await
    }

    pub async fn with_config(config: IdentityConfig) -> Self {
        let store = Arc::new(MemoryIdentityStore::new());
        let clock = Arc::new(ManualClock::at(t0()));
        let notifier = Arc::new(RecordingNotifier::new());

        let service = IdentityService::bootstrap(store.clone() as Arc<dyn IdentityStore>, config, clock.clone())
            .await
            .with_notifier(notifier.clone());

        Self {
            store,
            clock,
            notifier,
            service: Arc::new(service),
        }
    }

    /// Registrar una empresa con su admin por el camino atómico
    pub async fn tenant(&self, tax_id: &str, admin_email: &str) -> RegistrationOutcome {
        let ctx = self.service.context();
        self.service
            .register_company_and_admin(
                &ctx,
                company(tax_id, &format!("contato+{}", admin_email)),
                account("Admin", admin_email, "segredo123"),
            )
            .await
            .unwrap()
    }
}
