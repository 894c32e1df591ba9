//! Gate de conectividad
//!
//! Estado de alcanzabilidad del servicio de datos, compartido por todos los
//! servicios. Se evalúa al arrancar y bajo demanda; mientras el último estado
//! conocido sea "inalcanzable", las operaciones fallan sin tocar la red.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::repositories::identity_store::{IdentityStore, StoreError};
use crate::utils::clock::Clock;
use crate::utils::deadline::CallContext;
use crate::utils::errors::{IdentityError, IdentityResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectivityStatus {
    pub reachable: bool,
    pub checked_at: Option<DateTime<Utc>>,
}

pub struct ConnectivityGate {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    reachable: AtomicBool,
    checked_at: Mutex<Option<DateTime<Utc>>>,
    probe_timeout: Duration,
}

impl ConnectivityGate {
    /// El gate arranca en "inalcanzable" hasta la primera comprobación
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>, probe_timeout: Duration) -> Self {
        Self {
            store,
            clock,
            reachable: AtomicBool::new(false),
            checked_at: Mutex::new(None),
            probe_timeout,
        }
    }

    /// Sondear el servicio de datos y actualizar el estado compartido
    pub async fn check_connectivity(&self) -> bool {
        let ctx = CallContext::with_timeout(self.probe_timeout);
        let result = ctx.run("ping", self.store.ping()).await;
        let reachable = result.is_ok();

        let previous = self.reachable.swap(reachable, Ordering::SeqCst);
        *self.checked_at.lock().unwrap_or_else(|p| p.into_inner()) = Some(self.clock.now());

        match (&result, previous) {
            (Ok(()), false) => info!("🟢 Servicio de datos alcanzable"),
            (Err(err), true) => warn!("🔴 Servicio de datos inalcanzable: {}", err),
            (Err(err), false) => warn!("🔴 Servicio de datos sigue inalcanzable: {}", err),
            (Ok(()), true) => {}
        }

        reachable
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Fallar rápido sin llamada remota si el último estado es inalcanzable
    pub fn ensure_reachable(&self) -> IdentityResult<()> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(IdentityError::Connectivity(
                "data service marked unreachable".to_string(),
            ))
        }
    }

    pub fn mark_unreachable(&self, reason: &str) {
        if self.reachable.swap(false, Ordering::SeqCst) {
            warn!("🔴 Servicio de datos marcado como inalcanzable: {}", reason);
        }
    }

    /// Un fallo de transporte en cualquier operación degrada el gate.
    /// El deadline vencido de un llamador no cuenta como fallo de transporte.
    pub fn observe(&self, err: &StoreError) {
        if let StoreError::Unavailable(reason) = err {
            self.mark_unreachable(reason);
        }
    }

    /// Ejecutar una llamada al store con el deadline del contexto,
    /// observando los fallos de transporte
    pub async fn call<T, F>(&self, ctx: &CallContext, label: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = ctx.run(label, call).await;
        if let Err(err) = &result {
            self.observe(err);
        }
        result
    }

    pub fn status(&self) -> ConnectivityStatus {
        ConnectivityStatus {
            reachable: self.is_reachable(),
            checked_at: *self.checked_at.lock().unwrap_or_else(|p| p.into_inner()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory_store::{MemoryIdentityStore, StoreOperation};
    use crate::utils::clock::SystemClock;

    fn gate(store: Arc<MemoryIdentityStore>) -> ConnectivityGate {
        ConnectivityGate::new(store, Arc::new(SystemClock), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_gate_starts_unreachable_until_checked() {
        let store = Arc::new(MemoryIdentityStore::new());
        let gate = gate(store.clone());

        assert!(matches!(gate.ensure_reachable(), Err(IdentityError::Connectivity(_))));
        assert!(gate.status().checked_at.is_none());

        assert!(gate.check_connectivity().await);
        assert!(gate.ensure_reachable().is_ok());
        assert!(gate.status().checked_at.is_some());
        assert_eq!(store.call_count(StoreOperation::Ping), 1);
    }

    #[tokio::test]
    async fn test_gate_reflects_outage_and_recovery() {
        let store = Arc::new(MemoryIdentityStore::new());
        let gate = gate(store.clone());

        store.set_reachable(false);
        assert!(!gate.check_connectivity().await);

        store.set_reachable(true);
        assert!(gate.check_connectivity().await);
    }

    #[tokio::test]
    async fn test_observed_transport_failure_marks_unreachable() {
        let store = Arc::new(MemoryIdentityStore::new());
        let gate = gate(store.clone());
        gate.check_connectivity().await;

        gate.observe(&StoreError::Backend("constraint".into()));
        assert!(gate.is_reachable());

        gate.observe(&StoreError::Unavailable("connection reset".into()));
        assert!(!gate.is_reachable());
    }

    #[tokio::test]
    async fn test_caller_deadline_keeps_gate_reachable() {
        let store = Arc::new(MemoryIdentityStore::new());
        let gate = gate(store.clone());
        gate.check_connectivity().await;

        store.delay_next(StoreOperation::ExistsByTaxId, Duration::from_millis(300));
        let impatient = CallContext::with_timeout(Duration::from_millis(20));
        let result = gate
            .call(&impatient, "exists_by_tax_id", store.exists_by_tax_id("11222333000181"))
            .await;

        assert!(matches!(result, Err(StoreError::DeadlineElapsed(_))));
        assert!(gate.is_reachable());
        assert!(gate.ensure_reachable().is_ok());
    }
}
