//! Contexto de llamada con deadline
//!
//! Ninguna llamada al store puede colgarse sin límite: cada una se envuelve
//! en `tokio::time::timeout` con el presupuesto que le queda al contexto.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::repositories::identity_store::StoreError;

#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    deadline: Instant,
}

impl CallContext {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Ejecutar una llamada al store dentro del presupuesto restante.
    /// Un deadline vencido es `DeadlineElapsed`, distinto de un fallo de red.
    pub async fn run<T, F>(&self, label: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.is_expired() {
            warn!("⏱️ Store call '{}' skipped, deadline already elapsed", label);
            return Err(StoreError::DeadlineElapsed(format!("{} not started", label)));
        }

        match tokio::time::timeout_at(self.deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!("⏱️ Store call '{}' exceeded its deadline", label);
                Err(StoreError::DeadlineElapsed(format!("{} timed out", label)))
            }
        }
    }
}
