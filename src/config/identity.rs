//! Configuración del núcleo de identidad
//!
//! Ventanas de expiración de tokens, coste de bcrypt, timeouts de llamada y
//! la política de fallback del registro de empresas.

use std::str::FromStr;
use std::time::Duration;

use chrono::Duration as TtlDuration;

use crate::config::environment::{parse_or, ConfigError};

/// Qué fallos del procedimiento atómico activan la secuencia de fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// Solo un rechazo por autorización
    #[default]
    PermissionDeniedOnly,
    /// Cualquier fallo remoto que no sea de validación
    AnyRemoteFailure,
}

impl FromStr for FallbackPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "permission_denied" => Ok(FallbackPolicy::PermissionDeniedOnly),
            "any_remote_failure" => Ok(FallbackPolicy::AnyRemoteFailure),
            other => Err(ConfigError::Invalid {
                name: "REGISTRATION_FALLBACK",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub targeted_invitation_ttl: TtlDuration,
    pub universal_invitation_ttl: TtlDuration,
    pub reset_token_ttl: TtlDuration,
    pub token_bytes: usize,
    pub bcrypt_cost: u32,
    pub request_timeout: Duration,
    pub compensation_timeout: Duration,
    pub fallback_policy: FallbackPolicy,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            targeted_invitation_ttl: TtlDuration::minutes(10),
            universal_invitation_ttl: TtlDuration::hours(24),
            reset_token_ttl: TtlDuration::minutes(60),
            token_bytes: 32,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            request_timeout: Duration::from_secs(15),
            compensation_timeout: Duration::from_secs(10),
            fallback_policy: FallbackPolicy::default(),
        }
    }
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let fallback_policy = match super::environment::optional("REGISTRATION_FALLBACK") {
            Some(raw) => raw.parse()?,
            None => defaults.fallback_policy,
        };

        let token_bytes: usize = parse_or("TOKEN_BYTES", defaults.token_bytes)?;
        if token_bytes < 16 {
            return Err(ConfigError::Invalid {
                name: "TOKEN_BYTES",
                value: token_bytes.to_string(),
            });
        }

        Ok(Self {
            targeted_invitation_ttl: TtlDuration::minutes(parse_or("TARGETED_INVITATION_TTL_MINUTES", 10)?),
            universal_invitation_ttl: TtlDuration::hours(parse_or("UNIVERSAL_INVITATION_TTL_HOURS", 24)?),
            reset_token_ttl: TtlDuration::minutes(parse_or("RESET_TOKEN_TTL_MINUTES", 60)?),
            token_bytes,
            bcrypt_cost: parse_or("BCRYPT_COST", defaults.bcrypt_cost)?,
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 15)?),
            compensation_timeout: Duration::from_secs(parse_or("COMPENSATION_TIMEOUT_SECS", 10)?),
            fallback_policy,
        })
    }

    /// Configuración rápida para tests: bcrypt con coste mínimo
    pub fn for_tests() -> Self {
        Self {
            bcrypt_cost: 4,
            request_timeout: Duration::from_secs(2),
            compensation_timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }
}
