//! Credenciales
//!
//! Envoltorios para contraseñas en claro y hashes bcrypt. Ninguno de los dos
//! imprime su contenido en `Debug`, así que pueden viajar dentro de structs
//! que se loguean sin filtrar la credencial.

use std::fmt;

use bcrypt::{hash_with_result, verify, Version};
use serde::{Deserialize, Serialize};

use crate::utils::errors::IdentityError;

/// Contraseña en claro tal como llega del formulario
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Acceso explícito al valor en claro (solo para hashing o la llamada de autenticación)
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn char_count(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Hash bcrypt en formato `$2a$`, compatible con `crypt()` de pgcrypto
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verificación local. Solo la usa el store en memoria; el servicio
    /// siempre delega la verificación al procedimiento remoto.
    pub fn matches(&self, password: &Password) -> bool {
        verify(password.expose(), &self.0).unwrap_or(false)
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(***)")
    }
}

/// Hashear fuera del runtime async: bcrypt con coste 12 tarda cientos de ms
pub async fn hash_password(password: &Password, cost: u32) -> Result<PasswordHash, IdentityError> {
    let plain = password.clone();
    let hashed = tokio::task::spawn_blocking(move || hash_with_result(plain.expose(), cost))
        .await
        .map_err(|e| IdentityError::Persistence(format!("Hashing task failed: {}", e)))?
        .map_err(|e| IdentityError::Persistence(format!("Error hashing password: {}", e)))?;

    Ok(PasswordHash(hashed.format_for_version(Version::TwoA)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_debug_is_redacted() {
        let password = Password::new("super-secret");
        assert_eq!(format!("{:?}", password), "Password(***)");
        assert!(!format!("{:?}", Some(password)).contains("super-secret"));
    }

    #[tokio::test]
    async fn test_hash_password_roundtrip() {
        let password = Password::new("hunter22");
        let hashed = hash_password(&password, 4).await.unwrap();

        assert!(hashed.as_str().starts_with("$2a$04$"));
        assert!(hashed.matches(&password));
        assert!(!hashed.matches(&Password::new("hunter23")));
    }
}
