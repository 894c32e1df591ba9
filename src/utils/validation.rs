//! Utilidades de validación
//!
//! Este módulo contiene las reglas de formulario (CNPJ, CEP, UF) usadas por
//! los inputs de registro, y la normalización que se aplica antes de que un
//! valor llegue al store.

use validator::{ValidationError, ValidationErrors};

use crate::utils::errors::ValidationKind;

/// Longitud mínima de contraseña aceptada en registro y recuperación
pub const MIN_PASSWORD_CHARS: usize = 6;

const CNPJ_FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const CNPJ_SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Quedarse solo con los dígitos ("11.222.333/0001-81" -> "11222333000181")
pub fn normalize_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Validar que un string no esté vacío
pub fn validate_not_empty(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("not_empty");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar CNPJ: 14 dígitos, no todos iguales, dígitos verificadores correctos
pub fn validate_cnpj(value: &str) -> Result<(), ValidationError> {
    let digits: Vec<u32> = normalize_digits(value)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();

    let valid = digits.len() == 14
        && digits.iter().any(|d| *d != digits[0])
        && cnpj_check_digit(&digits[..12], &CNPJ_FIRST_WEIGHTS) == digits[12]
        && cnpj_check_digit(&digits[..13], &CNPJ_SECOND_WEIGHTS) == digits[13];

    if !valid {
        let mut error = ValidationError::new("cnpj");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

fn cnpj_check_digit(digits: &[u32], weights: &[u32]) -> u32 {
    let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
    match sum % 11 {
        0 | 1 => 0,
        rest => 11 - rest,
    }
}

/// Validar CEP: 8 dígitos tras quitar la puntuación
pub fn validate_cep(value: &str) -> Result<(), ValidationError> {
    let digits = normalize_digits(value);
    let only_punctuation = value
        .chars()
        .all(|c| c.is_ascii_digit() || c == '-' || c == '.' || c.is_whitespace());

    if digits.len() != 8 || !only_punctuation {
        let mut error = ValidationError::new("cep");
        error.add_param("value".into(), &value.to_string());
        error.add_param("format".into(), &"00000-000".to_string());
        return Err(error);
    }
    Ok(())
}

/// Validar UF de dos letras
pub fn validate_state(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.len() != 2 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        let mut error = ValidationError::new("state");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Reducir los errores de `validator` al primer `ValidationKind` relevante.
/// Los campos con semántica propia (CNPJ, CEP, email) ganan sobre el resto.
pub fn validation_kind(errors: &ValidationErrors) -> ValidationKind {
    let fields = errors.field_errors();

    if fields.contains_key("tax_id") {
        return ValidationKind::MalformedTaxId;
    }
    if fields.contains_key("zip_code") {
        return ValidationKind::MalformedPostalCode;
    }
    if fields.contains_key("email") {
        return ValidationKind::MalformedEmail;
    }

    let mut names: Vec<&str> = fields.keys().copied().collect();
    names.sort_unstable();
    match names.first() {
        Some(name) => ValidationKind::MalformedField(name.to_string()),
        None => ValidationKind::MalformedField("unknown".to_string()),
    }
}
