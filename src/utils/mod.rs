//! Utilidades del sistema
//!
//! Este módulo contiene utilidades para manejo de errores, validación,
//! JWT de sesión, reloj y deadlines de llamada.

pub mod clock;
pub mod deadline;
pub mod errors;
pub mod jwt;
pub mod validation;
