//! Configuración del proyecto
//!
//! Este módulo contiene la configuración de base de datos, variables de entorno
//! y los parámetros del núcleo de identidad.

pub mod database;
pub mod environment;
pub mod identity;

pub use environment::*;
pub use identity::{FallbackPolicy, IdentityConfig};
