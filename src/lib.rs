//! Núcleo de identidad multi-empresa
//!
//! Registro de empresas con su administrador, invitaciones de colaboradores,
//! recuperación de credenciales y sesiones, sobre un store remoto detrás de
//! un gate de conectividad.

pub mod config;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

pub use services::IdentityService;
pub use state::AppState;
pub use utils::errors::{IdentityError, IdentityResult};
