//! Middleware del sistema
//!
//! Autenticación por JWT y configuración de CORS.

pub mod auth;
pub mod cors;

pub use auth::auth_middleware;
pub use cors::{cors_middleware, cors_middleware_with_origins};
