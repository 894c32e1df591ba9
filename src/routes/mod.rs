//! Rutas HTTP
//!
//! Cada módulo expone un router que se anida bajo `/api`.

pub mod auth_routes;
pub mod health_routes;
pub mod invitation_routes;
pub mod password_routes;
pub mod registration_routes;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::middleware::cors_middleware;
use crate::state::AppState;

/// Router completo de la API
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/health", health_routes::create_health_router())
        .nest("/api/registration", registration_routes::create_registration_router())
        .nest("/api/auth", auth_routes::create_auth_router(state.clone()))
        .nest("/api/password", password_routes::create_password_router())
        .nest("/api/invitations", invitation_routes::create_invitation_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_middleware(&state.config))
        .with_state(state)
}
