//! Middleware de autenticación JWT
//!
//! Extrae el Bearer token, verifica la firma y deja el snapshot de sesión
//! en las extensions de la request. El store no se consulta aquí: un usuario
//! desactivado conserva su JWT hasta que expira o hasta el próximo refresh.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::{
    state::AppState,
    utils::{
        errors::IdentityError,
        jwt::{extract_token_from_header, verify_session_token, SessionTokenError},
    },
};

/// Middleware de autenticación JWT
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, IdentityError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(SessionTokenError::MissingBearer)?;

    let token = extract_token_from_header(auth_header)?;
    let session = verify_session_token(token, &state.jwt).map_err(|e| {
        debug!("🔐 JWT rechazado: {}", e);
        e
    })?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}
