use axum::{
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{Duration, Utc};

use crate::dto::auth_dto::{LoginRequest, LoginResponse};
use crate::dto::ApiResponse;
use crate::middleware::auth_middleware;
use crate::models::Session;
use crate::state::AppState;
use crate::utils::errors::IdentityError;
use crate::utils::jwt::generate_session_token;

/// Configura las rutas de autenticación
pub fn create_auth_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(me))
        .route_layer(from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .merge(protected)
}

async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, IdentityError> {
    let ctx = state.identity.context();
    let session = state.identity.login(&ctx, &request.email, &request.password).await?;
    Ok(Json(ApiResponse::success(sign(&state, session)?)))
}

/// La sesión vive en el cliente; el servidor no tiene nada que invalidar
async fn logout() -> Json<ApiResponse<()>> {
    Json(ApiResponse::message("Sesión cerrada"))
}

/// Relee al usuario y devuelve un JWT nuevo con el snapshot actualizado
async fn me(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<ApiResponse<LoginResponse>>, IdentityError> {
    let ctx = state.identity.context();
    let session = state.identity.refresh_session(&ctx, &session).await?;
    Ok(Json(ApiResponse::success(sign(&state, session)?)))
}

fn sign(state: &AppState, session: Session) -> Result<LoginResponse, IdentityError> {
    let token = generate_session_token(&session, &state.jwt)?;
    Ok(LoginResponse {
        token,
        expires_at: Utc::now() + Duration::seconds(state.jwt.expiration as i64),
        session,
    })
}
