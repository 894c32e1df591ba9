use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::dto::password_dto::{ForgotPasswordRequest, ForgotPasswordResponse, ResetPasswordRequest};
use crate::dto::ApiResponse;
use crate::services::TokenVerdict;
use crate::state::AppState;
use crate::utils::errors::IdentityError;

pub fn create_password_router() -> Router<AppState> {
    Router::new()
        .route("/forgot", post(forgot))
        .route("/reset/:token", get(validate_token))
        .route("/reset", post(reset))
}

async fn forgot(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<ForgotPasswordResponse>>, IdentityError> {
    let ctx = state.identity.context();
    let issued = state.identity.request_password_reset(&ctx, &request.email).await?;

    Ok(Json(ApiResponse::success_with_message(
        ForgotPasswordResponse {
            expires_at: issued.expires_at,
        },
        "Token de recuperación enviado",
    )))
}

async fn validate_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<TokenVerdict>>, IdentityError> {
    let ctx = state.identity.context();
    let verdict = state.identity.validate_reset_token(&ctx, &token).await?;
    Ok(Json(ApiResponse::success(verdict)))
}

async fn reset(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<()>>, IdentityError> {
    let ctx = state.identity.context();
    state
        .identity
        .reset_password(&ctx, &request.token, request.password, request.confirm_password)
        .await?;
    Ok(Json(ApiResponse::message("Contraseña actualizada")))
}
