use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};

use crate::dto::invitation_dto::{CreateInvitationRequest, InvitationResponse};
use crate::dto::ApiResponse;
use crate::middleware::auth_middleware;
use crate::models::Session;
use crate::services::TokenVerdict;
use crate::state::AppState;
use crate::utils::errors::IdentityError;

pub fn create_invitation_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_invitation))
        .route_layer(from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/:token", get(validate_invitation))
        .merge(protected)
}

/// Solo un admin activo de la empresa puede invitar; el servicio lo comprueba
/// contra el store, no contra el JWT
async fn create_invitation(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(request): Json<CreateInvitationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<InvitationResponse>>), IdentityError> {
    let ctx = state.identity.context();
    let issued = state
        .identity
        .create_invitation(&ctx, &session, request.scope())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(issued.into()))))
}

async fn validate_invitation(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ApiResponse<TokenVerdict>>, IdentityError> {
    let ctx = state.identity.context();
    let verdict = state.identity.validate_invitation(&ctx, &token).await?;
    Ok(Json(ApiResponse::success(verdict)))
}
