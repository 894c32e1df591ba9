use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::dto::registration_dto::{RegisterCollaboratorRequest, RegisterCompanyRequest};
use crate::dto::ApiResponse;
use crate::services::{EnrollmentOutcome, RegistrationOutcome};
use crate::state::AppState;
use crate::utils::errors::IdentityError;

pub fn create_registration_router() -> Router<AppState> {
    Router::new()
        .route("/company", post(register_company))
        .route("/collaborator", post(register_collaborator))
}

async fn register_company(
    State(state): State<AppState>,
    Json(request): Json<RegisterCompanyRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RegistrationOutcome>>), IdentityError> {
    let ctx = state.identity.context();
    let outcome = state
        .identity
        .register_company_and_admin(&ctx, request.company, request.admin)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(outcome, "Empresa registrada")),
    ))
}

async fn register_collaborator(
    State(state): State<AppState>,
    Json(request): Json<RegisterCollaboratorRequest>,
) -> Result<(StatusCode, Json<ApiResponse<EnrollmentOutcome>>), IdentityError> {
    let ctx = state.identity.context();
    let outcome = state
        .identity
        .register_collaborator_with_invitation(&ctx, &request.token, request.collaborator)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(outcome, "Colaborador registrado")),
    ))
}
