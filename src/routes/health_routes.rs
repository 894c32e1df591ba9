use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::dto::ApiResponse;
use crate::services::ConnectivityStatus;
use crate::state::AppState;

pub fn create_health_router() -> Router<AppState> {
    Router::new().route("/connectivity", get(connectivity))
}

/// Sondea el servicio de datos; es también la vía para salir del modo offline
async fn connectivity(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<ConnectivityStatus>>) {
    let reachable = state.identity.check_connectivity().await;
    let status = if reachable {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ApiResponse::success(state.identity.connectivity_status())))
}
