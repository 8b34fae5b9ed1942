use axum::{extract::State, response::Json};

use nasdu_core::api_types::{ApiResponse, HealthResponse};

use crate::infra::app_state::AppState;

pub async fn health_handler(
    State(state): State<AppState>,
) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_scans: state.scan_control.active_scans().len(),
        configured_scans: state.scan_control.catalog().len(),
    }))
}
