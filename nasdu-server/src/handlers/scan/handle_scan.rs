use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

use nasdu_core::api_types::{ApiResponse, CancelAck, HistoryQuery, ScanSummary, TriggerAck};
use nasdu_core::model::ScanResult;
use nasdu_core::progress::{ProgressReport, ProgressView};

use crate::infra::app_state::AppState;
use crate::infra::errors::AppError;
use crate::infra::scan::ScanControlError;

const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug)]
pub struct ScanHttpError {
    status: StatusCode,
    message: String,
}

impl From<ScanControlError> for ScanHttpError {
    fn from(error: ScanControlError) -> Self {
        let status = error.status_code();
        let message = error.message();
        Self { status, message }
    }
}

impl From<AppError> for ScanHttpError {
    fn from(error: AppError) -> Self {
        Self {
            status: error.status,
            message: error.message,
        }
    }
}

impl IntoResponse for ScanHttpError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ApiResponse::<()>::error(self.message));
        (self.status, payload).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct ScanHistoryResponse {
    pub history: Vec<ScanResult>,
    pub count: usize,
}

pub async fn list_scans_handler(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<ScanSummary>>> {
    Json(ApiResponse::success(state.scan_control.definitions()))
}

/// Latest progress of a scan. Unknown or evicted scans are a plain 404;
/// only a malformed id is a 400.
pub async fn scan_progress_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<ProgressReport>, ScanHttpError> {
    match state.progress.get_progress(&scan_id).map_err(AppError::from)? {
        ProgressView::Found(report) => Ok(Json(report)),
        ProgressView::NotFound => Err(ScanHttpError {
            status: StatusCode::NOT_FOUND,
            message: format!("no progress available for scan '{scan_id}'"),
        }),
    }
}

pub async fn trigger_scan_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<TriggerAck>>), ScanHttpError> {
    let ack = state.scan_control.trigger(&scan_id)?;
    let status = if ack.triggered {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    let message = ack.message.clone();
    Ok((status, Json(ApiResponse::success(ack).with_message(message))))
}

pub async fn cancel_scan_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<ApiResponse<CancelAck>>, ScanHttpError> {
    let ack = state.scan_control.cancel(&scan_id)?;
    Ok(Json(ApiResponse::success(ack)))
}

pub async fn scan_results_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> Result<Json<ApiResponse<ScanResult>>, ScanHttpError> {
    let definition = state.scan_control.lookup(&scan_id)?;
    let latest = state
        .history
        .latest(&definition.slug)
        .await
        .map_err(AppError::from)?;
    match latest {
        Some(result) => Ok(Json(ApiResponse::success(result))),
        None => Err(ScanHttpError {
            status: StatusCode::NOT_FOUND,
            message: format!("no results recorded for scan '{}'", definition.name),
        }),
    }
}

pub async fn scan_history_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<ScanHistoryResponse>>, ScanHttpError> {
    let definition = state.scan_control.lookup(&scan_id)?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let history = state
        .history
        .list(&definition.slug, Some(limit))
        .await
        .map_err(AppError::from)?;
    let count = history.len();
    Ok(Json(ApiResponse::success(ScanHistoryResponse {
        history,
        count,
    })))
}
