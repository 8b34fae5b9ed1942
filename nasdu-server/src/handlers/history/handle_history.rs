use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::{Duration, Utc};

use nasdu_core::api_types::{
    ApiResponse, DeleteHistoryQuery, DeleteHistoryResponse, HistoryStatsResponse,
};
use nasdu_core::history::HistoryFilter;
use nasdu_core::ids::ScanSlug;
use nasdu_core::paths::RemotePath;
use tracing::info;

use crate::infra::app_state::AppState;
use crate::infra::errors::{AppError, AppResult};

/// Delete stored results. With `path` only matching per-path items go;
/// without it whole results go. At least one filter is required.
pub async fn delete_history_handler(
    State(state): State<AppState>,
    Query(query): Query<DeleteHistoryQuery>,
) -> AppResult<Json<ApiResponse<DeleteHistoryResponse>>> {
    let filter = filter_from_query(&state, &query)?;
    if filter.is_unbounded() {
        return Err(AppError::bad_request(
            "at least one of scan, path or older_than_days is required",
        ));
    }

    let deleted = state.history.delete(&filter).await?;
    info!(
        scan = ?filter.scan_slug,
        path = ?filter.path,
        older_than = ?filter.older_than,
        deleted,
        "history entries deleted"
    );
    Ok(Json(
        ApiResponse::success(DeleteHistoryResponse { deleted })
            .with_message(format!("{deleted} entries deleted")),
    ))
}

pub async fn history_stats_handler(
    State(state): State<AppState>,
) -> AppResult<Json<ApiResponse<HistoryStatsResponse>>> {
    let stats = state.history.stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// Results of scans that are no longer configured stay addressable by
/// their slug.
fn filter_from_query(
    state: &AppState,
    query: &DeleteHistoryQuery,
) -> AppResult<HistoryFilter> {
    let scan_slug = match query.scan.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(match state.scan_control.lookup(raw) {
            Ok(definition) => definition.slug,
            Err(_) => ScanSlug::parse(raw)?,
        }),
    };
    let path = query
        .path
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(RemotePath::new);
    let older_than = query
        .older_than_days
        .map(|days| Utc::now() - Duration::days(i64::from(days)));

    Ok(HistoryFilter {
        scan_slug,
        path,
        older_than,
    })
}
