use axum::{
    Router,
    routing::{delete, get, post},
};

use crate::handlers::{
    handle_health::health_handler,
    history::handle_history::{delete_history_handler, history_stats_handler},
    scan::handle_scan::{
        cancel_scan_handler, list_scans_handler, scan_history_handler,
        scan_progress_handler, scan_results_handler, trigger_scan_handler,
    },
};
use crate::infra::app_state::AppState;

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .merge(create_scan_routes())
        .merge(create_history_routes())
}

fn create_scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scans", get(list_scans_handler))
        .route("/scans/{scan_id}/progress", get(scan_progress_handler))
        .route("/scans/{scan_id}/trigger", post(trigger_scan_handler))
        .route("/scans/{scan_id}/cancel", post(cancel_scan_handler))
        .route("/scans/{scan_id}/results", get(scan_results_handler))
        .route("/scans/{scan_id}/history", get(scan_history_handler))
}

fn create_history_routes() -> Router<AppState> {
    Router::new()
        .route("/history", delete(delete_history_handler))
        .route("/history/stats", get(history_stats_handler))
}
