//! # nasdu-server
//!
//! HTTP API and command line front end for directory-size scans.
//!
//! Scans are defined in `nasdu.toml`, measured through the local-mount
//! backend and recorded in a JSON history file. Progress is served from the
//! in-process progress store under `/api/v1/scans/{scan_id}/progress`.

pub mod handlers;
pub mod infra;
pub mod routes;

pub use infra::app_state::AppState;
