//! Types shared by the HTTP API and its clients.

use serde::{Deserialize, Serialize};

use crate::history::HistoryStats;
use crate::ids::{RunId, ScanSlug};
use crate::model::{ScanDefinition, ScanMode};
use crate::paths::RemotePath;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(error),
            message: None,
        }
    }

    pub fn with_message(mut self, message: String) -> Self {
        self.message = Some(message);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

// ===== Scans =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub slug: ScanSlug,
    pub name: String,
    pub paths: Vec<RemotePath>,
    pub mode: ScanMode,
    pub enabled: bool,
    pub running: bool,
}

impl ScanSummary {
    pub fn from_definition(definition: &ScanDefinition, running: bool) -> Self {
        Self {
            slug: definition.slug.clone(),
            name: definition.name.clone(),
            paths: definition.paths.clone(),
            mode: definition.mode,
            enabled: definition.enabled,
            running,
        }
    }
}

/// Acknowledgement for a trigger request. The scan itself runs
/// asynchronously; `triggered` is false when a run was already active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerAck {
    pub scan_name: String,
    pub scan_slug: ScanSlug,
    pub triggered: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    pub scan_slug: ScanSlug,
    pub run_id: RunId,
}

// ===== History =====

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteHistoryQuery {
    pub scan: Option<String>,
    pub path: Option<String>,
    pub older_than_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteHistoryResponse {
    pub deleted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_scans: usize,
    pub configured_scans: usize,
}

pub type HistoryStatsResponse = HistoryStats;
