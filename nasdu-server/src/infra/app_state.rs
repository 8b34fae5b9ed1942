use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

use nasdu_core::history::HistoryStore;
use nasdu_core::progress::ProgressReader;

use crate::infra::config::Config;
use crate::infra::scan::ScanControlPlane;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scan_control: Arc<ScanControlPlane>,
    pub progress: ProgressReader,
    pub history: Arc<dyn HistoryStore>,
    pub started_at: DateTime<Utc>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("scan_control", &self.scan_control)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn config(&self) -> &Config {
        &self.config
    }
}
