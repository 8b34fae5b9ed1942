use std::path::PathBuf;

use nasdu_core::config::{ProgressConfig, RunnerConfig};
use nasdu_core::ids::ScanSlug;
use nasdu_core::model::ScanDefinition;
use nasdu_core::paths::CaseFolding;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_HISTORY_PATH: &str = "data/history.json";

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub mount: MountConfig,
    pub runner: RunnerConfig,
    pub progress: ProgressConfig,
    pub scans: Vec<ScanDefinition>,
    pub metadata: ConfigMetadata,
}

impl Config {
    pub fn scan(&self, slug: &ScanSlug) -> Option<&ScanDefinition> {
        self.scans.iter().find(|scan| &scan.slug == slug)
    }

    pub fn case_folding(&self) -> CaseFolding {
        CaseFolding::from_insensitive(self.progress.case_insensitive_paths)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub history_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
        }
    }
}

/// Local directory under which share paths are resolved by the
/// local-mount backend. `None` measures paths as absolute host paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountConfig {
    pub root: Option<PathBuf>,
}

/// Where the configuration came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
