//! Scan definitions, lifecycle and persisted results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{RunId, ScanSlug};
use crate::paths::RemotePath;

/// Directory/file/byte counts reported for one path or summed over many.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizeCounts {
    pub num_dir: u64,
    pub num_file: u64,
    pub total_size: u64,
}

impl SizeCounts {
    pub const ZERO: SizeCounts = SizeCounts {
        num_dir: 0,
        num_file: 0,
        total_size: 0,
    };

    pub fn new(num_dir: u64, num_file: u64, total_size: u64) -> Self {
        Self {
            num_dir,
            num_file,
            total_size,
        }
    }

    /// Component-wise maximum; used to keep live counts from regressing.
    pub fn max(self, other: SizeCounts) -> SizeCounts {
        SizeCounts {
            num_dir: self.num_dir.max(other.num_dir),
            num_file: self.num_file.max(other.num_file),
            total_size: self.total_size.max(other.total_size),
        }
    }

    pub fn saturating_add(self, other: SizeCounts) -> SizeCounts {
        SizeCounts {
            num_dir: self.num_dir.saturating_add(other.num_dir),
            num_file: self.num_file.saturating_add(other.num_file),
            total_size: self.total_size.saturating_add(other.total_size),
        }
    }

    /// True when any component grew compared to `previous`.
    pub fn grew_since(&self, previous: &SizeCounts) -> bool {
        self.num_dir > previous.num_dir
            || self.num_file > previous.num_file
            || self.total_size > previous.total_size
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanLifecycleStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ScanLifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanLifecycleStatus::Pending => "pending",
            ScanLifecycleStatus::Running => "running",
            ScanLifecycleStatus::Completed => "completed",
            ScanLifecycleStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// How the runner walks the configured paths.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    Parallel,
    Sequential,
}

/// A configured scan: identity plus the paths it measures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanDefinition {
    pub slug: ScanSlug,
    pub name: String,
    pub paths: Vec<RemotePath>,
    #[serde(default)]
    pub mode: ScanMode,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ScanDefinition {
    pub fn new(
        name: impl Into<String>,
        paths: impl IntoIterator<Item = RemotePath>,
    ) -> Self {
        let name = name.into();
        Self {
            slug: ScanSlug::from_name(&name),
            name,
            paths: paths.into_iter().collect(),
            mode: ScanMode::default(),
            enabled: true,
        }
    }

    pub fn with_slug(mut self, slug: ScanSlug) -> Self {
        self.slug = slug;
        self
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One execution of a scan, created when it is triggered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanInvocation {
    pub run_id: RunId,
    pub slug: ScanSlug,
    pub name: String,
    pub paths: Vec<RemotePath>,
    pub mode: ScanMode,
}

impl ScanInvocation {
    pub fn from_definition(definition: &ScanDefinition) -> Self {
        Self {
            run_id: RunId::new(),
            slug: definition.slug.clone(),
            name: definition.name.clone(),
            paths: definition.paths.clone(),
            mode: definition.mode,
        }
    }
}

/// Human readable size, 1024-based.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TotalSize {
    pub bytes: u64,
    pub formatted: f64,
    pub unit: String,
}

impl TotalSize {
    const UNITS: [&'static str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    pub fn from_bytes(bytes: u64) -> Self {
        let mut value = bytes as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < Self::UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        Self {
            bytes,
            formatted: (value * 100.0).round() / 100.0,
            unit: Self::UNITS[unit].to_string(),
        }
    }
}

/// Final state of one path within a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathOutcome {
    pub path: RemotePath,
    pub success: bool,
    pub num_dir: u64,
    pub num_file: u64,
    pub total_size: TotalSize,
    pub elapsed_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PathOutcome {
    pub fn succeeded(path: RemotePath, counts: SizeCounts, elapsed_ms: u64) -> Self {
        Self {
            path,
            success: true,
            num_dir: counts.num_dir,
            num_file: counts.num_file,
            total_size: TotalSize::from_bytes(counts.total_size),
            elapsed_time_ms: elapsed_ms,
            error: None,
        }
    }

    /// A failed path keeps whatever counts were observed before the failure.
    pub fn failed(
        path: RemotePath,
        partial: SizeCounts,
        elapsed_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            path,
            success: false,
            num_dir: partial.num_dir,
            num_file: partial.num_file,
            total_size: TotalSize::from_bytes(partial.total_size),
            elapsed_time_ms: elapsed_ms,
            error: Some(error.into()),
        }
    }

    pub fn counts(&self) -> SizeCounts {
        SizeCounts::new(self.num_dir, self.num_file, self.total_size.bytes)
    }
}

/// The persisted record of one finished run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub run_id: RunId,
    pub scan_slug: ScanSlug,
    pub scan_name: String,
    pub started_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub status: ScanLifecycleStatus,
    pub results: Vec<PathOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanResult {
    pub fn totals(&self) -> SizeCounts {
        self.results
            .iter()
            .fold(SizeCounts::ZERO, |acc, item| acc.saturating_add(item.counts()))
    }

    pub fn failed_paths(&self) -> impl Iterator<Item = &PathOutcome> {
        self.results.iter().filter(|item| !item.success)
    }
}
