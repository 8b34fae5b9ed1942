//! Remote path handling.
//!
//! Remote paths are opaque to this crate apart from slash normalization, so
//! that the same folder configured as `homes/alice/`, `/homes/alice` or
//! `//homes//alice` is tracked, weighted and persisted under one identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A slash-normalized path on the remote system.
///
/// Always starts with `/`, never ends with one (except the root itself) and
/// never contains empty segments. Casing is preserved because the remote
/// expects the path as configured.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct RemotePath(String);

impl RemotePath {
    pub fn new(raw: &str) -> Self {
        let segments: Vec<&str> = raw
            .trim()
            .split('/')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .collect();
        Self(format!("/{}", segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Whether any segment is `..`.
    pub fn escapes_upward(&self) -> bool {
        self.0.split('/').any(|segment| segment == "..")
    }

    /// Comparison key used to match live paths against persisted history.
    pub fn key(&self, folding: CaseFolding) -> PathKey {
        match folding {
            CaseFolding::Sensitive => PathKey(self.0.clone()),
            CaseFolding::Insensitive => PathKey(self.0.to_lowercase()),
        }
    }
}

impl From<String> for RemotePath {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for RemotePath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<RemotePath> for String {
    fn from(value: RemotePath) -> Self {
        value.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How path casing is treated when comparing against history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseFolding {
    #[default]
    Sensitive,
    Insensitive,
}

impl CaseFolding {
    pub fn from_insensitive(insensitive: bool) -> Self {
        if insensitive {
            CaseFolding::Insensitive
        } else {
            CaseFolding::Sensitive
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathKey(String);

impl PathKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
