use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScanError};
use crate::slug::generate_slug;

const MAX_SCAN_ID_LEN: usize = 256;

/// Canonical identifier of a configured scan.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanSlug(String);

impl ScanSlug {
    /// Accept an already-slugified identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SCAN_ID_LEN
            && raw
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(ScanError::MalformedScanId(raw.to_string()))
        }
    }

    pub fn from_name(name: &str) -> Self {
        Self(generate_slug(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScanSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A caller-supplied scan reference: either a slug or a legacy display name.
///
/// Parsing only rejects input that can never name a scan; resolution against
/// the catalog or the progress store happens later.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ScanKey(String);

impl ScanKey {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > MAX_SCAN_ID_LEN
            || trimmed.chars().any(char::is_control)
        {
            return Err(ScanError::MalformedScanId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The slug this key would be if it is one.
    pub fn as_slug(&self) -> Option<ScanSlug> {
        ScanSlug::parse(&self.0).ok()
    }
}

impl fmt::Display for ScanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one execution of a scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
