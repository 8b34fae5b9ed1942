//! Validation and expansion of `[[scans]]` entries into scan definitions.

use thiserror::Error;

use nasdu_core::ids::ScanSlug;
use nasdu_core::model::ScanDefinition;
use nasdu_core::paths::RemotePath;
use nasdu_core::slug::{ensure_unique_slugs, generate_slug};

use super::models::ConfigWarnings;
use super::sources::FileScanConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanEntryError {
    #[error("scan #{index} has an empty name")]
    EmptyName { index: usize },
    #[error("scan '{name}' needs at least one of 'shares' or 'paths'")]
    MissingTargets { name: String },
    #[error("scan '{name}': '{field}' must not be empty")]
    EmptyList { name: String, field: &'static str },
    #[error("scan '{name}': 'folders' can only be used together with 'shares'")]
    FoldersWithoutShares { name: String },
    #[error("scan '{name}': 'folders' requires exactly one share, found {count}")]
    FoldersNeedOneShare { name: String, count: usize },
    #[error("scan '{name}': slug '{slug}' may only contain a-z, 0-9 and '-'")]
    InvalidSlug { name: String, slug: String },
    #[error("scan '{name}': path '{path}' must not contain '..'")]
    ParentSegment { name: String, path: String },
}

/// Resolve the remote paths a scan entry measures.
///
/// Explicit paths come first, as given. Shares alone then become
/// `/<share>` and a single share with folders becomes `/<share>/<folder>`
/// per folder. Paths with a `..` segment are rejected.
pub fn expand_scan_paths(
    entry: &FileScanConfig,
) -> Result<Vec<RemotePath>, ScanEntryError> {
    let name = entry.name.clone();

    if entry.shares.is_none() && entry.paths.is_none() {
        return Err(ScanEntryError::MissingTargets { name });
    }
    if entry.shares.as_ref().is_some_and(|s| s.is_empty()) {
        return Err(ScanEntryError::EmptyList {
            name,
            field: "shares",
        });
    }
    if entry.paths.as_ref().is_some_and(|p| p.is_empty()) {
        return Err(ScanEntryError::EmptyList {
            name,
            field: "paths",
        });
    }

    let mut expanded: Vec<RemotePath> = entry
        .paths
        .iter()
        .flatten()
        .map(|path| RemotePath::new(path))
        .collect();

    match (&entry.shares, &entry.folders) {
        (None, Some(_)) => {
            return Err(ScanEntryError::FoldersWithoutShares { name });
        }
        (Some(_), Some(folders)) if folders.is_empty() => {
            return Err(ScanEntryError::EmptyList {
                name,
                field: "folders",
            });
        }
        (Some(shares), Some(folders)) => {
            let [share] = shares.as_slice() else {
                return Err(ScanEntryError::FoldersNeedOneShare {
                    name,
                    count: shares.len(),
                });
            };
            let share = share.trim_matches('/');
            expanded.extend(folders.iter().map(|folder| {
                RemotePath::new(&format!("{share}/{}", folder.trim_matches('/')))
            }));
        }
        (Some(shares), None) => {
            expanded.extend(shares.iter().map(|share| RemotePath::new(share)));
        }
        (None, None) => {}
    }

    if let Some(path) = expanded.iter().find(|path| path.escapes_upward()) {
        return Err(ScanEntryError::ParentSegment {
            name,
            path: path.to_string(),
        });
    }

    Ok(expanded)
}

/// Turn file entries into definitions with unique slugs, in file order.
///
/// Missing slugs are generated from the name; repeats get `-2`, `-3`, ...
/// appended and produce a warning.
pub fn build_definitions(
    entries: Vec<FileScanConfig>,
    warnings: &mut ConfigWarnings,
) -> Result<Vec<ScanDefinition>, ScanEntryError> {
    let mut requested = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let name = entry.name.trim();
        if name.is_empty() {
            return Err(ScanEntryError::EmptyName { index });
        }
        let slug = match entry.slug.as_deref().map(str::trim) {
            Some(explicit) => {
                ScanSlug::parse(explicit).map_err(|_| ScanEntryError::InvalidSlug {
                    name: name.to_string(),
                    slug: explicit.to_string(),
                })?;
                explicit.to_string()
            }
            None => generate_slug(name),
        };
        requested.push(slug);
    }

    let unique = ensure_unique_slugs(requested.iter().cloned());

    let mut definitions = Vec::with_capacity(entries.len());
    for ((entry, wanted), slug) in entries.into_iter().zip(requested).zip(unique) {
        let paths = expand_scan_paths(&entry)?;
        if wanted != slug {
            warnings.push_with_hint(
                format!("scan '{}' slug '{wanted}' is taken; using '{slug}'", entry.name),
                "Set an explicit `slug` on one of the scans to keep URLs stable",
            );
        }
        let slug = ScanSlug::parse(&slug).map_err(|_| ScanEntryError::InvalidSlug {
            name: entry.name.clone(),
            slug: slug.clone(),
        })?;

        let mut definition = ScanDefinition::new(entry.name.trim(), paths)
            .with_slug(slug)
            .with_mode(entry.mode.unwrap_or_default());
        definition.enabled = entry.enabled.unwrap_or(true);
        definitions.push(definition);
    }

    Ok(definitions)
}
