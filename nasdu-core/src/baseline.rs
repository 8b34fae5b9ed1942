use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::history::HistoryStore;
use crate::ids::ScanSlug;
use crate::paths::{CaseFolding, PathKey, RemotePath};

/// Historical byte sizes used to weight live progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Baseline {
    /// Every requested path has a prior size.
    Complete(HashMap<PathKey, u64>),
    /// Some paths have no usable history; percentages are withheld.
    Incomplete {
        known: HashMap<PathKey, u64>,
        missing: Vec<RemotePath>,
    },
    /// No history at all, the normal state for a first run.
    Empty,
}

impl Baseline {
    pub fn is_complete(&self) -> bool {
        matches!(self, Baseline::Complete(_))
    }

    /// Summed baseline for `keys`, only when the baseline is complete.
    pub fn total_for<'a>(&self, keys: impl IntoIterator<Item = &'a PathKey>) -> Option<u64> {
        let Baseline::Complete(sizes) = self else {
            return None;
        };
        keys.into_iter()
            .map(|key| sizes.get(key).copied())
            .try_fold(0u64, |acc, size| size.map(|s| acc.saturating_add(s)))
    }

    pub fn size_of(&self, key: &PathKey) -> Option<u64> {
        match self {
            Baseline::Complete(sizes) => sizes.get(key).copied(),
            Baseline::Incomplete { known, .. } => known.get(key).copied(),
            Baseline::Empty => None,
        }
    }

    fn classify(paths: &[RemotePath], sizes: HashMap<PathKey, u64>, folding: CaseFolding) -> Self {
        if sizes.is_empty() {
            return Baseline::Empty;
        }
        let missing: Vec<RemotePath> = paths
            .iter()
            .filter(|path| !sizes.contains_key(&path.key(folding)))
            .cloned()
            .collect();
        if missing.is_empty() {
            Baseline::Complete(sizes)
        } else {
            Baseline::Incomplete {
                known: sizes,
                missing,
            }
        }
    }
}

/// Looks up the sizes a scan measured on its last completed run.
#[derive(Clone)]
pub struct BaselineResolver {
    history: Arc<dyn HistoryStore>,
    folding: CaseFolding,
}

impl BaselineResolver {
    pub fn new(history: Arc<dyn HistoryStore>, folding: CaseFolding) -> Self {
        Self { history, folding }
    }

    pub fn folding(&self) -> CaseFolding {
        self.folding
    }

    /// History failures degrade to [`Baseline::Empty`]; a missing weight
    /// only costs the percentage, never the scan.
    pub async fn resolve(&self, slug: &ScanSlug, paths: &[RemotePath]) -> Baseline {
        if paths.is_empty() {
            return Baseline::Empty;
        }
        match self.history.completed_sizes(slug, paths, self.folding).await {
            Ok(sizes) => Baseline::classify(paths, sizes, self.folding),
            Err(error) => {
                warn!(%error, paths = paths.len(), "baseline lookup failed; percentages disabled");
                Baseline::Empty
            }
        }
    }
}

impl std::fmt::Debug for BaselineResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaselineResolver")
            .field("folding", &self.folding)
            .finish_non_exhaustive()
    }
}
