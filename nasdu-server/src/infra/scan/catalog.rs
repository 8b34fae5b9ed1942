use std::collections::HashMap;

use nasdu_core::ids::{ScanKey, ScanSlug};
use nasdu_core::model::ScanDefinition;
use nasdu_core::progress::ProgressStore;

/// Configured scans, addressable by slug or by display name.
#[derive(Debug, Clone, Default)]
pub struct ScanCatalog {
    definitions: Vec<ScanDefinition>,
    by_slug: HashMap<ScanSlug, usize>,
    by_name: HashMap<String, ScanSlug>,
}

impl ScanCatalog {
    pub fn new(definitions: Vec<ScanDefinition>) -> Self {
        let mut by_slug = HashMap::with_capacity(definitions.len());
        let mut by_name = HashMap::with_capacity(definitions.len());
        for (index, definition) in definitions.iter().enumerate() {
            by_slug.insert(definition.slug.clone(), index);
            by_name
                .entry(definition.name.clone())
                .or_insert_with(|| definition.slug.clone());
        }
        Self {
            definitions,
            by_slug,
            by_name,
        }
    }

    pub fn get(&self, slug: &ScanSlug) -> Option<&ScanDefinition> {
        self.by_slug.get(slug).map(|&index| &self.definitions[index])
    }

    /// Slug match wins over a display-name match.
    pub fn resolve(&self, key: &ScanKey) -> Option<&ScanDefinition> {
        key.as_slug()
            .and_then(|slug| self.get(&slug))
            .or_else(|| {
                self.by_name
                    .get(key.as_str())
                    .and_then(|slug| self.get(slug))
            })
    }

    pub fn definitions(&self) -> &[ScanDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Let pollers find progress by display name before the first run.
    pub fn register_aliases(&self, store: &ProgressStore) {
        for definition in &self.definitions {
            store.register_alias(&definition.name, &definition.slug);
        }
    }
}
