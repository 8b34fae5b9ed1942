//! URL-friendly identifiers for configured scans.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

const FALLBACK_SLUG: &str = "scan";

/// Derive a slug from a human display name.
///
/// The name is NFKD-decomposed and every non-ASCII code point dropped, so
/// `ä` becomes `a` and `ß` disappears. Whitespace and underscores become
/// dashes, anything outside `[a-z0-9-]` is dropped and repeated dashes
/// collapse. An empty result falls back to `"scan"`.
pub fn generate_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.nfkd().filter(char::is_ascii) {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else if ch == '-' || ch == '_' || ch.is_whitespace() {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Make every slug unique by appending `-2`, `-3`, ... to repeats, keeping
/// the input order.
pub fn ensure_unique_slugs<I, S>(slugs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut result = Vec::new();

    for slug in slugs {
        let original = slug.into();
        let mut candidate = original.clone();
        let mut counter = 1;
        while seen.contains(&candidate) {
            counter += 1;
            candidate = format!("{original}-{counter}");
        }
        seen.insert(candidate.clone());
        result.push(candidate);
    }

    result
}
