//! Name similarity used by the fuzzy pass.
//!
//! score = TOKEN_WEIGHT × Jaccard(word tokens) + EDIT_WEIGHT × normalized
//! Levenshtein similarity of the normalized names. Both terms lie in [0, 1],
//! so the score does too.

use std::collections::BTreeSet;

pub const TOKEN_WEIGHT: f64 = 0.6;
pub const EDIT_WEIGHT: f64 = 0.4;

/// Lower-cased alphanumeric word tokens, in order of appearance.
fn tokens(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Key normalisation for SKU/model comparison: trimmed, case-folded.
///
/// Returns `None` for blank keys, which never match anything.
pub fn normalize_key(key: Option<&str>) -> Option<String> {
    let key = key?.trim();
    (!key.is_empty()).then(|| key.to_lowercase())
}

pub fn name_similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let sa: BTreeSet<&str> = ta.iter().map(String::as_str).collect();
    let sb: BTreeSet<&str> = tb.iter().map(String::as_str).collect();
    let intersection = sa.intersection(&sb).count() as f64;
    let union = sa.union(&sb).count() as f64;
    let jaccard = intersection / union;

    let edit = strsim::normalized_levenshtein(&ta.join(" "), &tb.join(" "));

    TOKEN_WEIGHT * jaccard + EDIT_WEIGHT * edit
}
