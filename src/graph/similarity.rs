//! Name normalization and string similarity used by entity resolution and
//! anchor matching.
//!
//! Both ingestion and retrieval go through the same functions here, so a name
//! that resolves to an entity while building the graph resolves to the same
//! entity when it shows up in a query.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\p{L}\p{N}_]+").expect("token pattern is valid"));

/// Normalize a surface name: NFKC, trim, case-fold, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name.nfkc().collect::<String>().to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Levenshtein edit distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 - distance / longest`, in `[0, 1]`.
pub fn edit_ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Substring containment score: `0.5 + 0.5 * short / long` when the shorter
/// name (at least `min_chars` long) occurs inside the longer one, else 0.
pub fn containment(a: &str, b: &str, min_chars: usize) -> f64 {
    let (la, lb) = (a.chars().count(), b.chars().count());
    let (short, long, ls, ll) = if la <= lb { (a, b, la, lb) } else { (b, a, lb, la) };
    if ls == 0 || ls < min_chars || !long.contains(short) {
        return 0.0;
    }
    0.5 + 0.5 * ls as f64 / ll as f64
}

/// Similarity between two already-normalized names.
pub fn similarity(a: &str, b: &str, min_containment_chars: usize) -> f64 {
    if a == b {
        return 1.0;
    }
    edit_ratio(a, b).max(containment(a, b, min_containment_chars))
}

/// Split free text into normalized word tokens (punctuation dropped).
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize_name(text);
    TOKEN_RE
        .find_iter(&normalized)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Fraction of `query` tokens matched by some token in `item`.
///
/// A query token matches when it equals an item token, or starts with an item
/// token of at least two characters (`영희는` matches `영희`).
pub fn token_overlap(query: &BTreeSet<String>, item: &BTreeSet<String>) -> f64 {
    if query.is_empty() || item.is_empty() {
        return 0.0;
    }
    let matched = query
        .iter()
        .filter(|q| {
            item.contains(*q)
                || item
                    .iter()
                    .any(|t| t.chars().count() >= 2 && q.starts_with(t.as_str()))
        })
        .count();
    matched as f64 / query.len() as f64
}
