//! Similarity Scorer
//!
//! Multiset overlap between two fingerprints:
//! `score = Σ min(a[k], b[k]) / max(Σa, Σb)`, zero when both are empty.
//! Symmetric and pure.

use super::fingerprint::Fingerprint;
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of comparing two fingerprints
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Similarity {
    pub score: f64,
    pub matched_qty: u64,
    pub total_qty: u64,
}

impl Similarity {
    fn from_counts(matched_qty: u64, total_qty: u64) -> Self {
        let score = if total_qty == 0 {
            0.0
        } else {
            matched_qty as f64 / total_qty as f64
        };
        Self {
            score,
            matched_qty,
            total_qty,
        }
    }
}

/// Compare on `(part, color)` keys
pub fn compare(a: &Fingerprint, b: &Fingerprint) -> Similarity {
    // Iterating one side is enough: keys missing from either side add min(x, 0) = 0
    let matched_qty: u64 = a
        .iter()
        .map(|((part_id, color_id), &qty)| u64::from(qty.min(b.get(part_id, color_id))))
        .sum();
    Similarity::from_counts(matched_qty, a.total().max(b.total()))
}

/// Compare with color ignored
///
/// Secondary signal for borderline scores: the right parts in the wrong
/// colors usually means a recolored print run rather than a different figure.
pub fn compare_parts_only(a: &Fingerprint, b: &Fingerprint) -> Similarity {
    let a_parts = a.parts_only();
    let b_parts = b.parts_only();
    Similarity::from_counts(overlap(&a_parts, &b_parts), sum(&a_parts).max(sum(&b_parts)))
}

fn overlap(a: &BTreeMap<String, u64>, b: &BTreeMap<String, u64>) -> u64 {
    a.iter()
        .map(|(key, &qty)| qty.min(b.get(key).copied().unwrap_or(0)))
        .sum()
}

fn sum(counts: &BTreeMap<String, u64>) -> u64 {
    counts.values().sum()
}
