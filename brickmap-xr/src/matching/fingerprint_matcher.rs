//! Tier-2 Fingerprint Matcher
//!
//! Runs after elimination converges. Each still-unmapped primary minifigure is
//! fingerprinted in the secondary namespace and scored against the unmapped
//! secondary figures it shares a container with (including the base variant
//! of each container). The best candidate is classified by [`ConfidenceTiers`].

use super::fingerprint::{Fingerprint, PartNormalizer};
use super::similarity::{compare, compare_parts_only};
use super::{variant_base, CoOccurrenceIndex, CompositionIndex, MatchState};
use crate::config::ConfidenceTiers;
use crate::types::{Catalog, CompositionLine, ItemKind, MappingRecord, MatchMethod};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Part and color cross-reference tables (primary id → secondary id)
#[derive(Debug, Clone, Default)]
pub struct TranslationTables {
    part_xref: HashMap<String, String>,
    color_xref: HashMap<String, String>,
}

impl TranslationTables {
    pub fn new(part_xref: HashMap<String, String>, color_xref: HashMap<String, String>) -> Self {
        Self {
            part_xref,
            color_xref,
        }
    }

    pub fn secondary_part(&self, primary_part_id: &str) -> Option<&str> {
        self.part_xref.get(primary_part_id).map(String::as_str)
    }

    pub fn secondary_color(&self, primary_color_id: &str) -> Option<&str> {
        self.color_xref.get(primary_color_id).map(String::as_str)
    }

    pub fn part_count(&self) -> usize {
        self.part_xref.len()
    }

    pub fn color_count(&self) -> usize {
        self.color_xref.len()
    }
}

/// Map a fingerprint score to a confidence and method
///
/// `parts_only` is only evaluated for scores in the fuzzy band.
pub fn classify(
    tiers: &ConfidenceTiers,
    score: f64,
    parts_only: impl FnOnce() -> f64,
) -> Option<(f64, MatchMethod)> {
    if score >= tiers.exact_threshold {
        Some((tiers.exact_confidence, MatchMethod::Exact))
    } else if score >= tiers.overlap_threshold {
        let confidence =
            tiers.overlap_threshold + (score - tiers.overlap_threshold) * tiers.overlap_slope;
        Some((confidence, MatchMethod::Overlap))
    } else if score >= tiers.fuzzy_threshold {
        if parts_only() >= tiers.parts_only_threshold {
            let confidence =
                tiers.fuzzy_threshold + (score - tiers.fuzzy_threshold) * tiers.fuzzy_slope;
            Some((confidence, MatchMethod::Fuzzy))
        } else {
            None
        }
    } else {
        None
    }
}

/// Output of one Tier-2 run
#[derive(Debug, Clone)]
pub struct FingerprintMatchResult {
    pub state: MatchState,
    pub records: Vec<MappingRecord>,
    /// Primary figures whose translated fingerprint was empty
    pub skipped_no_fingerprint: usize,
    /// Primary figures with no qualifying candidate
    pub unmatched: usize,
}

impl FingerprintMatchResult {
    pub fn count(&self, method: MatchMethod) -> usize {
        self.records.iter().filter(|r| r.method == method).count()
    }
}

pub struct FingerprintMatcher {
    tiers: ConfidenceTiers,
    primary: PartNormalizer,
    secondary: PartNormalizer,
}

impl FingerprintMatcher {
    pub fn new(tiers: ConfidenceTiers, primary: PartNormalizer, secondary: PartNormalizer) -> Self {
        Self {
            tiers,
            primary,
            secondary,
        }
    }

    /// Fingerprint of a primary composition expressed in the secondary namespace
    ///
    /// Parts without a cross-reference keep their (normalized) primary id.
    /// Lines whose color has no cross-reference are dropped.
    pub fn translated_fingerprint(
        &self,
        lines: &[CompositionLine],
        tables: &TranslationTables,
    ) -> Fingerprint {
        let mut fingerprint = Fingerprint::default();
        for line in lines {
            if line.kind != ItemKind::Part {
                continue;
            }
            let Some(color_id) = line.color_id.as_deref() else {
                continue;
            };
            let Some(secondary_color) = tables.secondary_color(color_id) else {
                continue;
            };

            let normalized = self.primary.normalize(&line.item_id);
            let part_id = tables
                .secondary_part(&line.item_id)
                .or_else(|| tables.secondary_part(normalized))
                .unwrap_or(normalized);

            fingerprint.add(self.secondary.normalize(part_id), secondary_color, line.quantity);
        }
        fingerprint
    }

    /// Fingerprint of a composition already in the secondary namespace
    pub fn secondary_fingerprint(&self, lines: &[CompositionLine]) -> Fingerprint {
        Fingerprint::from_lines(lines, &self.secondary)
    }

    /// Unmatched secondary figures sharing a container (or its base variant)
    pub fn candidates(
        &self,
        primary_id: &str,
        index: &CoOccurrenceIndex,
        state: &MatchState,
    ) -> BTreeSet<String> {
        let mut candidates = BTreeSet::new();
        for container_id in index.containers_of_primary(primary_id) {
            let fallback = variant_base(container_id);
            let containers = std::iter::once(container_id.as_str()).chain(fallback.as_deref());
            for container in containers {
                let Some(members) = index.members(container) else {
                    continue;
                };
                candidates.extend(
                    members
                        .secondary
                        .iter()
                        .filter(|id| !state.is_secondary_matched(id))
                        .cloned(),
                );
            }
        }
        candidates
    }

    /// Score every unmapped primary figure in sorted id order
    pub fn run(
        &self,
        index: &CoOccurrenceIndex,
        compositions: &CompositionIndex,
        tables: &TranslationTables,
        mut state: MatchState,
    ) -> FingerprintMatchResult {
        let mut records = Vec::new();
        let mut skipped_no_fingerprint = 0;
        let mut unmatched = 0;
        let mut secondary_fingerprints: HashMap<String, Fingerprint> = HashMap::new();

        let pending: Vec<String> = index
            .primary_entities()
            .filter(|id| !state.is_primary_matched(id))
            .cloned()
            .collect();

        for primary_id in pending {
            let fingerprint =
                self.translated_fingerprint(compositions.lines(Catalog::Primary, &primary_id), tables);
            if fingerprint.is_empty() {
                debug!(primary_id = %primary_id, "No fingerprint, skipping");
                skipped_no_fingerprint += 1;
                continue;
            }

            let mut best: Option<(String, f64)> = None;
            for candidate in self.candidates(&primary_id, index, &state) {
                let candidate_fp = secondary_fingerprints
                    .entry(candidate.clone())
                    .or_insert_with(|| {
                        self.secondary_fingerprint(compositions.lines(Catalog::Secondary, &candidate))
                    });
                let score = compare(&fingerprint, candidate_fp).score;
                // Strictly greater keeps the lowest id on ties
                if best.as_ref().map_or(true, |(_, best_score)| score > *best_score) {
                    best = Some((candidate, score));
                }
            }

            let Some((secondary_id, score)) = best else {
                debug!(primary_id = %primary_id, "No candidates");
                unmatched += 1;
                continue;
            };

            let classified = classify(&self.tiers, score, || {
                secondary_fingerprints
                    .get(&secondary_id)
                    .map(|candidate_fp| compare_parts_only(&fingerprint, candidate_fp).score)
                    .unwrap_or(0.0)
            });

            match classified {
                Some((confidence, method)) => {
                    let record =
                        MappingRecord::new(primary_id.as_str(), secondary_id.as_str(), confidence, method);
                    debug!(
                        primary_id = %record.primary_id,
                        secondary_id = %record.secondary_id,
                        score,
                        confidence = record.confidence,
                        method = %record.method,
                        "Fingerprint match"
                    );
                    state.record(&record);
                    records.push(record);
                }
                None => {
                    debug!(
                        primary_id = %primary_id,
                        best_candidate = %secondary_id,
                        score,
                        "Best candidate below thresholds"
                    );
                    unmatched += 1;
                }
            }
        }

        FingerprintMatchResult {
            state,
            records,
            skipped_no_fingerprint,
            unmatched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers() -> ConfidenceTiers {
        ConfidenceTiers::default()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn identity_tables(parts: &[&str], colors: &[&str]) -> TranslationTables {
        TranslationTables::new(
            parts.iter().map(|p| (p.to_string(), p.to_string())).collect(),
            colors.iter().map(|c| (c.to_string(), c.to_string())).collect(),
        )
    }

    fn matcher() -> FingerprintMatcher {
        FingerprintMatcher::new(tiers(), PartNormalizer::identity(), PartNormalizer::identity())
    }

    #[test]
    fn test_classify_exact_boundary() {
        let (confidence, method) = classify(&tiers(), 0.95, || 0.0).unwrap();
        assert_eq!(method, MatchMethod::Exact);
        assert!(approx(confidence, 0.95));
        let (confidence, _) = classify(&tiers(), 1.0, || 0.0).unwrap();
        assert!(approx(confidence, 0.95));
    }

    #[test]
    fn test_classify_overlap_band() {
        let (confidence, method) = classify(&tiers(), 0.8, || 0.0).unwrap();
        assert_eq!(method, MatchMethod::Overlap);
        assert!(approx(confidence, 0.8));

        let (confidence, method) = classify(&tiers(), 0.9, || 0.0).unwrap();
        assert_eq!(method, MatchMethod::Overlap);
        assert!(approx(confidence, 0.875));
    }

    #[test]
    fn test_classify_fuzzy_requires_parts_only() {
        let (confidence, method) = classify(&tiers(), 0.76, || 0.9).unwrap();
        assert_eq!(method, MatchMethod::Fuzzy);
        assert!(approx(confidence, 0.73));
        assert!(classify(&tiers(), 0.76, || 0.74).is_none());
    }

    #[test]
    fn test_classify_below_fuzzy_never_matches() {
        assert!(classify(&tiers(), 0.69, || 0.5).is_none());
        assert!(classify(&tiers(), 0.69, || 1.0).is_none());
        assert!(classify(&tiers(), 0.0, || 1.0).is_none());
    }

    #[test]
    fn test_parts_only_not_evaluated_outside_fuzzy_band() {
        let mut called = false;
        classify(&tiers(), 0.96, || {
            called = true;
            1.0
        });
        assert!(!called);
    }

    #[test]
    fn test_translation_drops_untranslated_colors() {
        let tables = TranslationTables::new(
            HashMap::from([("973pr1".to_string(), "973pb01".to_string())]),
            HashMap::from([("1".to_string(), "11".to_string())]),
        );
        let lines = vec![
            CompositionLine::part("973pr1", "1", 1),
            CompositionLine::part("3626", "1", 1),
            CompositionLine::part("3626", "999", 1),
        ];
        let fingerprint = matcher().translated_fingerprint(&lines, &tables);
        assert_eq!(fingerprint.get("973pb01", "11"), 1);
        assert_eq!(fingerprint.get("3626", "11"), 1);
        assert_eq!(fingerprint.len(), 2);
    }

    #[test]
    fn test_translation_applies_both_normalizers() {
        let primary = PartNormalizer::from_config(&crate::config::NamespaceNormalization {
            families: vec![crate::config::PartFamily {
                canonical: "970c00".to_string(),
                members: vec!["73200".to_string()],
            }],
        });
        let secondary = PartNormalizer::from_config(&crate::config::NamespaceNormalization {
            families: vec![crate::config::PartFamily {
                canonical: "970c00".to_string(),
                members: vec!["970d00".to_string()],
            }],
        });
        let matcher = FingerprintMatcher::new(tiers(), primary, secondary);
        let tables = TranslationTables::new(
            HashMap::from([("970c00".to_string(), "970d00".to_string())]),
            HashMap::from([("1".to_string(), "11".to_string())]),
        );
        let lines = vec![CompositionLine::part("73200", "1", 1)];
        let fingerprint = matcher.translated_fingerprint(&lines, &tables);
        assert_eq!(fingerprint.get("970c00", "11"), 1);
    }

    #[test]
    fn test_end_to_end_two_figures_in_one_container() {
        let mut index = CoOccurrenceIndex::new();
        for (catalog, id) in [
            (Catalog::Primary, "f1"),
            (Catalog::Primary, "f2"),
            (Catalog::Secondary, "m1"),
            (Catalog::Secondary, "m2"),
        ] {
            index.insert("S1", catalog, id);
        }

        let mut compositions = CompositionIndex::new();
        for (part, qty) in [("3626", 1), ("973", 1), ("970c00", 1)] {
            compositions.insert(Catalog::Primary, "f1", CompositionLine::part(part, "1", qty));
            compositions.insert(Catalog::Secondary, "m1", CompositionLine::part(part, "1", qty));
        }
        for (part, qty) in [("3626", 1), ("973", 1), ("970c00", 1)] {
            compositions.insert(Catalog::Primary, "f2", CompositionLine::part(part, "5", qty));
            compositions.insert(Catalog::Secondary, "m2", CompositionLine::part(part, "5", qty));
        }
        let tables = identity_tables(&[], &["1", "5"]);

        let result = matcher().run(&index, &compositions, &tables, MatchState::default());
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].primary_id, "f1");
        assert_eq!(result.records[0].secondary_id, "m1");
        assert!(approx(result.records[0].confidence, 0.95));
        assert_eq!(result.records[0].method, MatchMethod::Exact);
        assert_eq!(result.records[1].primary_id, "f2");
        assert_eq!(result.records[1].secondary_id, "m2");
        assert_eq!(result.unmatched, 0);
    }

    #[test]
    fn test_matched_candidate_leaves_pool_immediately() {
        let mut index = CoOccurrenceIndex::new();
        index.insert("S1", Catalog::Primary, "f1");
        index.insert("S1", Catalog::Primary, "f2");
        index.insert("S1", Catalog::Secondary, "m1");

        let mut compositions = CompositionIndex::new();
        for id in ["f1", "f2"] {
            compositions.insert(Catalog::Primary, id, CompositionLine::part("3626", "1", 1));
        }
        compositions.insert(Catalog::Secondary, "m1", CompositionLine::part("3626", "1", 1));

        let result =
            matcher().run(&index, &compositions, &identity_tables(&[], &["1"]), MatchState::default());
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].primary_id, "f1");
        assert_eq!(result.unmatched, 1);
    }

    #[test]
    fn test_variant_base_candidates() {
        let mut index = CoOccurrenceIndex::new();
        index.insert("75192-2", Catalog::Primary, "f1");
        index.insert("75192-1", Catalog::Secondary, "m1");

        let candidates = matcher().candidates("f1", &index, &MatchState::default());
        assert_eq!(candidates.into_iter().collect::<Vec<_>>(), vec!["m1".to_string()]);
    }

    #[test]
    fn test_ties_prefer_lowest_secondary_id() {
        let mut index = CoOccurrenceIndex::new();
        index.insert("S1", Catalog::Primary, "f1");
        index.insert("S1", Catalog::Secondary, "m2");
        index.insert("S1", Catalog::Secondary, "m1");

        let mut compositions = CompositionIndex::new();
        compositions.insert(Catalog::Primary, "f1", CompositionLine::part("3626", "1", 1));
        compositions.insert(Catalog::Secondary, "m1", CompositionLine::part("3626", "1", 1));
        compositions.insert(Catalog::Secondary, "m2", CompositionLine::part("3626", "1", 1));

        let result =
            matcher().run(&index, &compositions, &identity_tables(&[], &["1"]), MatchState::default());
        assert_eq!(result.records[0].secondary_id, "m1");
    }

    #[test]
    fn test_empty_fingerprint_skipped() {
        let mut index = CoOccurrenceIndex::new();
        index.insert("S1", Catalog::Primary, "f1");
        index.insert("S1", Catalog::Secondary, "m1");

        let result = matcher().run(
            &index,
            &CompositionIndex::new(),
            &TranslationTables::default(),
            MatchState::default(),
        );
        assert!(result.records.is_empty());
        assert_eq!(result.skipped_no_fingerprint, 1);
    }

    #[test]
    fn test_candidate_without_composition_scores_zero() {
        let mut index = CoOccurrenceIndex::new();
        index.insert("S1", Catalog::Primary, "f1");
        index.insert("S1", Catalog::Secondary, "m1");

        let mut compositions = CompositionIndex::new();
        compositions.insert(Catalog::Primary, "f1", CompositionLine::part("3626", "1", 1));

        let result =
            matcher().run(&index, &compositions, &identity_tables(&[], &["1"]), MatchState::default());
        assert!(result.records.is_empty());
        assert_eq!(result.unmatched, 1);
    }
}
