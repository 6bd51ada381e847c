//! Matching pass orchestrator
//!
//! Batch job run after ingestion: load the co-occurrence index, existing
//! mappings, compositions and cross-references; run elimination, then
//! fingerprint matching, then elimination again on the shrunken containers;
//! persist the new links append-only.

use super::{
    eliminate, CoOccurrenceIndex, CompositionIndex, FingerprintMatcher, MatchState,
    PartNormalizer, TranslationTables,
};
use crate::config::EngineConfig;
use crate::db;
use crate::types::{MappingRecord, MatchMethod};
use crate::utils::retry_on_lock;
use brickmap_common::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Outcome counts of one matching pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchReport {
    pub run_id: Uuid,
    pub started_at: Option<DateTime<Utc>>,
    /// Elimination scans across both elimination runs
    pub elimination_passes: u32,
    pub elimination_matches: usize,
    pub exact_matches: usize,
    pub overlap_matches: usize,
    pub fuzzy_matches: usize,
    /// Primary figures still without a mapping at the end, skipped ones included
    pub unmatched: usize,
    /// Co-occurrence rows rejected for blank or malformed identifiers
    pub skipped_invalid: usize,
    pub skipped_no_fingerprint: usize,
    pub persisted: usize,
    /// Records not written because either id was mapped concurrently
    pub persist_conflicts: usize,
    pub duration_ms: u64,
}

impl MatchReport {
    pub fn new_matches(&self) -> usize {
        self.elimination_matches + self.exact_matches + self.overlap_matches + self.fuzzy_matches
    }
}

pub struct MatchingPass {
    pool: SqlitePool,
    matcher: FingerprintMatcher,
    rerun_elimination: bool,
    max_lock_wait_ms: u64,
}

impl MatchingPass {
    pub fn new(pool: SqlitePool, config: &EngineConfig) -> Self {
        let matcher = FingerprintMatcher::new(
            config.matching.tiers,
            PartNormalizer::from_config(&config.normalization.primary),
            PartNormalizer::from_config(&config.normalization.secondary),
        );
        Self {
            pool,
            matcher,
            rerun_elimination: config.matching.rerun_elimination,
            max_lock_wait_ms: config.database.max_lock_wait_ms,
        }
    }

    /// Load, match, persist
    pub async fn run_matching_pass(&self) -> Result<MatchReport> {
        let started = Instant::now();
        let started_at = Utc::now();

        let (index, skipped_invalid) = db::containers::load_cooccurrence(&self.pool).await?;
        let existing = db::mappings::load_all_mappings(&self.pool).await?;
        let compositions = db::compositions::load_composition_index(&self.pool).await?;
        let tables = db::xref::load_translation_tables(&self.pool).await?;

        info!(
            containers = index.container_count(),
            existing_mappings = existing.len(),
            part_xref = tables.part_count(),
            color_xref = tables.color_count(),
            "Matching pass started"
        );

        let (mut report, records) = self.match_in_memory(&index, &compositions, &tables, &existing);
        report.skipped_invalid = skipped_invalid;
        report.started_at = Some(started_at);

        let pool = &self.pool;
        let outcome = retry_on_lock("mapping insert", self.max_lock_wait_ms, || {
            db::mappings::insert_mappings(pool, &records)
        })
        .await?;
        report.persisted = outcome.inserted;
        report.persist_conflicts = outcome.conflicts;
        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            run_id = %report.run_id,
            elimination = report.elimination_matches,
            exact = report.exact_matches,
            overlap = report.overlap_matches,
            fuzzy = report.fuzzy_matches,
            unmatched = report.unmatched,
            persisted = report.persisted,
            conflicts = report.persist_conflicts,
            duration_ms = report.duration_ms,
            "Matching pass complete"
        );

        Ok(report)
    }

    /// Run the tiers over already-loaded data; returns the report and new records
    pub fn match_in_memory(
        &self,
        index: &CoOccurrenceIndex,
        compositions: &CompositionIndex,
        tables: &TranslationTables,
        existing: &[MappingRecord],
    ) -> (MatchReport, Vec<MappingRecord>) {
        let mut report = MatchReport {
            run_id: Uuid::new_v4(),
            ..Default::default()
        };
        let mut records = Vec::new();

        let first = eliminate(index, MatchState::from_mappings(existing));
        report.elimination_passes += first.passes;
        records.extend(first.records);

        let fingerprinted = self.matcher.run(index, compositions, tables, first.state);
        report.exact_matches = fingerprinted.count(MatchMethod::Exact);
        report.overlap_matches = fingerprinted.count(MatchMethod::Overlap);
        report.fuzzy_matches = fingerprinted.count(MatchMethod::Fuzzy);
        report.skipped_no_fingerprint = fingerprinted.skipped_no_fingerprint;
        records.extend(fingerprinted.records);

        let mut state = fingerprinted.state;
        if self.rerun_elimination {
            let cascade = eliminate(index, state);
            report.elimination_passes += cascade.passes;
            records.extend(cascade.records);
            state = cascade.state;
        }

        report.elimination_matches = records
            .iter()
            .filter(|r| r.method == MatchMethod::Elimination)
            .count();
        report.unmatched = index
            .primary_entities()
            .filter(|id| !state.is_primary_matched(id))
            .count();

        (report, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;
    use crate::types::{Catalog, CompositionLine};
    use std::collections::HashMap;

    fn s1_index() -> CoOccurrenceIndex {
        let mut index = CoOccurrenceIndex::new();
        index.insert("S1", Catalog::Primary, "f1");
        index.insert("S1", Catalog::Primary, "f2");
        index.insert("S1", Catalog::Secondary, "m1");
        index.insert("S1", Catalog::Secondary, "m2");
        index
    }

    fn s1_compositions() -> CompositionIndex {
        let mut compositions = CompositionIndex::new();
        for part in ["3626", "973", "970c00"] {
            compositions.insert(Catalog::Primary, "f1", CompositionLine::part(part, "1", 1));
            compositions.insert(Catalog::Secondary, "m1", CompositionLine::part(part, "1", 1));
        }
        compositions
    }

    fn color_tables() -> TranslationTables {
        TranslationTables::new(
            HashMap::new(),
            HashMap::from([("1".to_string(), "1".to_string())]),
        )
    }

    #[tokio::test]
    async fn test_fingerprint_then_cascade_elimination() {
        let pool = memory_pool().await;
        let pass = MatchingPass::new(pool, &EngineConfig::default());

        let (report, records) =
            pass.match_in_memory(&s1_index(), &s1_compositions(), &color_tables(), &[]);

        assert_eq!(report.exact_matches, 1);
        assert_eq!(report.elimination_matches, 1);
        assert_eq!(report.unmatched, 0);
        assert_eq!(report.skipped_no_fingerprint, 1);
        assert_eq!(records[0].primary_id, "f1");
        assert_eq!(records[0].secondary_id, "m1");
        assert_eq!(records[0].confidence, 0.95);
        assert_eq!(records[1].primary_id, "f2");
        assert_eq!(records[1].secondary_id, "m2");
        assert_eq!(records[1].method, MatchMethod::Elimination);
    }

    #[tokio::test]
    async fn test_cascade_disabled() {
        let pool = memory_pool().await;
        let mut config = EngineConfig::default();
        config.matching.rerun_elimination = false;
        let pass = MatchingPass::new(pool, &config);

        let (report, records) =
            pass.match_in_memory(&s1_index(), &s1_compositions(), &color_tables(), &[]);
        assert_eq!(records.len(), 1);
        assert_eq!(report.unmatched, 1);
    }

    #[tokio::test]
    async fn test_existing_mappings_not_reissued() {
        let pool = memory_pool().await;
        let pass = MatchingPass::new(pool, &EngineConfig::default());
        let existing = vec![
            MappingRecord::new("f1", "m1", 0.95, MatchMethod::Exact),
            MappingRecord::new("f2", "m2", 1.0, MatchMethod::Elimination),
        ];

        let (report, records) =
            pass.match_in_memory(&s1_index(), &s1_compositions(), &color_tables(), &existing);
        assert!(records.is_empty());
        assert_eq!(report.new_matches(), 0);
        assert_eq!(report.unmatched, 0);
    }
}
