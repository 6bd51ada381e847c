//! Tier-1 Elimination Matcher
//!
//! When a container has exactly one unmatched minifigure on each side, those
//! two must be the same figure. Each resolution can shrink other containers,
//! so every container is re-scanned until a full pass records nothing new.
//! Visiting order is sorted container id, which makes runs reproducible.

use super::{CoOccurrenceIndex, MatchState};
use crate::types::{MappingRecord, MatchMethod};
use tracing::debug;

/// Output of the fixpoint loop
#[derive(Debug, Clone)]
pub struct EliminationResult {
    pub state: MatchState,
    pub records: Vec<MappingRecord>,
    /// Full scans performed, including the final scan that found nothing
    pub passes: u32,
}

/// Run elimination to a fixpoint
pub fn eliminate(index: &CoOccurrenceIndex, mut state: MatchState) -> EliminationResult {
    let mut records = Vec::new();
    let mut passes = 0;

    loop {
        passes += 1;
        let mut changed = false;

        for (container_id, members) in index.containers() {
            let mut unmatched_primary = members
                .primary
                .iter()
                .filter(|id| !state.is_primary_matched(id));
            let mut unmatched_secondary = members
                .secondary
                .iter()
                .filter(|id| !state.is_secondary_matched(id));

            let (Some(primary_id), None) = (unmatched_primary.next(), unmatched_primary.next())
            else {
                continue;
            };
            let (Some(secondary_id), None) =
                (unmatched_secondary.next(), unmatched_secondary.next())
            else {
                continue;
            };

            let record = MappingRecord::new(
                primary_id.as_str(),
                secondary_id.as_str(),
                1.0,
                MatchMethod::Elimination,
            );
            debug!(
                container = %container_id,
                primary_id = %record.primary_id,
                secondary_id = %record.secondary_id,
                pass = passes,
                "Resolved by elimination"
            );
            state.record(&record);
            records.push(record);
            changed = true;
        }

        if !changed {
            break;
        }
    }

    EliminationResult {
        state,
        records,
        passes,
    }
}
