//! Cross-catalog minifigure matching
//!
//! Two tiers run in sequence over an explicit [`MatchState`]:
//! - **Tier 1** ([`elimination`]): exclusive containment inside shared containers
//! - **Tier 2** ([`fingerprint_matcher`]): composition similarity with confidence tiers
//!
//! The state value is threaded through each tier and returned, so the batch
//! job never relies on ambient mutable exclusion sets.

pub mod elimination;
pub mod fingerprint;
pub mod fingerprint_matcher;
pub mod pass;
pub mod similarity;

pub use elimination::{eliminate, EliminationResult};
pub use fingerprint::{Fingerprint, PartNormalizer};
pub use fingerprint_matcher::{
    classify, FingerprintMatchResult, FingerprintMatcher, TranslationTables,
};
pub use pass::{MatchReport, MatchingPass};
pub use similarity::{compare, compare_parts_only, Similarity};

use crate::types::{clean_id, Catalog, CompositionLine, MappingRecord};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Exclusion sets for one matching run
///
/// Seeded from persisted mappings; grows monotonically as tiers record matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchState {
    matched_primary: HashSet<String>,
    matched_secondary: HashSet<String>,
}

impl MatchState {
    pub fn from_mappings<'a, I>(mappings: I) -> Self
    where
        I: IntoIterator<Item = &'a MappingRecord>,
    {
        let mut state = MatchState::default();
        for mapping in mappings {
            state.record(mapping);
        }
        state
    }

    pub fn record(&mut self, mapping: &MappingRecord) {
        self.matched_primary.insert(mapping.primary_id.clone());
        self.matched_secondary.insert(mapping.secondary_id.clone());
    }

    pub fn is_primary_matched(&self, primary_id: &str) -> bool {
        self.matched_primary.contains(primary_id)
    }

    pub fn is_secondary_matched(&self, secondary_id: &str) -> bool {
        self.matched_secondary.contains(secondary_id)
    }

    pub fn matched_primary_count(&self) -> usize {
        self.matched_primary.len()
    }
}

/// Minifigure lists of one container, per catalog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerMembers {
    pub primary: BTreeSet<String>,
    pub secondary: BTreeSet<String>,
}

/// Container → per-catalog minifigure membership, plus the reverse primary index
#[derive(Debug, Clone, Default)]
pub struct CoOccurrenceIndex {
    containers: BTreeMap<String, ContainerMembers>,
    primary_containers: BTreeMap<String, BTreeSet<String>>,
}

impl CoOccurrenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one membership; returns false (and ignores it) for blank identifiers
    pub fn insert(&mut self, container_id: &str, catalog: Catalog, entity_id: &str) -> bool {
        let (Some(container_id), Some(entity_id)) = (clean_id(container_id), clean_id(entity_id))
        else {
            return false;
        };

        let members = self.containers.entry(container_id.to_string()).or_default();
        match catalog {
            Catalog::Primary => {
                members.primary.insert(entity_id.to_string());
                self.primary_containers
                    .entry(entity_id.to_string())
                    .or_default()
                    .insert(container_id.to_string());
            }
            Catalog::Secondary => {
                members.secondary.insert(entity_id.to_string());
            }
        }
        true
    }

    /// Containers in sorted id order
    pub fn containers(&self) -> impl Iterator<Item = (&String, &ContainerMembers)> {
        self.containers.iter()
    }

    pub fn members(&self, container_id: &str) -> Option<&ContainerMembers> {
        self.containers.get(container_id)
    }

    /// Containers a primary entity appears in
    pub fn containers_of_primary(&self, primary_id: &str) -> impl Iterator<Item = &String> {
        self.primary_containers
            .get(primary_id)
            .into_iter()
            .flat_map(|set| set.iter())
    }

    /// Every primary entity, sorted
    pub fn primary_entities(&self) -> impl Iterator<Item = &String> {
        self.primary_containers.keys()
    }

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }
}

/// Per-catalog minifigure compositions loaded for one matching run
#[derive(Debug, Clone, Default)]
pub struct CompositionIndex {
    primary: HashMap<String, Vec<CompositionLine>>,
    secondary: HashMap<String, Vec<CompositionLine>>,
}

impl CompositionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, catalog: Catalog, entity_id: &str, line: CompositionLine) {
        let map = match catalog {
            Catalog::Primary => &mut self.primary,
            Catalog::Secondary => &mut self.secondary,
        };
        map.entry(entity_id.to_string()).or_default().push(line);
    }

    /// Composition of an entity; empty when nothing is stored
    pub fn lines(&self, catalog: Catalog, entity_id: &str) -> &[CompositionLine] {
        let map = match catalog {
            Catalog::Primary => &self.primary,
            Catalog::Secondary => &self.secondary,
        };
        map.get(entity_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn entity_count(&self, catalog: Catalog) -> usize {
        match catalog {
            Catalog::Primary => self.primary.len(),
            Catalog::Secondary => self.secondary.len(),
        }
    }
}

/// Base production variant of a numbered reissue: `X-n` (n > 1) → `X-1`
pub fn variant_base(container_id: &str) -> Option<String> {
    let (base, suffix) = container_id.rsplit_once('-')?;
    let number: u32 = suffix.parse().ok()?;
    if number > 1 && !base.is_empty() {
        Some(format!("{}-1", base))
    } else {
        None
    }
}
