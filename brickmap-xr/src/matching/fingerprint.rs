//! Fingerprint Builder
//!
//! A fingerprint is the normalized multiset of `(part, color)` quantities that
//! describes an entity's physical composition within one catalog namespace.
//! It is never stored; it is rebuilt from composition lines whenever needed.

use crate::config::NamespaceNormalization;
use crate::types::{CompositionLine, ItemKind};
use std::collections::{BTreeMap, HashMap};

/// Fingerprint key: normalized part id and color id
pub type FingerprintKey = (String, String);

/// Collapses cosmetic numbering variants to one canonical part id
///
/// Built once per catalog from configuration and shared by every call site.
#[derive(Debug, Clone, Default)]
pub struct PartNormalizer {
    aliases: HashMap<String, String>,
}

impl PartNormalizer {
    /// Normalizer that leaves every id unchanged
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn from_config(config: &NamespaceNormalization) -> Self {
        let mut aliases = HashMap::new();
        for family in &config.families {
            let canonical = family.canonical.trim().to_string();
            for member in &family.members {
                let member = member.trim();
                if !member.is_empty() && member != canonical {
                    aliases.insert(member.to_string(), canonical.clone());
                }
            }
        }
        Self { aliases }
    }

    pub fn normalize<'a>(&'a self, part_id: &'a str) -> &'a str {
        self.aliases.get(part_id).map(String::as_str).unwrap_or(part_id)
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }
}

/// Normalized `(part, color) -> quantity` multiset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fingerprint {
    counts: BTreeMap<FingerprintKey, u32>,
}

impl Fingerprint {
    /// Build from composition lines in one namespace
    ///
    /// Minifigure lines, lines without a color and zero quantities contribute
    /// nothing. Empty input yields an empty fingerprint.
    pub fn from_lines<'a, I>(lines: I, normalizer: &PartNormalizer) -> Self
    where
        I: IntoIterator<Item = &'a CompositionLine>,
    {
        let mut fingerprint = Fingerprint::default();
        for line in lines {
            if line.kind != ItemKind::Part {
                continue;
            }
            let Some(color_id) = line.color_id.as_deref() else {
                continue;
            };
            fingerprint.add(normalizer.normalize(&line.item_id), color_id, line.quantity);
        }
        fingerprint
    }

    /// Add quantity for an already-translated key
    pub fn add(&mut self, part_id: &str, color_id: &str, quantity: u32) {
        if quantity == 0 {
            return;
        }
        *self
            .counts
            .entry((part_id.to_string(), color_id.to_string()))
            .or_insert(0) += quantity;
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn get(&self, part_id: &str, color_id: &str) -> u32 {
        self.counts
            .get(&(part_id.to_string(), color_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Total quantity across all keys
    pub fn total(&self) -> u64 {
        self.counts.values().map(|&q| u64::from(q)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FingerprintKey, &u32)> {
        self.counts.iter()
    }

    /// Same multiset with color dropped from the key
    pub fn parts_only(&self) -> BTreeMap<String, u64> {
        let mut parts = BTreeMap::new();
        for ((part_id, _), &quantity) in &self.counts {
            *parts.entry(part_id.clone()).or_insert(0) += u64::from(quantity);
        }
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartFamily;

    fn legs_normalizer() -> PartNormalizer {
        PartNormalizer::from_config(&NamespaceNormalization {
            families: vec![PartFamily {
                canonical: "970c00".to_string(),
                members: vec!["970c00".to_string(), "970d00".to_string(), "73200".to_string()],
            }],
        })
    }

    #[test]
    fn test_empty_input_is_empty_fingerprint() {
        let lines: Vec<CompositionLine> = Vec::new();
        let fingerprint = Fingerprint::from_lines(&lines, &PartNormalizer::identity());
        assert!(fingerprint.is_empty());
        assert_eq!(fingerprint.total(), 0);
    }

    #[test]
    fn test_quantities_sum_per_key() {
        let lines = vec![
            CompositionLine::part("3626", "1", 1),
            CompositionLine::part("3626", "1", 2),
            CompositionLine::part("3626", "5", 1),
        ];
        let fingerprint = Fingerprint::from_lines(&lines, &PartNormalizer::identity());
        assert_eq!(fingerprint.get("3626", "1"), 3);
        assert_eq!(fingerprint.get("3626", "5"), 1);
        assert_eq!(fingerprint.len(), 2);
    }

    #[test]
    fn test_family_members_collapse() {
        let lines = vec![
            CompositionLine::part("970d00", "11", 1),
            CompositionLine::part("73200", "11", 1),
        ];
        let fingerprint = Fingerprint::from_lines(&lines, &legs_normalizer());
        assert_eq!(fingerprint.get("970c00", "11"), 2);
        assert_eq!(fingerprint.len(), 1);
    }

    #[test]
    fn test_colorless_and_minifig_lines_dropped() {
        let mut colorless = CompositionLine::part("3626", "1", 1);
        colorless.color_id = None;
        let lines = vec![
            colorless,
            CompositionLine::minifig("sw0001", 1),
            CompositionLine::part("973", "1", 1),
        ];
        let fingerprint = Fingerprint::from_lines(&lines, &PartNormalizer::identity());
        assert_eq!(fingerprint.len(), 1);
        assert_eq!(fingerprint.get("973", "1"), 1);
    }

    #[test]
    fn test_zero_quantity_ignored() {
        let lines = vec![CompositionLine::part("3626", "1", 0)];
        assert!(Fingerprint::from_lines(&lines, &PartNormalizer::identity()).is_empty());
    }

    #[test]
    fn test_parts_only_merges_colors() {
        let mut fingerprint = Fingerprint::default();
        fingerprint.add("3626", "1", 1);
        fingerprint.add("3626", "5", 2);
        let parts = fingerprint.parts_only();
        assert_eq!(parts.get("3626"), Some(&3));
    }

    #[test]
    fn test_canonical_not_self_aliased() {
        assert_eq!(legs_normalizer().alias_count(), 2);
    }
}
