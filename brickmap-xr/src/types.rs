//! Core types shared by the matcher and the inventory materializer
//!
//! Identifiers are plain strings in their own catalog namespace. Anything that
//! crosses namespaces goes through [`CanonicalKey`], which is always
//! namespace-qualified so a primary id can never collide with a secondary id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Catalog namespaces
// ============================================================================

/// Which product catalog an identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Catalog {
    /// Set/part database keyed by numeric/alphanumeric part and figure ids
    Primary,
    /// Marketplace catalog keyed by alphanumeric item numbers
    Secondary,
}

impl Catalog {
    pub fn as_str(&self) -> &'static str {
        match self {
            Catalog::Primary => "primary",
            Catalog::Secondary => "secondary",
        }
    }

    /// Short prefix used in canonical keys
    fn key_prefix(&self) -> &'static str {
        match self {
            Catalog::Primary => "p",
            Catalog::Secondary => "s",
        }
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Catalog {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Catalog::Primary),
            "secondary" => Ok(Catalog::Secondary),
            other => Err(format!("unknown catalog '{}'", other)),
        }
    }
}

/// Kind of item a row or composition line describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Part,
    Minifig,
}

// ============================================================================
// Composition
// ============================================================================

/// One line of a container's or entity's composition, in one catalog's namespace
///
/// Every upstream response shape and every stored row is converted into this
/// form at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionLine {
    /// Part id (or minifigure id when `kind` is `Minifig`)
    pub item_id: String,
    /// Color id; `None` for minifigures and for parts with unknown color
    pub color_id: Option<String>,
    pub quantity: u32,
    pub kind: ItemKind,
    /// Display name when the source provides one
    pub name: Option<String>,
}

impl CompositionLine {
    pub fn part(item_id: impl Into<String>, color_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            color_id: Some(color_id.into()),
            quantity,
            kind: ItemKind::Part,
            name: None,
        }
    }

    pub fn minifig(item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            color_id: None,
            quantity,
            kind: ItemKind::Minifig,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Trim an identifier, rejecting empty and whitespace-only values
pub fn clean_id(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

// ============================================================================
// Mapping records
// ============================================================================

/// How a cross-catalog link was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMethod {
    /// Only one unmatched candidate left on each side of a shared container
    Elimination,
    /// Fingerprint score at or above the exact threshold
    Exact,
    /// Fingerprint score in the overlap band
    Overlap,
    /// Borderline fingerprint score confirmed by the parts-only signal
    Fuzzy,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::Elimination => "elimination",
            MatchMethod::Exact => "exact",
            MatchMethod::Overlap => "overlap",
            MatchMethod::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "elimination" => Ok(MatchMethod::Elimination),
            "exact" => Ok(MatchMethod::Exact),
            "overlap" => Ok(MatchMethod::Overlap),
            "fuzzy" => Ok(MatchMethod::Fuzzy),
            other => Err(format!("unknown match method '{}'", other)),
        }
    }
}

/// Persisted primary ↔ secondary minifigure link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub primary_id: String,
    pub secondary_id: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub method: MatchMethod,
    pub matched_at: DateTime<Utc>,
}

impl MappingRecord {
    pub fn new(
        primary_id: impl Into<String>,
        secondary_id: impl Into<String>,
        confidence: f64,
        method: MatchMethod,
    ) -> Self {
        Self {
            primary_id: primary_id.into(),
            secondary_id: secondary_id.into(),
            confidence: confidence.clamp(0.0, 1.0),
            method,
            matched_at: Utc::now(),
        }
    }
}

// ============================================================================
// Canonical keys and inventory rows
// ============================================================================

fn escape_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains(['%', ':']) {
        Cow::Owned(segment.replace('%', "%25").replace(':', "%3A"))
    } else {
        Cow::Borrowed(segment)
    }
}

/// Namespace-qualified cross-catalog identifier
///
/// Formats: `s:part:<part>:<color>`, `p:part:<part>:<color>`, `s:fig:<id>`, `p:fig:<id>`.
/// A missing color is `-`. Inside a segment `%` and `:` are percent-encoded, as
/// is a color that is literally `-`, so distinct inputs never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn part(catalog: Catalog, part_id: &str, color_id: Option<&str>) -> Self {
        let color = match color_id {
            Some("-") => Cow::Borrowed("%2D"),
            Some(color) => escape_segment(color),
            None => Cow::Borrowed("-"),
        };
        Self(format!(
            "{}:part:{}:{}",
            catalog.key_prefix(),
            escape_segment(part_id),
            color
        ))
    }

    pub fn minifig(catalog: Catalog, figure_id: &str) -> Self {
        Self(format!("{}:fig:{}", catalog.key_prefix(), escape_segment(figure_id)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace the key was derived from
    pub fn catalog(&self) -> Catalog {
        if self.0.starts_with("s:") {
            Catalog::Secondary
        } else {
            Catalog::Primary
        }
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Edge in the parent/child relation graph of an inventory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub key: CanonicalKey,
    /// Quantity per one instance of the parent
    pub quantity: u32,
}

/// Identity details attached to an inventory row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowIdentity {
    pub primary_id: Option<String>,
    pub primary_color_id: Option<String>,
    pub secondary_id: Option<String>,
    pub secondary_color_id: Option<String>,
    pub name: Option<String>,
    /// Mapping confidence, minifigures only
    pub mapping_confidence: Option<f64>,
    pub mapping_method: Option<MatchMethod>,
}

/// One materialized inventory row; exactly one per canonical key per result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRow {
    pub canonical_key: CanonicalKey,
    pub kind: ItemKind,
    pub quantity_required: u32,
    pub parent_relations: Vec<Relation>,
    pub component_relations: Vec<Relation>,
    pub identity: RowIdentity,
}

impl InventoryRow {
    pub fn new(canonical_key: CanonicalKey, kind: ItemKind, identity: RowIdentity) -> Self {
        Self {
            canonical_key,
            kind,
            quantity_required: 0,
            parent_relations: Vec::new(),
            component_relations: Vec::new(),
            identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_keys_are_namespaced() {
        let primary = CanonicalKey::part(Catalog::Primary, "3001", Some("4"));
        let secondary = CanonicalKey::part(Catalog::Secondary, "3001", Some("4"));
        assert_ne!(primary, secondary);
        assert_eq!(primary.as_str(), "p:part:3001:4");
        assert_eq!(secondary.catalog(), Catalog::Secondary);
    }

    #[test]
    fn test_separator_in_ids_cannot_collide() {
        let left = CanonicalKey::part(Catalog::Primary, "a:b", Some("c"));
        let right = CanonicalKey::part(Catalog::Primary, "a", Some("b:c"));
        assert_ne!(left, right);
        assert_eq!(left.as_str(), "p:part:a%3Ab:c");
        assert_eq!(right.as_str(), "p:part:a:b%3Ac");

        assert_ne!(
            CanonicalKey::part(Catalog::Primary, "a%3Ab", Some("c")),
            left
        );
        assert_ne!(
            CanonicalKey::part(Catalog::Primary, "3001", Some("-")),
            CanonicalKey::part(Catalog::Primary, "3001", None)
        );
        assert_eq!(CanonicalKey::minifig(Catalog::Secondary, "x:y").as_str(), "s:fig:x%3Ay");
    }

    #[test]
    fn test_part_and_figure_keys_never_collide() {
        let part = CanonicalKey::part(Catalog::Secondary, "sw0001", None);
        let fig = CanonicalKey::minifig(Catalog::Secondary, "sw0001");
        assert_ne!(part, fig);
    }

    #[test]
    fn test_match_method_round_trip_strings() {
        for method in [
            MatchMethod::Elimination,
            MatchMethod::Exact,
            MatchMethod::Overlap,
            MatchMethod::Fuzzy,
        ] {
            assert_eq!(method.as_str().parse::<MatchMethod>().unwrap(), method);
        }
        assert!("guess".parse::<MatchMethod>().is_err());
    }

    #[test]
    fn test_mapping_confidence_clamped() {
        let record = MappingRecord::new("fig-1", "sw0001", 1.4, MatchMethod::Exact);
        assert_eq!(record.confidence, 1.0);
    }

    #[test]
    fn test_clean_id() {
        assert_eq!(clean_id("  3001 "), Some("3001"));
        assert_eq!(clean_id("   "), None);
        assert_eq!(clean_id(""), None);
    }
}
