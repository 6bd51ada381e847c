//! Inventory materialization
//!
//! Turns a container's direct parts and minifigure references into one
//! aggregated row set: each minifigure is exploded into its subparts, every
//! row gets a namespace-qualified canonical key, and rows sharing a key merge.
//! Failures degrade single entities and are collected in a
//! [`MaterializationReport`] instead of aborting the call.

pub mod identity_resolver;
pub mod materializer;

pub use identity_resolver::{Resolved, ResolutionContext};
pub use materializer::{InventoryBuilder, Materializer, ParentComposition};

use crate::types::InventoryRow;
use serde::Serialize;

/// Where a container's raw rows came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContainerSource {
    /// Stored rows for the requested container
    Local,
    /// Stored rows of the base production variant
    VariantBase { container_id: String },
    /// Live listing from the primary catalog
    Live,
    /// Stored secondary-catalog minifigure membership only
    SecondaryMembers,
}

impl ContainerSource {
    pub fn is_fallback(&self) -> bool {
        !matches!(self, ContainerSource::Local)
    }
}

/// Category of a recorded warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Empty or malformed identifier; the row was skipped
    Validation,
    /// Self-heal fetch failed
    UpstreamUnavailable,
    /// Self-heal fetch exceeded its budget
    Timeout,
    /// Minifigure has no composition anywhere and no mapping to self-heal with
    NoComposition,
    /// Two sources disagree on a static field; last write won
    DataIntegrity,
    /// Self-heal result could not be written back
    Persistence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterializationWarning {
    pub kind: WarningKind,
    /// Canonical key or raw identifier the warning is about
    pub subject: String,
    pub message: String,
}

/// Per-call outcome counts
///
/// Every direct part row and every distinct minifigure parent counts once:
/// `succeeded` when fully materialized, `degraded` when present with empty
/// enrichment, `failed` when skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MaterializationReport {
    pub succeeded: usize,
    pub degraded: usize,
    pub failed: usize,
    pub warnings: Vec<MaterializationWarning>,
}

impl MaterializationReport {
    pub(crate) fn warn(&mut self, kind: WarningKind, subject: impl Into<String>, message: impl Into<String>) {
        let subject = subject.into();
        let message = message.into();
        tracing::warn!(kind = ?kind, subject = %subject, "{}", message);
        self.warnings.push(MaterializationWarning {
            kind,
            subject,
            message,
        });
    }

    pub fn warnings_of(&self, kind: WarningKind) -> impl Iterator<Item = &MaterializationWarning> {
        self.warnings.iter().filter(move |w| w.kind == kind)
    }
}

/// Minifigure summary for a container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MinifigMeta {
    /// Sum of instance counts over all minifigure parents
    pub total_minifigs: u32,
    pub distinct_minifigs: usize,
    pub self_heal_attempted: usize,
    pub self_heal_failed: usize,
    /// Rows did not come from the container's own stored data
    pub container_fallback: bool,
}

/// Result of one materialization call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryResult {
    pub container_id: String,
    pub source: ContainerSource,
    pub rows: Vec<InventoryRow>,
    /// Present when the container has minifigure parents
    pub minifig_meta: Option<MinifigMeta>,
    pub report: MaterializationReport,
}
