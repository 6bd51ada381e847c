//! Inventory Materializer
//!
//! Per-request pipeline for one container:
//! 1. raw rows: stored container, else its base variant, else a live listing,
//!    else stored secondary membership
//! 2. minifigure compositions: own namespace, then mapped secondary, then a
//!    concurrent self-heal fetch per remaining mapped figure
//! 3. a [`ResolutionContext`] for exactly the ids involved
//! 4. merge through [`InventoryBuilder`]
//!
//! Caches are injected and only touched between awaits.

use super::identity_resolver::{ResolutionContext, Resolved};
use super::{
    ContainerSource, InventoryResult, MaterializationReport, MinifigMeta, WarningKind,
};
use crate::cache::{CachePolicy, TtlCache};
use crate::catalog::CatalogClient;
use crate::config::{CacheConfig, EngineConfig, MaterializerConfig};
use crate::db;
use crate::error::EngineError;
use crate::matching::{variant_base, TranslationTables};
use crate::types::{
    clean_id, CanonicalKey, Catalog, CompositionLine, InventoryRow, ItemKind, MappingRecord,
    Relation,
};
use futures::future::join_all;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// Row merging
// ============================================================================

/// One distinct minifigure parent with whatever composition was found
#[derive(Debug, Clone)]
pub struct ParentComposition {
    pub resolved: Resolved,
    /// Instance count in the container
    pub instances: u32,
    /// Namespace of `lines`
    pub namespace: Catalog,
    /// Subparts for one instance; empty when degraded
    pub lines: Arc<Vec<CompositionLine>>,
}

/// Accumulates rows keyed by canonical key, in first-seen order
pub struct InventoryBuilder<'a> {
    ctx: &'a ResolutionContext,
    rows: Vec<InventoryRow>,
    positions: HashMap<CanonicalKey, usize>,
    parents_seen: HashSet<CanonicalKey>,
    report: MaterializationReport,
}

impl<'a> InventoryBuilder<'a> {
    pub fn new(ctx: &'a ResolutionContext) -> Self {
        Self::with_report(ctx, MaterializationReport::default())
    }

    pub fn with_report(ctx: &'a ResolutionContext, report: MaterializationReport) -> Self {
        Self {
            ctx,
            rows: Vec::new(),
            positions: HashMap::new(),
            parents_seen: HashSet::new(),
            report,
        }
    }

    pub fn report_mut(&mut self) -> &mut MaterializationReport {
        &mut self.report
    }

    /// Existing row index for `resolved.key`, or a new row
    ///
    /// A differing name from a later source replaces the stored one.
    fn upsert(&mut self, resolved: Resolved, kind: ItemKind) -> usize {
        let Some(&idx) = self.positions.get(&resolved.key) else {
            let idx = self.rows.len();
            self.positions.insert(resolved.key.clone(), idx);
            self.rows
                .push(InventoryRow::new(resolved.key, kind, resolved.identity));
            return idx;
        };

        let Some(new_name) = resolved.identity.name else {
            return idx;
        };
        let row = &mut self.rows[idx];
        let conflict = match &row.identity.name {
            Some(old) if *old != new_name => Some(old.clone()),
            _ => None,
        };
        row.identity.name = Some(new_name.clone());

        if let Some(old) = conflict {
            let subject = row.canonical_key.to_string();
            self.report.warn(
                WarningKind::DataIntegrity,
                subject,
                format!("name '{}' replaced by '{}'", old, new_name),
            );
        }
        idx
    }

    /// Container-level part row; duplicates add quantities
    pub fn add_direct_part(&mut self, line: &CompositionLine, namespace: Catalog) {
        match self.ctx.resolve_part(line, namespace) {
            Ok(resolved) => {
                let idx = self.upsert(resolved, ItemKind::Part);
                let row = &mut self.rows[idx];
                row.quantity_required = row.quantity_required.saturating_add(line.quantity);
                self.report.succeeded += 1;
            }
            Err(e) => {
                self.report.failed += 1;
                self.report
                    .warn(WarningKind::Validation, line.item_id.clone(), e.to_string());
            }
        }
    }

    /// Minifigure parent and its exploded subparts
    ///
    /// Each parent key counts once: adding it again contributes nothing for
    /// parent/child pairs already merged.
    pub fn add_parent(&mut self, parent: &ParentComposition) {
        let parent_key = parent.resolved.key.clone();
        let first_visit = self.parents_seen.insert(parent_key.clone());
        let parent_idx = self.upsert(parent.resolved.clone(), ItemKind::Minifig);
        if first_visit {
            let row = &mut self.rows[parent_idx];
            row.quantity_required = row.quantity_required.saturating_add(parent.instances);
        } else {
            debug!(parent = %parent_key, "Parent already merged");
        }

        // Subparts resolving to the same key are summed per instance first
        let mut children: Vec<(Resolved, u32)> = Vec::new();
        let mut child_positions: HashMap<CanonicalKey, usize> = HashMap::new();
        for line in parent.lines.iter().filter(|line| line.kind == ItemKind::Part) {
            match self.ctx.resolve_part(line, parent.namespace) {
                Ok(resolved) => match child_positions.get(&resolved.key) {
                    Some(&pos) => {
                        children[pos].1 = children[pos].1.saturating_add(line.quantity);
                    }
                    None => {
                        child_positions.insert(resolved.key.clone(), children.len());
                        children.push((resolved, line.quantity));
                    }
                },
                Err(e) => {
                    self.report
                        .warn(WarningKind::Validation, parent_key.to_string(), e.to_string());
                }
            }
        }

        if first_visit {
            if children.is_empty() {
                self.report.degraded += 1;
            } else {
                self.report.succeeded += 1;
            }
        }

        let mut components = Vec::with_capacity(children.len());
        for (resolved, per_instance) in children {
            let child_key = resolved.key.clone();
            let idx = self.upsert(resolved, ItemKind::Part);
            let row = &mut self.rows[idx];
            if !row.parent_relations.iter().any(|rel| rel.key == parent_key) {
                row.quantity_required = row
                    .quantity_required
                    .saturating_add(per_instance.saturating_mul(parent.instances));
                row.parent_relations.push(Relation {
                    key: parent_key.clone(),
                    quantity: per_instance,
                });
            }
            components.push(Relation {
                key: child_key,
                quantity: per_instance,
            });
        }

        let parent_row = &mut self.rows[parent_idx];
        if parent_row.component_relations.is_empty() {
            parent_row.component_relations = components;
        }
    }

    pub fn finish(self) -> (Vec<InventoryRow>, MaterializationReport) {
        (self.rows, self.report)
    }
}

// ============================================================================
// Caches
// ============================================================================

pub type CompositionCache = TtlCache<(Catalog, String), Arc<Vec<CompositionLine>>>;
pub type PartXrefCache = TtlCache<String, Option<String>>;
pub type ColorXrefCache = TtlCache<(), Arc<HashMap<String, String>>>;

/// Caches shared by every materialization call
#[derive(Clone)]
pub struct MaterializerCaches {
    pub compositions: Arc<CompositionCache>,
    pub part_xref: Arc<PartXrefCache>,
    pub color_xref: Arc<ColorXrefCache>,
}

impl MaterializerCaches {
    pub fn from_config(config: &CacheConfig) -> Self {
        let identity = CachePolicy::from(config.identity);
        Self {
            compositions: Arc::new(TtlCache::new(CachePolicy::from(config.composition))),
            part_xref: Arc::new(TtlCache::new(identity)),
            color_xref: Arc::new(TtlCache::new(CachePolicy::new(1, identity.ttl))),
        }
    }
}

// ============================================================================
// Materializer
// ============================================================================

/// Raw rows of one container before resolution
struct RawContainer {
    source: ContainerSource,
    parts: Vec<CompositionLine>,
    minifigs: Vec<CompositionLine>,
    /// Namespace of the minifigure ids
    minifig_namespace: Catalog,
}

/// Distinct minifigure reference with summed instance count
struct PendingParent {
    figure_id: String,
    instances: u32,
    name: Option<String>,
}

/// Composition found for a parent, by figure id
type FoundCompositions = HashMap<String, (Catalog, Arc<Vec<CompositionLine>>)>;

#[derive(Default)]
struct SelfHealStats {
    attempted: usize,
    failed: usize,
}

pub struct Materializer {
    pool: SqlitePool,
    client: Arc<dyn CatalogClient>,
    config: MaterializerConfig,
    caches: MaterializerCaches,
}

impl Materializer {
    pub fn new(pool: SqlitePool, client: Arc<dyn CatalogClient>, config: &EngineConfig) -> Self {
        Self::with_caches(
            pool,
            client,
            config.materializer.clone(),
            MaterializerCaches::from_config(&config.cache),
        )
    }

    pub fn with_caches(
        pool: SqlitePool,
        client: Arc<dyn CatalogClient>,
        config: MaterializerConfig,
        caches: MaterializerCaches,
    ) -> Self {
        Self {
            pool,
            client,
            config,
            caches,
        }
    }

    /// Materialize the aggregated row set for one container
    pub async fn get_inventory_rows(&self, container_id: &str) -> Result<InventoryResult, EngineError> {
        let container_id = clean_id(container_id)
            .ok_or_else(|| EngineError::Validation("empty container id".to_string()))?
            .to_string();

        let raw = self.load_container(&container_id).await?;
        let mut report = MaterializationReport::default();
        let parents = group_parents(&raw.minifigs, &mut report);

        let mappings = match raw.minifig_namespace {
            Catalog::Primary => {
                let ids: Vec<String> = parents.iter().map(|p| p.figure_id.clone()).collect();
                db::mappings::load_mappings_for_primary(&self.pool, &ids).await?
            }
            Catalog::Secondary => HashMap::new(),
        };

        let (found, stats) = self
            .load_parent_compositions(&parents, raw.minifig_namespace, &mappings, &mut report)
            .await?;

        let cleaned = |l: &CompositionLine| clean_id(&l.item_id).map(str::to_string);
        let mut primary_part_ids: Vec<String> = raw.parts.iter().filter_map(cleaned).collect();
        for (namespace, lines) in found.values() {
            if *namespace == Catalog::Primary {
                primary_part_ids.extend(lines.iter().filter_map(cleaned));
            }
        }
        let ctx = ResolutionContext::new(self.translation_tables(primary_part_ids).await?, mappings);

        let mut builder = InventoryBuilder::with_report(&ctx, report);
        for line in &raw.parts {
            builder.add_direct_part(line, Catalog::Primary);
        }

        let mut total_minifigs = 0u32;
        for parent in &parents {
            let mut resolved = match ctx.resolve_minifig(&parent.figure_id, raw.minifig_namespace) {
                Ok(resolved) => resolved,
                Err(e) => {
                    let report = builder.report_mut();
                    report.failed += 1;
                    report.warn(WarningKind::Validation, parent.figure_id.clone(), e.to_string());
                    continue;
                }
            };
            resolved.identity.name = parent.name.clone();
            total_minifigs = total_minifigs.saturating_add(parent.instances);

            let (namespace, lines) = found
                .get(&parent.figure_id)
                .cloned()
                .unwrap_or_else(|| (raw.minifig_namespace, Arc::new(Vec::new())));
            builder.add_parent(&ParentComposition {
                resolved,
                instances: parent.instances,
                namespace,
                lines,
            });
        }

        let (rows, report) = builder.finish();
        let minifig_meta = (!parents.is_empty()).then(|| MinifigMeta {
            total_minifigs,
            distinct_minifigs: parents.len(),
            self_heal_attempted: stats.attempted,
            self_heal_failed: stats.failed,
            container_fallback: raw.source.is_fallback(),
        });

        info!(
            container_id = %container_id,
            source = ?raw.source,
            rows = rows.len(),
            succeeded = report.succeeded,
            degraded = report.degraded,
            failed = report.failed,
            warnings = report.warnings.len(),
            "Inventory materialized"
        );

        Ok(InventoryResult {
            container_id,
            source: raw.source,
            rows,
            minifig_meta,
            report,
        })
    }

    async fn load_local(&self, container_id: &str) -> Result<Option<(Vec<CompositionLine>, Vec<CompositionLine>)>, EngineError> {
        let parts = db::containers::load_container_parts(&self.pool, container_id).await?;
        let minifigs =
            db::containers::load_container_minifigs(&self.pool, container_id, Catalog::Primary).await?;
        if parts.is_empty() && minifigs.is_empty() {
            Ok(None)
        } else {
            Ok(Some((parts, minifigs)))
        }
    }

    async fn load_container(&self, container_id: &str) -> Result<RawContainer, EngineError> {
        if let Some((parts, minifigs)) = self.load_local(container_id).await? {
            return Ok(RawContainer {
                source: ContainerSource::Local,
                parts,
                minifigs,
                minifig_namespace: Catalog::Primary,
            });
        }

        if let Some(base) = variant_base(container_id) {
            if let Some((parts, minifigs)) = self.load_local(&base).await? {
                debug!(container_id = %container_id, base = %base, "Using base variant rows");
                return Ok(RawContainer {
                    source: ContainerSource::VariantBase { container_id: base },
                    parts,
                    minifigs,
                    minifig_namespace: Catalog::Primary,
                });
            }
        }

        if self.config.container_live_fallback {
            let deadline = self.config.container_fetch_timeout();
            let live = tokio::time::timeout(
                deadline,
                self.client
                    .fetch_container_composition(Catalog::Primary, container_id),
            )
            .await;
            match live {
                Ok(Ok(lines)) if !lines.is_empty() => {
                    let (minifigs, parts): (Vec<_>, Vec<_>) =
                        lines.into_iter().partition(|l| l.kind == ItemKind::Minifig);
                    debug!(container_id = %container_id, "Using live container listing");
                    return Ok(RawContainer {
                        source: ContainerSource::Live,
                        parts,
                        minifigs,
                        minifig_namespace: Catalog::Primary,
                    });
                }
                Ok(Ok(_)) => debug!(container_id = %container_id, "Live container listing empty"),
                Ok(Err(e)) => warn!(container_id = %container_id, "Live container fetch failed: {}", e),
                Err(_) => warn!(
                    container_id = %container_id,
                    timeout_ms = deadline.as_millis() as u64,
                    "Live container fetch timed out"
                ),
            }
        }

        let secondary =
            db::containers::load_container_minifigs(&self.pool, container_id, Catalog::Secondary)
                .await?;
        if !secondary.is_empty() {
            return Ok(RawContainer {
                source: ContainerSource::SecondaryMembers,
                parts: Vec::new(),
                minifigs: secondary,
                minifig_namespace: Catalog::Secondary,
            });
        }

        error!(container_id = %container_id, "No inventory source available");
        Err(EngineError::InventoryUnavailable(container_id.to_string()))
    }

    /// Cached compositions for `ids`; misses are loaded in one batch and cached
    async fn cached_compositions(
        &self,
        catalog: Catalog,
        ids: &[String],
    ) -> Result<HashMap<String, Arc<Vec<CompositionLine>>>, EngineError> {
        let mut found = HashMap::new();
        let mut misses = Vec::new();
        for id in ids {
            match self.caches.compositions.get(&(catalog, id.clone())) {
                Some(lines) => {
                    found.insert(id.clone(), lines);
                }
                None => misses.push(id.clone()),
            }
        }

        if !misses.is_empty() {
            for (id, lines) in db::compositions::load_compositions(&self.pool, catalog, &misses).await? {
                let lines = Arc::new(lines);
                self.caches.compositions.set((catalog, id.clone()), lines.clone());
                found.insert(id, lines);
            }
        }

        Ok(found)
    }

    async fn load_parent_compositions(
        &self,
        parents: &[PendingParent],
        namespace: Catalog,
        mappings: &HashMap<String, MappingRecord>,
        report: &mut MaterializationReport,
    ) -> Result<(FoundCompositions, SelfHealStats), EngineError> {
        let mut found: FoundCompositions = HashMap::new();
        let mut stats = SelfHealStats::default();

        let own_ids: Vec<String> = parents.iter().map(|p| p.figure_id.clone()).collect();
        for (id, lines) in self.cached_compositions(namespace, &own_ids).await? {
            found.insert(id, (namespace, lines));
        }

        // Secondary id to fetch for each parent still missing a composition
        let mut missing: Vec<(String, String)> = Vec::new();
        for parent in parents.iter().filter(|p| !found.contains_key(&p.figure_id)) {
            match namespace {
                Catalog::Secondary => missing.push((parent.figure_id.clone(), parent.figure_id.clone())),
                Catalog::Primary => match mappings.get(&parent.figure_id) {
                    Some(mapping) => {
                        missing.push((parent.figure_id.clone(), mapping.secondary_id.clone()))
                    }
                    None => report.warn(
                        WarningKind::NoComposition,
                        parent.figure_id.clone(),
                        "no stored composition and no mapping to self-heal with",
                    ),
                },
            }
        }

        if namespace == Catalog::Primary && !missing.is_empty() {
            let secondary_ids: Vec<String> = missing.iter().map(|(_, sid)| sid.clone()).collect();
            let local = self.cached_compositions(Catalog::Secondary, &secondary_ids).await?;
            missing.retain(|(figure_id, secondary_id)| match local.get(secondary_id) {
                Some(lines) => {
                    found.insert(figure_id.clone(), (Catalog::Secondary, lines.clone()));
                    false
                }
                None => true,
            });
        }

        if missing.is_empty() {
            return Ok((found, stats));
        }

        let timeout = self.config.self_heal_timeout();
        let client = &self.client;
        let fetches = missing.into_iter().map(|(figure_id, secondary_id)| async move {
            let outcome = tokio::time::timeout(
                timeout,
                client.fetch_entity_composition(Catalog::Secondary, &secondary_id),
            )
            .await;
            (figure_id, secondary_id, outcome)
        });
        let outcomes = join_all(fetches).await;
        stats.attempted = outcomes.len();

        for (figure_id, secondary_id, outcome) in outcomes {
            let error = match outcome {
                Ok(Ok(lines)) if lines.iter().any(|l| l.kind == ItemKind::Part) => {
                    debug!(figure_id = %figure_id, secondary_id = %secondary_id, lines = lines.len(), "Self-heal succeeded");
                    let lines = Arc::new(lines);
                    self.caches
                        .compositions
                        .set((Catalog::Secondary, secondary_id.clone()), lines.clone());
                    if self.config.persist_self_heal {
                        if let Err(e) = db::compositions::replace_composition(
                            &self.pool,
                            Catalog::Secondary,
                            &secondary_id,
                            &lines,
                        )
                        .await
                        {
                            report.warn(
                                WarningKind::Persistence,
                                secondary_id.clone(),
                                format!("self-heal write-back failed: {}", e),
                            );
                        }
                    }
                    found.insert(figure_id, (Catalog::Secondary, lines));
                    continue;
                }
                Ok(Ok(_)) => EngineError::UpstreamUnavailable("catalog returned no parts".to_string()),
                Ok(Err(e)) => EngineError::from(e),
                Err(_) => EngineError::Timeout(timeout),
            };

            stats.failed += 1;
            let kind = match error {
                EngineError::Timeout(_) => WarningKind::Timeout,
                _ => WarningKind::UpstreamUnavailable,
            };
            report.warn(
                kind,
                figure_id,
                format!("self-heal via {} failed: {}", secondary_id, error),
            );
        }

        Ok((found, stats))
    }

    /// Cross-reference tables restricted to the given primary part ids
    async fn translation_tables(&self, part_ids: Vec<String>) -> Result<TranslationTables, EngineError> {
        let mut parts = HashMap::new();
        let mut misses = Vec::new();
        let mut seen = HashSet::new();
        for id in part_ids {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.caches.part_xref.get(&id) {
                Some(Some(secondary)) => {
                    parts.insert(id, secondary);
                }
                Some(None) => {}
                None => misses.push(id),
            }
        }

        if !misses.is_empty() {
            let loaded = db::xref::load_part_xref(&self.pool, &misses).await?;
            for id in misses {
                let secondary = loaded.get(&id).cloned();
                self.caches.part_xref.set(id.clone(), secondary.clone());
                if let Some(secondary) = secondary {
                    parts.insert(id, secondary);
                }
            }
        }

        let colors = match self.caches.color_xref.get(&()) {
            Some(colors) => colors,
            None => {
                let colors = Arc::new(db::xref::load_color_xref(&self.pool).await?);
                self.caches.color_xref.set((), colors.clone());
                colors
            }
        };

        Ok(TranslationTables::new(parts, (*colors).clone()))
    }
}

/// Merge duplicate minifigure references by cleaned id, keeping first-seen order
fn group_parents(minifigs: &[CompositionLine], report: &mut MaterializationReport) -> Vec<PendingParent> {
    let mut parents: Vec<PendingParent> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for line in minifigs {
        let Some(figure_id) = clean_id(&line.item_id) else {
            report.failed += 1;
            report.warn(
                WarningKind::Validation,
                line.item_id.clone(),
                "minifigure row with empty id",
            );
            continue;
        };
        match positions.get(figure_id) {
            Some(&pos) => {
                let parent = &mut parents[pos];
                parent.instances = parent.instances.saturating_add(line.quantity);
                if parent.name.is_none() {
                    parent.name = line.name.clone();
                }
            }
            None => {
                positions.insert(figure_id.to_string(), parents.len());
                parents.push(PendingParent {
                    figure_id: figure_id.to_string(),
                    instances: line.quantity,
                    name: line.name.clone(),
                });
            }
        }
    }

    parents
}
