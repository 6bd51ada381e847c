//! Identity Resolver
//!
//! Maps a catalog row to one canonical cross-catalog key. Secondary ids are
//! preferred whenever the row can be translated completely; otherwise the
//! row keeps its own namespace. The context is built once per
//! materialization call and only read afterwards.

use crate::error::EngineError;
use crate::matching::TranslationTables;
use crate::types::{clean_id, CanonicalKey, Catalog, CompositionLine, MappingRecord, RowIdentity};
use std::collections::HashMap;

/// A resolved row key plus the identity details shown on the row
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub key: CanonicalKey,
    pub identity: RowIdentity,
}

/// Request-scoped lookup tables
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    tables: TranslationTables,
    mappings: HashMap<String, MappingRecord>,
}

impl ResolutionContext {
    pub fn new(tables: TranslationTables, mappings: HashMap<String, MappingRecord>) -> Self {
        Self { tables, mappings }
    }

    pub fn mapping(&self, primary_id: &str) -> Option<&MappingRecord> {
        self.mappings.get(primary_id)
    }

    /// Resolve a part line given the namespace its ids are in
    pub fn resolve_part(
        &self,
        line: &CompositionLine,
        namespace: Catalog,
    ) -> Result<Resolved, EngineError> {
        let part_id = clean_id(&line.item_id).ok_or_else(|| {
            EngineError::Validation("part row with empty part id".to_string())
        })?;
        let color_id = line.color_id.as_deref().and_then(clean_id);

        let identity = match namespace {
            Catalog::Secondary => RowIdentity {
                secondary_id: Some(part_id.to_string()),
                secondary_color_id: color_id.map(str::to_string),
                name: line.name.clone(),
                ..Default::default()
            },
            Catalog::Primary => {
                let secondary_part = self.tables.secondary_part(part_id);
                let secondary_color = color_id.and_then(|c| self.tables.secondary_color(c));
                let translated = match (secondary_part, secondary_color) {
                    (Some(part), Some(color)) => Some((part, color)),
                    _ => None,
                };
                RowIdentity {
                    primary_id: Some(part_id.to_string()),
                    primary_color_id: color_id.map(str::to_string),
                    secondary_id: translated.map(|(part, _)| part.to_string()),
                    secondary_color_id: translated.map(|(_, color)| color.to_string()),
                    name: line.name.clone(),
                    ..Default::default()
                }
            }
        };

        let key = match (&identity.secondary_id, &identity.secondary_color_id) {
            (Some(part), color) if namespace == Catalog::Secondary || color.is_some() => {
                CanonicalKey::part(Catalog::Secondary, part, color.as_deref())
            }
            _ => CanonicalKey::part(Catalog::Primary, part_id, color_id),
        };

        Ok(Resolved { key, identity })
    }

    /// Resolve a minifigure parent given the namespace of its id
    ///
    /// Unmapped primary figures fall back to their own primary key.
    pub fn resolve_minifig(&self, figure_id: &str, namespace: Catalog) -> Result<Resolved, EngineError> {
        let figure_id = clean_id(figure_id).ok_or_else(|| {
            EngineError::Validation("minifigure row with empty id".to_string())
        })?;

        if namespace == Catalog::Secondary {
            return Ok(Resolved {
                key: CanonicalKey::minifig(Catalog::Secondary, figure_id),
                identity: RowIdentity {
                    secondary_id: Some(figure_id.to_string()),
                    ..Default::default()
                },
            });
        }

        Ok(match self.mapping(figure_id) {
            Some(mapping) => Resolved {
                key: CanonicalKey::minifig(Catalog::Secondary, &mapping.secondary_id),
                identity: RowIdentity {
                    primary_id: Some(figure_id.to_string()),
                    secondary_id: Some(mapping.secondary_id.clone()),
                    mapping_confidence: Some(mapping.confidence),
                    mapping_method: Some(mapping.method),
                    ..Default::default()
                },
            },
            None => Resolved {
                key: CanonicalKey::minifig(Catalog::Primary, figure_id),
                identity: RowIdentity {
                    primary_id: Some(figure_id.to_string()),
                    ..Default::default()
                },
            },
        })
    }
}
