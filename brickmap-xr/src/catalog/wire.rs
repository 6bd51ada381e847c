//! Upstream response shapes
//!
//! Both catalogs (and the different endpoints of each) return composition
//! data in several layouts. They are decoded once through untagged unions and
//! converted to [`CompositionLine`] here, so nothing past this module branches
//! on response shape.

use crate::types::{CompositionLine, ItemKind};
use serde::de::IgnoredAny;
use serde::Deserialize;

/// Identifiers arrive as JSON numbers from some endpoints and strings from others
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    pub fn into_string(self) -> String {
        match self {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirePart {
    pub part_num: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireColor {
    pub id: WireId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireItem {
    pub no: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: Option<String>,
}

/// One line of a composition listing
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WireLine {
    /// `{"part": {"part_num", "name"}, "color": {"id"}, "quantity"}`
    Nested {
        part: WirePart,
        color: WireColor,
        quantity: u32,
    },
    /// `{"item": {"no", "name", "type"}, "color_id", "quantity"}`
    Marketplace {
        item: WireItem,
        #[serde(default)]
        color_id: Option<WireId>,
        quantity: u32,
        #[serde(default)]
        is_alternate: bool,
    },
    /// `{"part_num", "color_id", "quantity", "part_name"}`
    Flat {
        part_num: String,
        #[serde(default)]
        color_id: Option<WireId>,
        quantity: u32,
        #[serde(default)]
        part_name: Option<String>,
    },
    /// Minifigure reference in a container listing: `{"set_num", "quantity", "set_name"}`
    FigureRef {
        set_num: String,
        quantity: u32,
        #[serde(default)]
        set_name: Option<String>,
    },
    /// Match group wrapping alternatives: `{"entries": [...]}`
    Group { entries: Vec<WireLine> },
    /// Anything else is skipped rather than failing the whole page
    Unrecognized(IgnoredAny),
}

impl WireLine {
    /// Canonical lines; groups flatten, alternates and unrecognized entries vanish
    pub fn into_lines(self, out: &mut Vec<CompositionLine>) -> usize {
        match self {
            WireLine::Nested {
                part,
                color,
                quantity,
            } => {
                out.push(CompositionLine {
                    item_id: part.part_num,
                    color_id: Some(color.id.into_string()),
                    quantity,
                    kind: ItemKind::Part,
                    name: part.name,
                });
                0
            }
            WireLine::Marketplace {
                item,
                color_id,
                quantity,
                is_alternate,
            } => {
                if is_alternate {
                    return 0;
                }
                let is_minifig = item
                    .item_type
                    .as_deref()
                    .is_some_and(|t| t.eq_ignore_ascii_case("MINIFIG"));
                out.push(CompositionLine {
                    item_id: item.no,
                    color_id: if is_minifig {
                        None
                    } else {
                        color_id.map(WireId::into_string)
                    },
                    quantity,
                    kind: if is_minifig {
                        ItemKind::Minifig
                    } else {
                        ItemKind::Part
                    },
                    name: item.name,
                });
                0
            }
            WireLine::Flat {
                part_num,
                color_id,
                quantity,
                part_name,
            } => {
                out.push(CompositionLine {
                    item_id: part_num,
                    color_id: color_id.map(WireId::into_string),
                    quantity,
                    kind: ItemKind::Part,
                    name: part_name,
                });
                0
            }
            WireLine::FigureRef {
                set_num,
                quantity,
                set_name,
            } => {
                let mut line = CompositionLine::minifig(set_num, quantity);
                line.name = set_name;
                out.push(line);
                0
            }
            WireLine::Group { entries } => entries
                .into_iter()
                .map(|entry| entry.into_lines(out))
                .sum(),
            WireLine::Unrecognized(_) => 1,
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WirePage {
    /// `{"results": [...], "next": "<url>" | null}`
    Paged {
        results: Vec<WireLine>,
        #[serde(default)]
        next: Option<String>,
    },
    /// `{"data": [...]}`
    Data { data: Vec<WireLine> },
    /// `[...]`
    Bare(Vec<WireLine>),
}

/// Decoded page contents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedPage {
    pub lines: Vec<CompositionLine>,
    pub next: Option<String>,
    /// Entries that matched no known line shape
    pub unrecognized: usize,
}

impl WirePage {
    pub fn decode(self) -> DecodedPage {
        let (entries, next) = match self {
            WirePage::Paged { results, next } => (results, next.filter(|n| !n.is_empty())),
            WirePage::Data { data } => (data, None),
            WirePage::Bare(entries) => (entries, None),
        };
        let mut lines = Vec::with_capacity(entries.len());
        let unrecognized = entries
            .into_iter()
            .map(|entry| entry.into_lines(&mut lines))
            .sum();
        DecodedPage {
            lines,
            next,
            unrecognized,
        }
    }
}

/// Parse a response body into a decoded page
pub fn decode_page(body: &str) -> Result<DecodedPage, serde_json::Error> {
    serde_json::from_str::<WirePage>(body).map(WirePage::decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(body: &str) -> CompositionLine {
        let page = decode_page(body).unwrap();
        assert_eq!(page.lines.len(), 1, "body: {}", body);
        page.lines.into_iter().next().unwrap()
    }

    #[test]
    fn test_line_shapes_decode_to_same_line() {
        let nested = single(
            r#"{"results": [{"part": {"part_num": "3626", "name": "Head"}, "color": {"id": 14}, "quantity": 1}], "next": null}"#,
        );
        let flat = single(r#"[{"part_num": "3626", "color_id": "14", "quantity": 1, "part_name": "Head"}]"#);
        let market = single(
            r#"{"data": [{"item": {"no": "3626", "name": "Head", "type": "PART"}, "color_id": 14, "quantity": 1}]}"#,
        );
        assert_eq!(nested, flat);
        assert_eq!(flat, market);
        assert_eq!(nested.color_id.as_deref(), Some("14"));
        assert_eq!(nested.name.as_deref(), Some("Head"));
    }

    #[test]
    fn test_marketplace_minifig_and_groups() {
        let page = decode_page(
            r#"{"data": [
                {"match_no": 0, "entries": [
                    {"item": {"no": "sw0001", "type": "MINIFIG"}, "color_id": 0, "quantity": 2},
                    {"item": {"no": "3001", "type": "PART"}, "color_id": 5, "quantity": 1, "is_alternate": true}
                ]},
                {"item": {"no": "3002", "type": "PART"}, "color_id": 5, "quantity": 4}
            ]}"#,
        )
        .unwrap();
        assert_eq!(page.lines.len(), 2);
        assert_eq!(page.lines[0].kind, ItemKind::Minifig);
        assert_eq!(page.lines[0].color_id, None);
        assert_eq!(page.lines[0].quantity, 2);
        assert_eq!(page.lines[1].item_id, "3002");
    }

    #[test]
    fn test_figure_refs_and_next_link() {
        let page = decode_page(
            r#"{"results": [{"set_num": "fig-000123", "quantity": 1, "set_name": "Pilot"}],
                "next": "https://example.test/page2"}"#,
        )
        .unwrap();
        assert_eq!(page.lines[0].kind, ItemKind::Minifig);
        assert_eq!(page.lines[0].item_id, "fig-000123");
        assert_eq!(page.next.as_deref(), Some("https://example.test/page2"));
    }

    #[test]
    fn test_unrecognized_entries_counted_not_fatal() {
        let page = decode_page(r#"[{"unexpected": true}, {"part_num": "3001", "quantity": 1}]"#).unwrap();
        assert_eq!(page.unrecognized, 1);
        assert_eq!(page.lines.len(), 1);
        assert_eq!(page.lines[0].color_id, None);
    }

    #[test]
    fn test_non_listing_body_is_error() {
        assert!(decode_page(r#"{"detail": "Not found."}"#).is_err());
        assert!(decode_page("not json").is_err());
    }
}
