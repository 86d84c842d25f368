//! Content Model Normalizer.
//!
//! Turns the lenient editor model into a fully resolved document: sanitised
//! text, explicit absent values, unique sibling orders, typed blocks and
//! parsed settings. Validation failures stop here, before any layout work.

use serde::Serialize;
use std::collections::HashSet;

use crate::error::{LayoutError, Location, RenderError, RenderWarning, ValidationError};
use crate::model::{ContentBlock, Document, DocumentSettings, Section};
use crate::style::BlockSize;
use crate::text::{non_empty, non_empty_plain, sanitize};
use crate::types::Pt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Docx,
    Pdf,
}

impl ExportFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Pdf => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Docx => "docx",
            ExportFormat::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FigurePosition {
    Top,
    Here,
    Bottom,
}

impl FigurePosition {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "top" => Some(FigurePosition::Top),
            "here" | "inline" | "" => Some(FigurePosition::Here),
            "bottom" => Some(FigurePosition::Bottom),
            _ => None,
        }
    }
}

/// Per-render settings. `None` keeps the style's own value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSettings {
    pub body_size: Option<Pt>,
    pub columns: Option<usize>,
    pub export_format: ExportFormat,
    pub include_page_numbers: bool,
    pub include_copyright: bool,
}

impl RenderSettings {
    pub fn parse(raw: &DocumentSettings) -> Result<Self, ValidationError> {
        Ok(Self {
            body_size: parse_font_size(&raw.font_size)?,
            columns: parse_columns(&raw.columns)?,
            export_format: parse_export_format(&raw.export_format)?,
            include_page_numbers: raw.include_page_numbers,
            include_copyright: raw.include_copyright,
        })
    }
}

fn parse_font_size(raw: &str) -> Result<Option<Pt>, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let number = trimmed.strip_suffix("pt").unwrap_or(trimmed).trim();
    match number.parse::<f32>() {
        Ok(size) if size > 0.0 && size <= 72.0 => Ok(Some(Pt::from_f32(size))),
        _ => Err(ValidationError::InvalidSetting {
            field: "fontSize",
            value: raw.to_string(),
        }),
    }
}

fn parse_columns(raw: &str) -> Result<Option<usize>, ValidationError> {
    match raw.trim() {
        "" => Ok(None),
        "1" => Ok(Some(1)),
        "2" => Ok(Some(2)),
        _ => Err(ValidationError::InvalidSetting {
            field: "columns",
            value: raw.to_string(),
        }),
    }
}

fn parse_export_format(raw: &str) -> Result<ExportFormat, ValidationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "pdf" => Ok(ExportFormat::Pdf),
        "docx" | "word" => Ok(ExportFormat::Docx),
        _ => Err(ValidationError::InvalidSetting {
            field: "exportFormat",
            value: raw.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedAuthor {
    pub name: String,
    /// Affiliation lines in display order.
    pub details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageBlock {
    pub data: String,
    pub caption: Option<String>,
    pub size: BlockSize,
    pub position: FigurePosition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Block {
    Text {
        text: String,
    },
    Image(ImageBlock),
    Table {
        rows: Vec<Vec<String>>,
        caption: Option<String>,
        size: BlockSize,
    },
    Equation {
        text: String,
        size: BlockSize,
    },
}

impl Block {
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Text { .. } => "text",
            Block::Image(_) => "image",
            Block::Table { .. } => "table",
            Block::Equation { .. } => "equation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedBlock {
    pub id: String,
    pub order: i64,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSubsection {
    pub id: String,
    pub title: String,
    pub content: Option<String>,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSection {
    pub id: String,
    pub title: String,
    pub order: i64,
    pub blocks: Vec<NormalizedBlock>,
    pub subsections: Vec<NormalizedSubsection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedReference {
    pub id: String,
    pub text: String,
    pub order: i64,
    /// The order the caller sent, kept for gap/duplicate reporting.
    pub declared_order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedFigure {
    pub id: String,
    pub order: i64,
    /// Index into `sections`, resolved from the weak `sectionId` link.
    pub section_index: Option<usize>,
    pub image: ImageBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedDocument {
    pub title: String,
    pub abstract_text: Option<String>,
    pub keywords: Option<String>,
    pub authors: Vec<NormalizedAuthor>,
    pub sections: Vec<NormalizedSection>,
    pub references: Vec<NormalizedReference>,
    pub figures: Vec<NormalizedFigure>,
    pub settings: RenderSettings,
    pub warnings: Vec<RenderWarning>,
}

pub fn normalize(doc: &Document) -> Result<NormalizedDocument, RenderError> {
    let title = sanitize(&doc.title);
    if title.is_empty() {
        return Err(ValidationError::MissingTitle.into());
    }
    let authors: Vec<NormalizedAuthor> = doc
        .authors
        .iter()
        .filter_map(|author| {
            let name = sanitize(&author.name);
            if name.is_empty() {
                return None;
            }
            let mut details = Vec::new();
            details.extend(non_empty(author.department.as_deref()));
            details.extend(non_empty(author.organization.as_deref()));
            let place: Vec<String> = [author.city.as_deref(), author.state.as_deref()]
                .into_iter()
                .filter_map(non_empty)
                .collect();
            if !place.is_empty() {
                details.push(place.join(", "));
            }
            details.extend(non_empty(author.email.as_deref()));
            for field in &author.custom_fields {
                details.extend(non_empty(Some(field.value.as_str())));
            }
            Some(NormalizedAuthor { name, details })
        })
        .collect();
    if authors.is_empty() {
        return Err(ValidationError::MissingAuthor.into());
    }
    let settings = RenderSettings::parse(&doc.settings)?;

    let mut warnings = Vec::new();

    let section_orders = resolve_orders(
        "section",
        &doc.sections.iter().map(|s| s.order).collect::<Vec<_>>(),
        &mut warnings,
    );
    let mut sections = Vec::with_capacity(doc.sections.len());
    for (position, (raw_index, order)) in sorted_by_order(&section_orders).into_iter().enumerate()
    {
        let raw = &doc.sections[raw_index];
        sections.push(normalize_section(raw, position, order, &mut warnings)?);
    }

    // Reference numbers follow the array; declared orders only feed the
    // gap/duplicate warnings raised when they are numbered.
    let references = doc
        .references
        .iter()
        .filter_map(|raw| {
            let text = sanitize(&raw.text);
            if text.is_empty() {
                return None;
            }
            Some((raw, text))
        })
        .enumerate()
        .map(|(position, (raw, text))| NormalizedReference {
            id: raw.id.clone(),
            text,
            order: position as i64,
            declared_order: raw.order,
        })
        .collect();

    let figure_orders = resolve_orders(
        "figure",
        &doc.figures.iter().map(|f| f.order).collect::<Vec<_>>(),
        &mut warnings,
    );
    let mut figures = Vec::with_capacity(doc.figures.len());
    for (raw_index, order) in sorted_by_order(&figure_orders) {
        let raw = &doc.figures[raw_index];
        let section_index = match raw.section_id.as_deref().filter(|id| !id.is_empty()) {
            None => None,
            Some(id) => {
                let found = sections.iter().position(|section| section.id == id);
                if found.is_none() {
                    let message =
                        format!("figure '{}' references unknown section '{id}'", raw.id);
                    log::warn!("{message}");
                    warnings.push(RenderWarning::new("NORMALIZE_UNKNOWN_FIGURE_SECTION", message));
                }
                found
            }
        };
        let location = Location::element(section_index, raw.id.clone());
        figures.push(NormalizedFigure {
            id: raw.id.clone(),
            order,
            section_index,
            image: image_block(
                Some(raw.data.as_str()),
                Some(raw.caption.as_str()),
                raw.size.as_deref(),
                raw.position.as_deref(),
                location,
                &mut warnings,
            )?,
        });
    }

    Ok(NormalizedDocument {
        title,
        abstract_text: non_empty(doc.abstract_text.as_deref()),
        keywords: non_empty(doc.keywords.as_deref()),
        authors,
        sections,
        references,
        figures,
        settings,
        warnings,
    })
}

fn normalize_section(
    raw: &Section,
    index: usize,
    order: i64,
    warnings: &mut Vec<RenderWarning>,
) -> Result<NormalizedSection, RenderError> {
    let mut blocks = Vec::new();
    if raw.content_blocks.is_empty() {
        let legacy = non_empty(raw.content.as_deref()).or_else(|| non_empty(raw.body.as_deref()));
        if let Some(text) = legacy {
            blocks.push(NormalizedBlock {
                id: format!("{}-content", raw.id),
                order: 0,
                block: Block::Text { text },
            });
        }
    } else {
        let orders = resolve_orders(
            "content block",
            &raw.content_blocks.iter().map(|b| b.order).collect::<Vec<_>>(),
            warnings,
        );
        for (raw_index, order) in sorted_by_order(&orders) {
            let block = &raw.content_blocks[raw_index];
            normalize_block(block, index, order, &mut blocks, warnings)?;
        }
    }

    let sub_orders = resolve_orders(
        "subsection",
        &raw.subsections.iter().map(|s| s.order).collect::<Vec<_>>(),
        warnings,
    );
    let subsections = sorted_by_order(&sub_orders)
        .into_iter()
        .map(|(raw_index, order)| {
            let sub = &raw.subsections[raw_index];
            NormalizedSubsection {
                id: sub.id.clone(),
                title: sanitize(&sub.title),
                content: non_empty(Some(sub.content.as_str())),
                order,
            }
        })
        .collect();

    Ok(NormalizedSection {
        id: raw.id.clone(),
        title: sanitize(&raw.title),
        order,
        blocks,
        subsections,
    })
}

fn normalize_block(
    raw: &ContentBlock,
    section_index: usize,
    order: i64,
    out: &mut Vec<NormalizedBlock>,
    warnings: &mut Vec<RenderWarning>,
) -> Result<(), RenderError> {
    let location = Location::element(Some(section_index), raw.id.clone());
    let size = parse_size(raw.size.as_deref(), &location, warnings);
    match raw.block_type.trim().to_ascii_lowercase().as_str() {
        "text" | "paragraph" => {
            if let Some(text) = non_empty(raw.content.as_deref()) {
                out.push(NormalizedBlock {
                    id: raw.id.clone(),
                    order,
                    block: Block::Text { text },
                });
            }
            // The editor lets a paragraph carry an inline picture.
            if raw.data.as_deref().is_some_and(|d| !d.trim().is_empty()) {
                out.push(NormalizedBlock {
                    id: format!("{}-image", raw.id),
                    order,
                    block: Block::Image(image_block(
                        raw.data.as_deref(),
                        raw.caption.as_deref(),
                        raw.size.as_deref(),
                        raw.position.as_deref(),
                        location,
                        warnings,
                    )?),
                });
            }
        }
        "image" | "figure" => out.push(NormalizedBlock {
            id: raw.id.clone(),
            order,
            block: Block::Image(image_block(
                raw.data.as_deref(),
                raw.caption.as_deref(),
                raw.size.as_deref(),
                raw.position.as_deref(),
                location,
                warnings,
            )?),
        }),
        "table" => {
            let rows = match &raw.rows {
                Some(rows) => rows
                    .iter()
                    .map(|row| row.iter().map(|cell| sanitize(cell)).collect::<Vec<_>>())
                    .filter(|row| !row.is_empty())
                    .collect::<Vec<_>>(),
                None => rows_from_text(raw.content.as_deref().unwrap_or_default()),
            };
            if rows.is_empty() {
                return Err(LayoutError::MissingBlockData {
                    block_type: "table",
                    location,
                }
                .into());
            }
            out.push(NormalizedBlock {
                id: raw.id.clone(),
                order,
                block: Block::Table {
                    rows,
                    caption: non_empty(raw.caption.as_deref()),
                    size,
                },
            });
        }
        "equation" | "math" => {
            let Some(text) = non_empty_plain(raw.content.as_deref()) else {
                return Err(LayoutError::MissingBlockData {
                    block_type: "equation",
                    location,
                }
                .into());
            };
            out.push(NormalizedBlock {
                id: raw.id.clone(),
                order,
                block: Block::Equation { text, size },
            });
        }
        other => {
            return Err(LayoutError::UnknownBlockType {
                block_type: other.to_string(),
                location,
            }
            .into());
        }
    }
    Ok(())
}

fn image_block(
    data: Option<&str>,
    caption: Option<&str>,
    size: Option<&str>,
    position: Option<&str>,
    location: Location,
    warnings: &mut Vec<RenderWarning>,
) -> Result<ImageBlock, RenderError> {
    let data = data.map(str::trim).unwrap_or_default();
    if data.is_empty() {
        return Err(LayoutError::MissingBlockData {
            block_type: "image",
            location,
        }
        .into());
    }
    let size = parse_size(size, &location, warnings);
    let position = match position {
        None => FigurePosition::Here,
        Some(raw) => FigurePosition::parse(raw).unwrap_or_else(|| {
            let message = format!("unknown figure position '{raw}' at {location}; using here");
            log::warn!("{message}");
            warnings.push(RenderWarning::new("NORMALIZE_UNKNOWN_POSITION", message));
            FigurePosition::Here
        }),
    };
    Ok(ImageBlock {
        data: data.to_string(),
        caption: non_empty(caption),
        size,
        position,
    })
}

fn parse_size(
    raw: Option<&str>,
    location: &Location,
    warnings: &mut Vec<RenderWarning>,
) -> BlockSize {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => BlockSize::Medium,
        Some(raw) => BlockSize::parse(raw).unwrap_or_else(|| {
            let message = format!("unknown size '{raw}' at {location}; using medium");
            log::warn!("{message}");
            warnings.push(RenderWarning::new("NORMALIZE_UNKNOWN_SIZE", message));
            BlockSize::Medium
        }),
    }
}

/// Rows from pipe- or tab-separated text, one row per line.
fn rows_from_text(text: &str) -> Vec<Vec<String>> {
    sanitize(text)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let separator = if line.contains('|') { '|' } else { '\t' };
            line.trim()
                .trim_matches('|')
                .split(separator)
                .map(|cell| cell.trim().to_string())
                .collect()
        })
        .collect()
}

/// Declared orders when every sibling has one and none repeat; otherwise
/// array indices for the whole collection.
fn resolve_orders(
    collection: &str,
    declared: &[Option<i64>],
    warnings: &mut Vec<RenderWarning>,
) -> Vec<i64> {
    let mut seen = HashSet::new();
    let usable = declared
        .iter()
        .all(|order| order.is_some_and(|value| seen.insert(value)));
    if usable {
        return declared.iter().flatten().copied().collect();
    }
    if declared.iter().any(Option::is_some) {
        let message =
            format!("{collection} order values are missing or repeated; using array order");
        log::warn!("{message}");
        warnings.push(RenderWarning::new("NORMALIZE_ORDER_FALLBACK", message));
    }
    (0..declared.len() as i64).collect()
}

/// `(original index, order)` pairs sorted by order; ties keep array order.
fn sorted_by_order(orders: &[i64]) -> Vec<(usize, i64)> {
    let mut pairs: Vec<(usize, i64)> = orders.iter().copied().enumerate().collect();
    pairs.sort_by_key(|(index, order)| (*order, *index));
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, Figure, Reference, Subsection};

    fn block(id: &str, kind: &str, content: &str, order: Option<i64>) -> ContentBlock {
        ContentBlock {
            id: id.to_string(),
            block_type: kind.to_string(),
            content: Some(content.to_string()),
            order,
            ..ContentBlock::default()
        }
    }

    fn base() -> Document {
        Document {
            title: "Quantum Computing".to_string(),
            authors: vec![Author {
                name: "Ada Lovelace".to_string(),
                department: Some("Dept. of Mathematics".to_string()),
                city: Some("London".to_string()),
                state: Some(" ".to_string()),
                ..Author::default()
            }],
            ..Document::default()
        }
    }

    #[test]
    fn missing_title_fails_validation() {
        let mut doc = base();
        doc.title = "   ".to_string();
        let err = normalize(&doc).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_MISSING_TITLE");
    }

    #[test]
    fn authors_without_names_do_not_count() {
        let mut doc = base();
        doc.authors = vec![Author::default(), Author {
            name: "  ".to_string(),
            ..Author::default()
        }];
        let err = normalize(&doc).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Validation(ValidationError::MissingAuthor)
        ));
    }

    #[test]
    fn blank_optional_text_becomes_absent() {
        let mut doc = base();
        doc.abstract_text = Some("  ".to_string());
        doc.keywords = Some("qubits, <b>error</b> correction".to_string());
        let normalized = normalize(&doc).unwrap();
        assert_eq!(normalized.abstract_text, None);
        assert_eq!(normalized.keywords.as_deref(), Some("qubits, error correction"));
        assert_eq!(
            normalized.authors[0].details,
            vec!["Dept. of Mathematics".to_string(), "London".to_string()]
        );
    }

    #[test]
    fn sections_and_blocks_follow_declared_order() {
        let mut doc = base();
        doc.sections = vec![
            Section {
                id: "b".to_string(),
                title: "Second".to_string(),
                order: Some(2),
                ..Section::default()
            },
            Section {
                id: "a".to_string(),
                title: "First".to_string(),
                order: Some(1),
                content_blocks: vec![
                    block("x2", "text", "later", Some(5)),
                    block("x1", "text", "sooner", Some(3)),
                ],
                subsections: vec![
                    Subsection {
                        id: "s2".to_string(),
                        title: "Two".to_string(),
                        content: "b".to_string(),
                        order: Some(1),
                    },
                    Subsection {
                        id: "s1".to_string(),
                        title: "One".to_string(),
                        content: "a".to_string(),
                        order: Some(0),
                    },
                ],
                ..Section::default()
            },
        ];
        let normalized = normalize(&doc).unwrap();
        let ids: Vec<&str> = normalized.sections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        let blocks: Vec<&str> = normalized.sections[0].blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(blocks, vec!["x1", "x2"]);
        let subs: Vec<&str> = normalized.sections[0].subsections.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(subs, vec!["s1", "s2"]);
        assert!(normalized.warnings.is_empty());
    }

    #[test]
    fn duplicate_orders_fall_back_to_array_index() {
        let mut doc = base();
        doc.sections = vec![
            Section {
                id: "a".to_string(),
                title: "First".to_string(),
                order: Some(1),
                ..Section::default()
            },
            Section {
                id: "b".to_string(),
                title: "Second".to_string(),
                order: Some(1),
                ..Section::default()
            },
        ];
        let normalized = normalize(&doc).unwrap();
        let orders: Vec<i64> = normalized.sections.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![0, 1]);
        assert_eq!(normalized.warnings[0].code, "NORMALIZE_ORDER_FALLBACK");
    }

    #[test]
    fn references_keep_array_order_whatever_they_declare() {
        let mut doc = base();
        doc.references = vec![
            Reference {
                id: "r1".to_string(),
                text: "Stored first".to_string(),
                order: Some(2),
            },
            Reference {
                id: "r2".to_string(),
                text: " ".to_string(),
                order: Some(3),
            },
            Reference {
                id: "r3".to_string(),
                text: "Stored second".to_string(),
                order: Some(1),
            },
        ];
        let normalized = normalize(&doc).unwrap();
        let texts: Vec<&str> = normalized.references.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["Stored first", "Stored second"]);
        let orders: Vec<i64> = normalized.references.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 1]);
        assert_eq!(normalized.references[1].declared_order, Some(1));
        assert!(normalized.warnings.is_empty());
    }

    #[test]
    fn comparisons_survive_in_text_tables_and_equations() {
        let mut doc = base();
        let mut table = block("t1", "table", "", None);
        table.content = None;
        table.rows = Some(vec![
            vec!["Regime".to_string(), "Rate".to_string()],
            vec!["p < p_th".to_string(), "< 1%".to_string()],
        ]);
        doc.sections = vec![Section {
            id: "s".to_string(),
            title: "Threshold".to_string(),
            content_blocks: vec![
                block("b1", "text", "<p>The bound holds when p < p_th and d > 3.</p>", None),
                table,
                block("e1", "equation", "a < b, c > d", None),
            ],
            ..Section::default()
        }];
        let normalized = normalize(&doc).unwrap();
        let blocks: Vec<&Block> = normalized.sections[0].blocks.iter().map(|b| &b.block).collect();
        assert_eq!(
            blocks[0],
            &Block::Text {
                text: "The bound holds when p < p_th and d > 3.".to_string()
            }
        );
        let Block::Table { rows, .. } = blocks[1] else {
            panic!("expected a table");
        };
        assert_eq!(rows[1], vec!["p < p_th".to_string(), "< 1%".to_string()]);
        let Block::Equation { text, .. } = blocks[2] else {
            panic!("expected an equation");
        };
        assert_eq!(text, "a < b, c > d");
    }

    #[test]
    fn legacy_section_content_becomes_a_text_block() {
        let mut doc = base();
        doc.sections = vec![Section {
            id: "intro".to_string(),
            title: "Intro".to_string(),
            body: Some("<p>Legacy body</p>".to_string()),
            ..Section::default()
        }];
        let normalized = normalize(&doc).unwrap();
        assert_eq!(
            normalized.sections[0].blocks[0].block,
            Block::Text {
                text: "Legacy body".to_string()
            }
        );
    }

    #[test]
    fn unknown_block_type_is_a_layout_error_with_location() {
        let mut doc = base();
        doc.sections = vec![
            Section::default(),
            Section {
                id: "s".to_string(),
                content_blocks: vec![block("chart-1", "chart", "x", None)],
                ..Section::default()
            },
        ];
        let err = normalize(&doc).unwrap_err();
        assert_eq!(err.code(), "LAYOUT_UNKNOWN_BLOCK_TYPE");
        let location = err.location().unwrap();
        assert_eq!(location.section_index, Some(1));
        assert_eq!(location.element_id.as_deref(), Some("chart-1"));
    }

    #[test]
    fn tables_accept_rows_or_delimited_text() {
        let mut doc = base();
        let mut table = block("t1", "table", "| a | b |\n| 1 | 2 |", None);
        table.caption = Some("Results".to_string());
        doc.sections = vec![Section {
            id: "s".to_string(),
            content_blocks: vec![table],
            ..Section::default()
        }];
        let normalized = normalize(&doc).unwrap();
        match &normalized.sections[0].blocks[0].block {
            Block::Table { rows, caption, size } => {
                assert_eq!(rows, &vec![vec!["a", "b"], vec!["1", "2"]]);
                assert_eq!(caption.as_deref(), Some("Results"));
                assert_eq!(*size, BlockSize::Medium);
            }
            other => panic!("expected table, got {other:?}"),
        }
    }

    #[test]
    fn empty_equation_is_missing_data() {
        let mut doc = base();
        doc.sections = vec![Section {
            content_blocks: vec![block("e", "equation", " ", None)],
            ..Section::default()
        }];
        assert_eq!(normalize(&doc).unwrap_err().code(), "LAYOUT_MISSING_BLOCK_DATA");
    }

    #[test]
    fn figures_resolve_weak_section_links() {
        let mut doc = base();
        doc.sections = vec![Section {
            id: "s1".to_string(),
            ..Section::default()
        }];
        doc.figures = vec![
            Figure {
                id: "f1".to_string(),
                data: "AAAA".to_string(),
                caption: "Linked".to_string(),
                section_id: Some("s1".to_string()),
                position: Some("top".to_string()),
                size: Some("large".to_string()),
                ..Figure::default()
            },
            Figure {
                id: "f2".to_string(),
                data: "AAAA".to_string(),
                section_id: Some("gone".to_string()),
                size: Some("gigantic".to_string()),
                ..Figure::default()
            },
        ];
        let normalized = normalize(&doc).unwrap();
        assert_eq!(normalized.figures[0].section_index, Some(0));
        assert_eq!(normalized.figures[0].image.position, FigurePosition::Top);
        assert_eq!(normalized.figures[0].image.size, BlockSize::Large);
        assert_eq!(normalized.figures[1].section_index, None);
        assert_eq!(normalized.figures[1].image.caption, None);
        let codes: Vec<&str> = normalized.warnings.iter().map(|w| w.code).collect();
        assert!(codes.contains(&"NORMALIZE_UNKNOWN_FIGURE_SECTION"));
        assert!(codes.contains(&"NORMALIZE_UNKNOWN_SIZE"));
    }

    #[test]
    fn settings_are_parsed() {
        let mut doc = base();
        doc.settings.font_size = "10pt".to_string();
        doc.settings.columns = "1".to_string();
        doc.settings.export_format = "docx".to_string();
        let settings = normalize(&doc).unwrap().settings;
        assert_eq!(settings.body_size, Some(Pt::from_i32(10)));
        assert_eq!(settings.columns, Some(1));
        assert_eq!(settings.export_format, ExportFormat::Docx);

        doc.settings.columns = "3".to_string();
        let err = normalize(&doc).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_INVALID_SETTING");
        assert!(err.to_string().contains("columns"));
    }
}
