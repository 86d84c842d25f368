//! Explicit style configuration for the layout engine and both renderers.
//!
//! Nothing in the engine reads a global constant for sizes or spacing: every
//! value flows from a [`StyleConfig`], which defaults to the embedded IEEE
//! conference preset.

use papersetter_style_contract::{IEEE_CONFERENCE_PRESET_ID, SIZE_KEYS, preset_json};
use serde::Serialize;
use serde_json::Value;

use crate::error::RenderError;
use crate::types::{Margins, Pt, Rect, Size};

/// The size enum shared by figures, tables and equations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockSize {
    VerySmall,
    Small,
    Medium,
    Large,
}

impl BlockSize {
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase().replace([' ', '_'], "-");
        match key.as_str() {
            "very-small" | "verysmall" | "xs" => Some(BlockSize::VerySmall),
            "small" | "s" => Some(BlockSize::Small),
            "medium" | "m" => Some(BlockSize::Medium),
            "large" | "l" => Some(BlockSize::Large),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        SIZE_KEYS[self.index()]
    }

    fn index(self) -> usize {
        match self {
            BlockSize::VerySmall => 0,
            BlockSize::Small => 1,
            BlockSize::Medium => 2,
            BlockSize::Large => 3,
        }
    }
}

/// One multiplier per [`BlockSize`], applied to the column width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizeTable([f32; 4]);

impl SizeTable {
    pub fn new(very_small: f32, small: f32, medium: f32, large: f32) -> Self {
        Self([very_small, small, medium, large])
    }

    pub fn fraction(&self, size: BlockSize) -> f32 {
        self.0[size.index()]
    }

    pub fn apply(&self, size: BlockSize, width: Pt) -> Pt {
        width * self.fraction(size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FontSet {
    pub regular: String,
    pub bold: String,
    pub italic: String,
    pub bold_italic: String,
    /// Family name written into DOCX run properties.
    pub docx_family: String,
}

impl FontSet {
    pub fn pick(&self, bold: bool, italic: bool) -> &str {
        match (bold, italic) {
            (true, true) => &self.bold_italic,
            (true, false) => &self.bold,
            (false, true) => &self.italic,
            (false, false) => &self.regular,
        }
    }

    pub fn is_bold(&self, family: &str) -> bool {
        family == self.bold || family == self.bold_italic
    }

    pub fn is_italic(&self, family: &str) -> bool {
        family == self.italic || family == self.bold_italic
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleConfig {
    pub preset_id: String,
    pub page_size: Size,
    pub margins: Margins,
    pub columns: usize,
    pub column_gutter: Pt,
    pub fonts: FontSet,
    pub title_size: Pt,
    pub author_size: Pt,
    pub body_size: Pt,
    pub heading_size: Pt,
    pub caption_size: Pt,
    pub reference_size: Pt,
    pub footer_size: Pt,
    pub body_leading: Pt,
    pub element_spacing: Pt,
    pub section_gap: Pt,
    pub title_after: Pt,
    pub front_matter_after: Pt,
    pub hanging_indent: Pt,
    pub figure_width_fractions: SizeTable,
    pub table_height_fractions: SizeTable,
    pub equation_height_fractions: SizeTable,
    pub max_figure_height: Pt,
    pub authors_per_row: usize,
    pub page_ceiling: usize,
    pub copyright_notice: String,
}

impl StyleConfig {
    pub fn ieee_conference() -> Result<Self, RenderError> {
        let json = preset_json(IEEE_CONFERENCE_PRESET_ID).ok_or_else(|| {
            RenderError::InvalidConfiguration(format!(
                "style preset {IEEE_CONFERENCE_PRESET_ID} is not embedded"
            ))
        })?;
        Self::from_preset_json(json)
    }

    pub fn from_preset_json(json: &str) -> Result<Self, RenderError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|err| RenderError::InvalidConfiguration(format!("style preset: {err}")))?;
        let reader = PresetReader { root: &value };
        let style = StyleConfig {
            preset_id: reader.string(&["id"])?,
            page_size: Size {
                width: reader.pt(&["page", "width"])?,
                height: reader.pt(&["page", "height"])?,
            },
            margins: Margins {
                top: reader.pt(&["margins", "top"])?,
                right: reader.pt(&["margins", "right"])?,
                bottom: reader.pt(&["margins", "bottom"])?,
                left: reader.pt(&["margins", "left"])?,
            },
            columns: reader.count(&["columns"])?,
            column_gutter: reader.pt(&["column_gutter"])?,
            fonts: FontSet {
                regular: reader.string(&["fonts", "regular"])?,
                bold: reader.string(&["fonts", "bold"])?,
                italic: reader.string(&["fonts", "italic"])?,
                bold_italic: reader.string(&["fonts", "bold_italic"])?,
                docx_family: reader.string(&["fonts", "docx_family"])?,
            },
            title_size: reader.pt(&["sizes", "title"])?,
            author_size: reader.pt(&["sizes", "author"])?,
            body_size: reader.pt(&["sizes", "body"])?,
            heading_size: reader.pt(&["sizes", "heading"])?,
            caption_size: reader.pt(&["sizes", "caption"])?,
            reference_size: reader.pt(&["sizes", "reference"])?,
            footer_size: reader.pt(&["sizes", "footer"])?,
            body_leading: reader.pt(&["body_leading"])?,
            element_spacing: reader.pt(&["spacing", "element"])?,
            section_gap: reader.pt(&["spacing", "section_gap"])?,
            title_after: reader.pt(&["spacing", "title_after"])?,
            front_matter_after: reader.pt(&["spacing", "front_matter_after"])?,
            hanging_indent: reader.pt(&["spacing", "hanging_indent"])?,
            figure_width_fractions: reader.size_table("figure_width_fractions")?,
            table_height_fractions: reader.size_table("table_height_fractions")?,
            equation_height_fractions: reader.size_table("equation_height_fractions")?,
            max_figure_height: reader.pt(&["max_figure_height"])?,
            authors_per_row: reader.count(&["authors_per_row"])?,
            page_ceiling: reader.count(&["page_ceiling"])?,
            copyright_notice: reader.string(&["copyright_notice"])?,
        };
        style.validate()?;
        Ok(style)
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        let positive = [
            ("page_size.width", self.page_size.width),
            ("page_size.height", self.page_size.height),
            ("title_size", self.title_size),
            ("author_size", self.author_size),
            ("body_size", self.body_size),
            ("heading_size", self.heading_size),
            ("caption_size", self.caption_size),
            ("reference_size", self.reference_size),
            ("footer_size", self.footer_size),
            ("body_leading", self.body_leading),
            ("max_figure_height", self.max_figure_height),
        ];
        for (name, value) in positive {
            if value <= Pt::ZERO {
                return Err(invalid(format!("{name} must be positive")));
            }
        }
        let non_negative = [
            ("margins.top", self.margins.top),
            ("margins.right", self.margins.right),
            ("margins.bottom", self.margins.bottom),
            ("margins.left", self.margins.left),
            ("column_gutter", self.column_gutter),
            ("element_spacing", self.element_spacing),
            ("section_gap", self.section_gap),
            ("title_after", self.title_after),
            ("front_matter_after", self.front_matter_after),
            ("hanging_indent", self.hanging_indent),
        ];
        for (name, value) in non_negative {
            if value < Pt::ZERO {
                return Err(invalid(format!("{name} must not be negative")));
            }
        }
        if self.columns == 0 {
            return Err(invalid("columns must be at least 1".to_string()));
        }
        if self.authors_per_row == 0 {
            return Err(invalid("authors_per_row must be at least 1".to_string()));
        }
        if self.page_ceiling == 0 {
            return Err(invalid("page_ceiling must be at least 1".to_string()));
        }
        if self.column_width() <= Pt::ZERO {
            return Err(invalid(
                "margins and column_gutter leave no room for a column".to_string(),
            ));
        }
        if self.body_area().height < self.body_leading {
            return Err(invalid("margins leave no room for a single line".to_string()));
        }
        for (name, table) in [
            ("figure_width_fractions", self.figure_width_fractions),
            ("table_height_fractions", self.table_height_fractions),
            ("equation_height_fractions", self.equation_height_fractions),
        ] {
            for size in [
                BlockSize::VerySmall,
                BlockSize::Small,
                BlockSize::Medium,
                BlockSize::Large,
            ] {
                let fraction = table.fraction(size);
                if !(fraction > 0.0 && fraction <= 1.0) {
                    return Err(invalid(format!(
                        "{name}.{} must be in (0, 1], got {fraction}",
                        size.key()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Same style with another body size; leading keeps its ratio to the body.
    pub fn with_body_size(&self, size: Pt) -> StyleConfig {
        let mut next = self.clone();
        next.body_leading = self.body_leading.mul_ratio(
            size.to_milli_i64() as i32,
            self.body_size.to_milli_i64() as i32,
        );
        next.body_size = size;
        next
    }

    pub fn with_columns(&self, columns: usize) -> StyleConfig {
        let mut next = self.clone();
        next.columns = columns;
        next
    }

    /// Every text role keeps the body's leading-to-size ratio.
    pub fn line_height(&self, size: Pt) -> Pt {
        leading_for(size, self.body_size, self.body_leading)
    }

    /// The area inside the page margins.
    pub fn body_area(&self) -> Rect {
        Rect {
            x: self.margins.left,
            y: self.margins.top,
            width: self.page_size.width - self.margins.left - self.margins.right,
            height: self.page_size.height - self.margins.top - self.margins.bottom,
        }
    }

    pub fn content_width(&self) -> Pt {
        self.body_area().width
    }

    pub fn column_width(&self) -> Pt {
        let columns = self.columns.max(1) as i32;
        (self.content_width() - self.column_gutter * (columns - 1)) / columns
    }

    pub fn column_x(&self, column: usize) -> Pt {
        self.margins.left + (self.column_width() + self.column_gutter) * column as i32
    }

    pub fn page_bottom(&self) -> Pt {
        self.page_size.height - self.margins.bottom
    }
}

pub(crate) fn leading_for(size: Pt, body_size: Pt, body_leading: Pt) -> Pt {
    size.mul_ratio(
        body_leading.to_milli_i64() as i32,
        body_size.to_milli_i64() as i32,
    )
}

fn invalid(message: String) -> RenderError {
    RenderError::InvalidConfiguration(message)
}

struct PresetReader<'a> {
    root: &'a Value,
}

impl PresetReader<'_> {
    fn lookup(&self, path: &[&str]) -> Result<&Value, RenderError> {
        let mut node = self.root;
        for key in path {
            node = node
                .get(*key)
                .ok_or_else(|| invalid(format!("style preset is missing {}", path.join("."))))?;
        }
        Ok(node)
    }

    fn number(&self, path: &[&str]) -> Result<f64, RenderError> {
        self.lookup(path)?
            .as_f64()
            .ok_or_else(|| invalid(format!("style preset {} must be a number", path.join("."))))
    }

    fn pt(&self, path: &[&str]) -> Result<Pt, RenderError> {
        Ok(Pt::from_f32(self.number(path)? as f32))
    }

    fn count(&self, path: &[&str]) -> Result<usize, RenderError> {
        self.lookup(path)?
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| invalid(format!("style preset {} must be an integer", path.join("."))))
    }

    fn string(&self, path: &[&str]) -> Result<String, RenderError> {
        self.lookup(path)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("style preset {} must be a string", path.join("."))))
    }

    fn size_table(&self, name: &str) -> Result<SizeTable, RenderError> {
        let mut values = [0.0f32; 4];
        for (slot, key) in values.iter_mut().zip(SIZE_KEYS) {
            *slot = self.number(&[name, key])? as f32;
        }
        Ok(SizeTable(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ieee() -> StyleConfig {
        StyleConfig::ieee_conference().expect("embedded preset")
    }

    #[test]
    fn embedded_preset_matches_ieee_geometry() {
        let style = ieee();
        assert_eq!(style.page_size, Size::letter());
        assert_eq!(style.margins, Margins::all(54.0));
        assert_eq!(style.columns, 2);
        assert_eq!(style.title_size, Pt::from_i32(24));
        assert_eq!(style.body_size, Pt::from_f32(9.5));
        assert_eq!(style.body_leading, Pt::from_i32(10));
        assert_eq!(style.fonts.docx_family, "Times New Roman");
    }

    #[test]
    fn column_geometry_splits_content_width() {
        let style = ieee();
        // (612 - 108 - 18) / 2
        assert_eq!(style.column_width(), Pt::from_i32(243));
        assert_eq!(style.column_x(0), Pt::from_i32(54));
        assert_eq!(style.column_x(1), Pt::from_i32(315));
        assert_eq!(style.page_bottom(), Pt::from_i32(738));

        let single = style.with_columns(1);
        assert_eq!(single.column_width(), Pt::from_i32(504));
    }

    #[test]
    fn body_size_override_keeps_leading_ratio() {
        let style = ieee().with_body_size(Pt::from_i32(10));
        assert_eq!(style.body_size, Pt::from_i32(10));
        assert_eq!(style.body_leading.to_milli_i64(), 10_526);
        assert_eq!(style.line_height(Pt::from_i32(10)), style.body_leading);
        assert_eq!(ieee().line_height(Pt::from_f32(9.5)), Pt::from_i32(10));
        assert_eq!(ieee().line_height(Pt::from_i32(8)).to_milli_i64(), 8_421);
    }

    #[test]
    fn size_tables_follow_the_size_enum() {
        let style = ieee();
        let width = style.column_width();
        let small = style.figure_width_fractions.apply(BlockSize::Small, width);
        let large = style.figure_width_fractions.apply(BlockSize::Large, width);
        assert!(small < large);
        assert_eq!(BlockSize::parse("Very Small"), Some(BlockSize::VerySmall));
        assert_eq!(BlockSize::parse("very_small"), Some(BlockSize::VerySmall));
        assert_eq!(BlockSize::parse("huge"), None);
        assert_eq!(BlockSize::Medium.key(), "medium");
    }

    #[test]
    fn validation_rejects_degenerate_geometry() {
        let mut style = ieee();
        style.margins = Margins::all(400.0);
        let err = style.validate().unwrap_err();
        assert!(err.to_string().contains("no room"));

        let mut style = ieee();
        style.columns = 0;
        assert!(style.validate().is_err());

        let mut style = ieee();
        style.figure_width_fractions = SizeTable::new(0.0, 0.5, 0.7, 0.9);
        assert!(style.validate().unwrap_err().to_string().contains("very-small"));
    }

    #[test]
    fn incomplete_preset_reports_missing_key() {
        let err = StyleConfig::from_preset_json(r#"{"id": "x"}"#).unwrap_err();
        assert_eq!(err.code(), "INVALID_CONFIGURATION");
        assert!(err.to_string().contains("page.width"));
    }

    #[test]
    fn font_set_picks_variants() {
        let fonts = ieee().fonts;
        assert_eq!(fonts.pick(true, false), "Times-Bold");
        assert_eq!(fonts.pick(false, true), "Times-Italic");
        assert!(fonts.is_bold("Times-BoldItalic"));
        assert!(!fonts.is_italic("Times-Roman"));
    }
}
