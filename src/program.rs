//! The Layout Program: every positioned element of a laid-out paper, in
//! document order. Both renderers consume it; neither measures text again.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::RenderWarning;
use crate::imaging::DecodedImage;
use crate::metrics::LineBox;
use crate::normalize::FigurePosition;
use crate::style::{BlockSize, FontSet};
use crate::types::{Margins, Pt, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextRole {
    Title,
    AuthorName,
    AuthorDetail,
    Abstract,
    Keywords,
    SectionHeading,
    SubsectionHeading,
    Body,
    Caption,
    ReferencesHeading,
    Reference,
    PageNumber,
    Copyright,
}

impl TextRole {
    pub fn as_str(self) -> &'static str {
        match self {
            TextRole::Title => "title",
            TextRole::AuthorName => "author_name",
            TextRole::AuthorDetail => "author_detail",
            TextRole::Abstract => "abstract",
            TextRole::Keywords => "keywords",
            TextRole::SectionHeading => "section_heading",
            TextRole::SubsectionHeading => "subsection_heading",
            TextRole::Body => "text",
            TextRole::Caption => "caption",
            TextRole::ReferencesHeading => "references_heading",
            TextRole::Reference => "reference",
            TextRole::PageNumber => "page_number",
            TextRole::Copyright => "copyright",
        }
    }

    /// Page furniture sits in the margins, outside the column flow.
    pub fn is_furniture(self) -> bool {
        matches!(self, TextRole::PageNumber)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRun {
    pub role: TextRole,
    /// Id of the source block. Fragments of a block split across columns
    /// share it and count up through `fragment`.
    pub source_id: String,
    pub fragment: usize,
    pub font: String,
    pub size: Pt,
    pub line_height: Pt,
    pub align: Align,
    /// Indent applied to every line but the first of the whole block.
    pub hanging_indent: Pt,
    pub lines: Vec<LineBox>,
}

impl TextRun {
    pub fn text(&self) -> String {
        self.lines
            .iter()
            .map(|line| line.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImagePlacement {
    pub figure_id: String,
    pub number: usize,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub size: BlockSize,
    pub position: FigurePosition,
    /// Set when the figure moved to a later column than where it was requested.
    pub deferred: bool,
    #[serde(skip)]
    pub image: DecodedImage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRowBox {
    pub height: Pt,
    pub cells: Vec<Vec<LineBox>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableGrid {
    pub table_id: String,
    pub number: usize,
    pub font: String,
    pub header_font: String,
    pub size: Pt,
    pub line_height: Pt,
    pub padding: Pt,
    pub column_widths: Vec<Pt>,
    pub rows: Vec<TableRowBox>,
}

impl TableGrid {
    pub fn text(&self) -> String {
        self.rows
            .iter()
            .flat_map(|row| row.cells.iter())
            .flat_map(|cell| cell.iter())
            .map(|line| line.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquationLine {
    pub equation_id: String,
    pub number: usize,
    pub label: String,
    pub label_width: Pt,
    pub font: String,
    pub label_font: String,
    pub size: Pt,
    pub line_height: Pt,
    pub lines: Vec<LineBox>,
}

impl EquationLine {
    pub fn text(&self) -> String {
        let body = self
            .lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        format!("{body} {}", self.label)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Text(TextRun),
    Image(ImagePlacement),
    Table(TableGrid),
    Equation(EquationLine),
}

#[derive(Debug, Clone)]
pub struct PlacedElement {
    pub page: usize,
    pub column: usize,
    pub x: Pt,
    pub y: Pt,
    pub width: Pt,
    pub height: Pt,
    /// Index of the owning top-level section; `None` for front matter,
    /// references and page furniture.
    pub section: Option<usize>,
    pub payload: Payload,
}

impl PlacedElement {
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            Payload::Text(run) => run.role.as_str(),
            Payload::Image(_) => "image",
            Payload::Table(_) => "table",
            Payload::Equation(_) => "equation",
        }
    }

    pub fn text_run(&self) -> Option<&TextRun> {
        match &self.payload {
            Payload::Text(run) => Some(run),
            _ => None,
        }
    }

    /// Visible text carried by the element, as a renderer would draw it.
    pub fn text(&self) -> String {
        match &self.payload {
            Payload::Text(run) => run.text(),
            Payload::Image(_) => String::new(),
            Payload::Table(grid) => grid.text(),
            Payload::Equation(eq) => eq.text(),
        }
    }

    pub fn right(&self) -> Pt {
        self.x + self.width
    }

    pub fn bottom(&self) -> Pt {
        self.y + self.height
    }
}

impl Serialize for PlacedElement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PlacedElement", 9)?;
        state.serialize_field("page", &self.page)?;
        state.serialize_field("column", &self.column)?;
        state.serialize_field("x", &self.x)?;
        state.serialize_field("y", &self.y)?;
        state.serialize_field("width", &self.width)?;
        state.serialize_field("height", &self.height)?;
        state.serialize_field("type", self.kind())?;
        state.serialize_field("section", &self.section)?;
        state.serialize_field("payload", &self.payload)?;
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageGeometry {
    pub page_size: Size,
    pub margins: Margins,
    pub columns: usize,
    pub column_gutter: Pt,
}

#[derive(Debug, Clone, Serialize)]
pub struct LayoutProgram {
    pub title: String,
    pub geometry: PageGeometry,
    pub fonts: FontSet,
    pub page_count: usize,
    pub section_count: usize,
    pub page_numbers: bool,
    pub footer_size: Pt,
    /// Vertical gap the layout left after each element.
    pub element_spacing: Pt,
    pub elements: Vec<PlacedElement>,
    pub warnings: Vec<RenderWarning>,
}

impl LayoutProgram {
    /// The debug view: the placed-element records only.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.elements)
    }

    pub fn elements_on_page(&self, page: usize) -> impl Iterator<Item = &PlacedElement> {
        self.elements.iter().filter(move |el| el.page == page)
    }

    pub fn reference_count(&self) -> usize {
        self.elements
            .iter()
            .filter_map(PlacedElement::text_run)
            .filter(|run| run.role == TextRole::Reference && run.fragment == 0)
            .count()
    }
}
