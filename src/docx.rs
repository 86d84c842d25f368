//! DOCX backend. The Layout Program is first folded into a [`WordDocument`],
//! a paragraph/table tree that rejoins text split across columns, and that
//! tree is then written with `docx-rs`. Word reflows the text itself; the
//! tree keeps the same content, order, numbering and styling as the PDF.

use docx_rs::{
    AlignmentType, BreakType, Docx, Footer, LineSpacing, LineSpacingType, PageMargin, PageNum,
    PageSize, Paragraph, Pic, Run, RunFonts, SectionProperty, SectionType, SpecialIndentType,
    Table, TableAlignmentType, TableCell, TableRow, WidthType,
};
use image::ImageFormat;
use std::cell::Cell;
use std::collections::HashMap;
use std::io::Cursor;

use crate::error::RenderError;
use crate::metrics::LineBox;
use crate::program::{Align, LayoutProgram, Payload, TableGrid, TextRole, TextRun};
use crate::report::RendererReport;
use crate::style::FontSet;
use crate::types::{Margins, Pt, Size};

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(String),
    LineBreak,
    Tab,
    Image {
        number: usize,
        png: Vec<u8>,
        pixel_width: u32,
        pixel_height: u32,
        width: Pt,
        height: Pt,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordParagraph {
    pub role: Option<TextRole>,
    pub source_id: String,
    pub section: Option<usize>,
    pub align: Align,
    pub size: Pt,
    pub line_height: Pt,
    pub bold: bool,
    pub italic: bool,
    pub hanging_indent: Pt,
    pub inlines: Vec<Inline>,
}

impl WordParagraph {
    pub fn text(&self) -> String {
        let mut out = String::new();
        for inline in &self.inlines {
            match inline {
                Inline::Text(text) => out.push_str(text),
                Inline::LineBreak | Inline::Tab => out.push(' '),
                Inline::Image { .. } => {}
            }
        }
        out
    }

    fn push_lines(&mut self, lines: &[LineBox]) {
        for line in lines {
            match self.inlines.last() {
                None | Some(Inline::LineBreak) => {}
                Some(_) => self.inlines.push(Inline::Text(" ".to_string())),
            }
            if !line.text.is_empty() {
                self.inlines.push(Inline::Text(line.text.clone()));
            }
            if line.ends_paragraph {
                self.inlines.push(Inline::LineBreak);
            }
        }
    }

    /// Drops the break a paragraph-final line leaves behind.
    fn trim(&mut self) {
        while matches!(self.inlines.last(), Some(Inline::LineBreak)) {
            self.inlines.pop();
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordTable {
    pub source_id: String,
    pub section: Option<usize>,
    pub size: Pt,
    pub column_widths: Vec<Pt>,
    /// Cell text per row; lines inside a cell are joined with spaces.
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuthorCell {
    pub source_id: String,
    pub width: Pt,
    pub name: String,
    pub details: Vec<String>,
}

/// The author block: one borderless table row per laid-out author row.
#[derive(Debug, Clone, PartialEq)]
pub struct WordAuthors {
    pub size: Pt,
    pub rows: Vec<Vec<AuthorCell>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WordBlock {
    Paragraph(WordParagraph),
    Table(WordTable),
    Authors(WordAuthors),
}

impl WordBlock {
    /// Title, authors, abstract and keywords span the full text width.
    pub fn is_front_matter(&self) -> bool {
        match self {
            WordBlock::Paragraph(paragraph) => matches!(
                paragraph.role,
                Some(TextRole::Title | TextRole::Abstract | TextRole::Keywords)
            ),
            WordBlock::Authors(_) => true,
            WordBlock::Table(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordDocument {
    pub page_size: Size,
    pub margins: Margins,
    pub columns: usize,
    pub column_gutter: Pt,
    pub family: String,
    pub body_size: Pt,
    pub space_after: Pt,
    pub page_numbers: bool,
    pub footer_size: Pt,
    /// Anchored to the foot of the first column on page 1.
    pub copyright: Option<WordParagraph>,
    pub blocks: Vec<WordBlock>,
}

/// Word paragraph ids, handed out per document so output does not depend on
/// what else the process has built.
#[derive(Default)]
struct ParaIds(Cell<u32>);

impl ParaIds {
    fn paragraph(&self) -> Paragraph {
        let id = self.0.get() + 1;
        self.0.set(id);
        Paragraph::new().id(format!("{id:08X}"))
    }
}

impl WordDocument {
    /// Folds placed elements back into document-order blocks. Fragments of
    /// one source block become one paragraph again.
    pub fn from_program(program: &LayoutProgram) -> Result<Self, RenderError> {
        let fonts = &program.fonts;
        let mut blocks: Vec<WordBlock> = Vec::new();
        let mut open: HashMap<String, usize> = HashMap::new();
        let mut copyright = None;
        let mut author_row: Option<Pt> = None;
        let mut body_size = Pt::ZERO;
        for element in &program.elements {
            match &element.payload {
                Payload::Text(run) if run.role == TextRole::PageNumber => {}
                Payload::Text(run) if run.role == TextRole::Copyright => {
                    copyright = Some(text_paragraph(run, None, fonts));
                }
                Payload::Text(run) if run.role == TextRole::AuthorName => {
                    let cell = AuthorCell {
                        source_id: run.source_id.clone(),
                        width: element.width,
                        name: joined(&run.lines).join(" "),
                        details: Vec::new(),
                    };
                    let same_row = author_row == Some(element.y);
                    author_row = Some(element.y);
                    match blocks.last_mut() {
                        Some(WordBlock::Authors(authors)) if same_row => {
                            if let Some(row) = authors.rows.last_mut() {
                                row.push(cell);
                            }
                        }
                        Some(WordBlock::Authors(authors)) => authors.rows.push(vec![cell]),
                        _ => blocks.push(WordBlock::Authors(WordAuthors {
                            size: run.size,
                            rows: vec![vec![cell]],
                        })),
                    }
                }
                Payload::Text(run) if run.role == TextRole::AuthorDetail => {
                    if let Some(WordBlock::Authors(authors)) = blocks.last_mut() {
                        if let Some(cell) = authors
                            .rows
                            .iter_mut()
                            .flatten()
                            .rev()
                            .find(|cell| run.source_id == format!("{}-details", cell.source_id))
                        {
                            cell.details.extend(joined(&run.lines));
                        }
                    }
                }
                Payload::Text(run) => {
                    if run.role == TextRole::Body && body_size == Pt::ZERO {
                        body_size = run.size;
                    }
                    if let Some(WordBlock::Paragraph(paragraph)) = open
                        .get(&run.source_id)
                        .and_then(|index| blocks.get_mut(*index))
                    {
                        paragraph.push_lines(&run.lines);
                        continue;
                    }
                    open.insert(run.source_id.clone(), blocks.len());
                    blocks.push(WordBlock::Paragraph(text_paragraph(
                        run,
                        element.section,
                        fonts,
                    )));
                }
                Payload::Image(image) => {
                    let mut png = Vec::new();
                    image
                        .image
                        .pixels
                        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
                        .map_err(|err| RenderError::Backend {
                            backend: "docx",
                            message: format!("figure {}: {err}", image.figure_id),
                        })?;
                    blocks.push(WordBlock::Paragraph(WordParagraph {
                        role: None,
                        source_id: image.figure_id.clone(),
                        section: element.section,
                        align: Align::Center,
                        size: program.footer_size,
                        line_height: Pt::ZERO,
                        bold: false,
                        italic: false,
                        hanging_indent: Pt::ZERO,
                        inlines: vec![Inline::Image {
                            number: image.number,
                            png,
                            pixel_width: image.pixel_width,
                            pixel_height: image.pixel_height,
                            width: element.width,
                            height: element.height,
                        }],
                    }));
                }
                Payload::Table(grid) => {
                    blocks.push(WordBlock::Table(word_table(grid, element.section)));
                }
                Payload::Equation(eq) => {
                    let mut inlines = Vec::new();
                    for line in &eq.lines {
                        if !inlines.is_empty() {
                            inlines.push(Inline::LineBreak);
                        }
                        inlines.push(Inline::Text(line.text.clone()));
                    }
                    inlines.push(Inline::Tab);
                    inlines.push(Inline::Text(eq.label.clone()));
                    blocks.push(WordBlock::Paragraph(WordParagraph {
                        role: None,
                        source_id: eq.equation_id.clone(),
                        section: element.section,
                        align: Align::Center,
                        size: eq.size,
                        line_height: eq.line_height,
                        bold: false,
                        italic: fonts.is_italic(&eq.font),
                        hanging_indent: Pt::ZERO,
                        inlines,
                    }));
                }
            }
        }
        for block in &mut blocks {
            if let WordBlock::Paragraph(paragraph) = block {
                paragraph.trim();
            }
        }
        if let Some(paragraph) = &mut copyright {
            paragraph.trim();
        }
        if body_size == Pt::ZERO {
            body_size = Pt::from_i32(10);
        }
        Ok(Self {
            page_size: program.geometry.page_size,
            margins: program.geometry.margins,
            columns: program.geometry.columns.max(1),
            column_gutter: program.geometry.column_gutter,
            family: fonts.docx_family.clone(),
            body_size,
            space_after: program.element_spacing,
            page_numbers: program.page_numbers,
            footer_size: program.footer_size,
            copyright,
            blocks,
        })
    }

    pub fn report(&self, section_count: usize) -> RendererReport {
        let mut report = RendererReport::new("docx", section_count);
        for block in &self.blocks {
            match block {
                WordBlock::Paragraph(paragraph) => {
                    if paragraph.role == Some(TextRole::Reference) {
                        report.reference_count += 1;
                    }
                    if let Some(section) = paragraph.section {
                        report.push_text(section, &paragraph.text());
                    }
                }
                WordBlock::Table(table) => {
                    if let Some(section) = table.section {
                        for cell in table.rows.iter().flatten() {
                            report.push_text(section, cell);
                        }
                    }
                }
                WordBlock::Authors(_) => {}
            }
        }
        report.finish()
    }

    pub fn column_width(&self) -> Pt {
        let columns = self.columns.max(1) as i32;
        let content = self.page_size.width - self.margins.left - self.margins.right;
        (content - self.column_gutter * (columns - 1)) / columns
    }

    /// Two sections: the front matter in one full-width column, then the
    /// body in `columns` columns that continue on the same page.
    pub fn to_docx(&self) -> Docx {
        let ids = ParaIds::default();
        let mut docx = Docx::new()
            .page_size(
                self.page_size.width.to_twips().max(0) as u32,
                self.page_size.height.to_twips().max(0) as u32,
            )
            .page_margin(self.page_margin())
            .default_fonts(self.run_fonts())
            .default_size(half_points(self.body_size));
        let mut front = SectionProperty::new()
            .page_size(PageSize::new().size(
                self.page_size.width.to_twips().max(0) as u32,
                self.page_size.height.to_twips().max(0) as u32,
            ))
            .page_margin(self.page_margin());
        if self.page_numbers {
            let number = ids
                .paragraph()
                .align(AlignmentType::Center)
                .add_page_num(PageNum::new());
            let footer = Footer::new().add_paragraph(number);
            docx = docx.footer(footer.clone());
            front = front.footer(footer, "rIdFooter1");
        }
        let body = &mut docx.document.section_property;
        body.columns = self.columns;
        body.space = self.column_gutter.to_twips().max(0) as usize;
        body.section_type = Some(SectionType::Continuous);

        let front_end = self.blocks.iter().take_while(|block| block.is_front_matter()).count();
        for (index, block) in self.blocks.iter().enumerate() {
            if index == front_end {
                docx = self.open_body(docx, &ids, &front);
            }
            docx = match block {
                WordBlock::Paragraph(paragraph) => {
                    docx.add_paragraph(self.paragraph(&ids, paragraph))
                }
                WordBlock::Table(table) => docx.add_table(self.table(&ids, table)),
                WordBlock::Authors(authors) => docx.add_table(self.authors(&ids, authors)),
            };
        }
        if front_end == self.blocks.len() {
            docx = self.open_body(docx, &ids, &front);
        }
        docx
    }

    pub fn pack(&self) -> Result<Vec<u8>, RenderError> {
        let mut cursor = Cursor::new(Vec::new());
        self.to_docx()
            .build()
            .pack(&mut cursor)
            .map_err(|err| RenderError::Backend {
                backend: "docx",
                message: err.to_string(),
            })?;
        Ok(cursor.into_inner())
    }

    /// Closes the full-width section and starts the body with the notice.
    fn open_body(&self, docx: Docx, ids: &ParaIds, front: &SectionProperty) -> Docx {
        let docx = docx.add_paragraph(
            ids.paragraph()
                .line_spacing(LineSpacing::new().after(0))
                .section_property(front.clone()),
        );
        match &self.copyright {
            Some(notice) => docx.add_paragraph(
                self.paragraph(ids, notice)
                    .wrap("around")
                    .h_anchor("margin")
                    .v_anchor("margin")
                    .x_align("left")
                    .y_align("bottom")
                    .frame_width(self.column_width().to_twips().max(0) as u32),
            ),
            None => docx,
        }
    }

    fn page_margin(&self) -> PageMargin {
        PageMargin::new()
            .top(self.margins.top.to_twips())
            .bottom(self.margins.bottom.to_twips())
            .left(self.margins.left.to_twips())
            .right(self.margins.right.to_twips())
    }

    fn run_fonts(&self) -> RunFonts {
        RunFonts::new()
            .ascii(&self.family)
            .hi_ansi(&self.family)
            .cs(&self.family)
    }

    fn run(&self, paragraph: &WordParagraph) -> Run {
        let mut run = Run::new()
            .fonts(self.run_fonts())
            .size(half_points(paragraph.size));
        if paragraph.bold {
            run = run.bold();
        }
        if paragraph.italic {
            run = run.italic();
        }
        run
    }

    fn paragraph(&self, ids: &ParaIds, paragraph: &WordParagraph) -> Paragraph {
        let mut out = ids.paragraph().align(alignment(paragraph.align));
        let mut spacing = LineSpacing::new().after(self.space_after.to_twips().max(0) as u32);
        if paragraph.line_height > Pt::ZERO {
            spacing = spacing
                .line(paragraph.line_height.to_twips())
                .line_rule(LineSpacingType::Exact);
        }
        out = out.line_spacing(spacing);
        if paragraph.hanging_indent > Pt::ZERO {
            let indent = paragraph.hanging_indent.to_twips();
            out = out.indent(
                Some(indent),
                Some(SpecialIndentType::Hanging(indent)),
                None,
                None,
            );
        }
        if matches!(
            paragraph.role,
            Some(TextRole::SectionHeading | TextRole::SubsectionHeading | TextRole::ReferencesHeading)
        ) {
            out = out.keep_next(true);
        }
        let mut run = self.run(paragraph);
        for inline in &paragraph.inlines {
            run = match inline {
                Inline::Text(text) => run.add_text(text),
                Inline::LineBreak => run.add_break(BreakType::TextWrapping),
                Inline::Tab => run.add_tab(),
                Inline::Image {
                    number,
                    png,
                    pixel_width,
                    pixel_height,
                    width,
                    height,
                } => run.add_image(
                    Pic::new_with_dimensions(png.clone(), *pixel_width, *pixel_height)
                        .id(format!("rIdImage{number}"))
                        .size(width.to_emu(), height.to_emu()),
                ),
            };
        }
        out.add_run(run)
    }

    fn table(&self, ids: &ParaIds, table: &WordTable) -> Table {
        let widths: Vec<usize> = table
            .column_widths
            .iter()
            .map(|width| width.to_twips().max(0) as usize)
            .collect();
        let rows = table
            .rows
            .iter()
            .enumerate()
            .map(|(row_index, cells)| {
                let cells = cells
                    .iter()
                    .zip(&widths)
                    .map(|(text, width)| {
                        let mut run = Run::new()
                            .fonts(self.run_fonts())
                            .size(half_points(table.size))
                            .add_text(text);
                        if row_index == 0 {
                            run = run.bold();
                        }
                        TableCell::new()
                            .width(*width, WidthType::Dxa)
                            .add_paragraph(ids.paragraph().add_run(run))
                    })
                    .collect();
                TableRow::new(cells)
            })
            .collect();
        Table::new(rows)
            .set_grid(widths)
            .align(TableAlignmentType::Center)
    }

    /// Authors side by side: bold name over italic detail lines, centred.
    fn authors(&self, ids: &ParaIds, authors: &WordAuthors) -> Table {
        let size = half_points(authors.size);
        let grid: Vec<usize> = authors
            .rows
            .first()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.width.to_twips().max(0) as usize)
                    .collect()
            })
            .unwrap_or_default();
        let rows = authors
            .rows
            .iter()
            .map(|row| {
                let cells = row
                    .iter()
                    .map(|cell| {
                        let name = Run::new()
                            .fonts(self.run_fonts())
                            .size(size)
                            .bold()
                            .add_text(&cell.name);
                        let mut out = TableCell::new()
                            .width(cell.width.to_twips().max(0) as usize, WidthType::Dxa)
                            .add_paragraph(ids.paragraph().align(AlignmentType::Center).add_run(name));
                        for detail in &cell.details {
                            let run = Run::new()
                                .fonts(self.run_fonts())
                                .size(size)
                                .italic()
                                .add_text(detail);
                            out = out.add_paragraph(
                                ids.paragraph().align(AlignmentType::Center).add_run(run),
                            );
                        }
                        out
                    })
                    .collect();
                TableRow::new(cells)
            })
            .collect();
        Table::without_borders(rows)
            .set_grid(grid)
            .align(TableAlignmentType::Center)
    }
}

pub struct DocxOutput {
    pub bytes: Vec<u8>,
    pub report: RendererReport,
}

pub fn render_docx(program: &LayoutProgram) -> Result<DocxOutput, RenderError> {
    let document = WordDocument::from_program(program)?;
    let report = document.report(program.section_count);
    let bytes = document.pack()?;
    log::debug!(
        "docx: {} blocks, {} bytes",
        document.blocks.len(),
        bytes.len()
    );
    Ok(DocxOutput { bytes, report })
}

fn text_paragraph(run: &TextRun, section: Option<usize>, fonts: &FontSet) -> WordParagraph {
    let mut paragraph = WordParagraph {
        role: Some(run.role),
        source_id: run.source_id.clone(),
        section,
        align: run.align,
        size: run.size,
        line_height: run.line_height,
        bold: fonts.is_bold(&run.font),
        italic: fonts.is_italic(&run.font),
        hanging_indent: run.hanging_indent,
        inlines: Vec::new(),
    };
    paragraph.push_lines(&run.lines);
    paragraph
}

/// Rejoins wrapped lines into their source lines.
fn joined(lines: &[LineBox]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut open = false;
    for line in lines {
        match out.last_mut() {
            Some(last) if open => {
                last.push(' ');
                last.push_str(&line.text);
            }
            _ => out.push(line.text.clone()),
        }
        open = !line.ends_paragraph;
    }
    out
}

fn word_table(grid: &TableGrid, section: Option<usize>) -> WordTable {
    WordTable {
        source_id: grid.table_id.clone(),
        section,
        size: grid.size,
        column_widths: grid.column_widths.clone(),
        rows: grid
            .rows
            .iter()
            .map(|row| {
                row.cells
                    .iter()
                    .map(|cell| {
                        cell.iter()
                            .map(|line| line.text.as_str())
                            .filter(|text| !text.is_empty())
                            .collect::<Vec<_>>()
                            .join(" ")
                    })
                    .collect()
            })
            .collect(),
    }
}

fn alignment(align: Align) -> AlignmentType {
    match align {
        Align::Left => AlignmentType::Left,
        Align::Center => AlignmentType::Center,
        Align::Right => AlignmentType::Right,
        Align::Justify => AlignmentType::Both,
    }
}

/// Word sizes runs in half points.
fn half_points(size: Pt) -> usize {
    ((size.to_milli_i64().max(0) * 2 + 500) / 1000) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{PageGeometry, PlacedElement};
    use crate::style::StyleConfig;

    fn line(text: &str, ends_paragraph: bool) -> LineBox {
        LineBox {
            text: text.to_string(),
            width: Pt::from_i32(40),
            ends_paragraph,
        }
    }

    fn text(section: Option<usize>, role: TextRole, id: &str, fragment: usize, lines: Vec<LineBox>) -> PlacedElement {
        PlacedElement {
            page: fragment,
            column: 0,
            x: Pt::from_i32(54),
            y: Pt::from_i32(54),
            width: Pt::from_i32(243),
            height: Pt::from_i32(10) * lines.len() as i32,
            section,
            payload: Payload::Text(TextRun {
                role,
                source_id: id.to_string(),
                fragment,
                font: if role == TextRole::SectionHeading {
                    "Times-Bold".to_string()
                } else {
                    "Times-Roman".to_string()
                },
                size: Pt::from_f32(9.5),
                line_height: Pt::from_i32(10),
                align: Align::Justify,
                hanging_indent: Pt::ZERO,
                lines,
            }),
        }
    }

    fn program(elements: Vec<PlacedElement>) -> LayoutProgram {
        let style = StyleConfig::ieee_conference().unwrap();
        LayoutProgram {
            title: "Quantum Computing".to_string(),
            geometry: PageGeometry {
                page_size: style.page_size,
                margins: style.margins,
                columns: 2,
                column_gutter: style.column_gutter,
            },
            fonts: style.fonts.clone(),
            page_count: 2,
            section_count: 1,
            page_numbers: true,
            footer_size: style.footer_size,
            element_spacing: style.element_spacing,
            elements,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn fragments_rejoin_into_one_paragraph() {
        let program = program(vec![
            text(Some(0), TextRole::SectionHeading, "s1", 0, vec![line("I. INTRODUCTION", true)]),
            text(
                Some(0),
                TextRole::Body,
                "b1",
                0,
                vec![line("first line", false), line("ends here", true)],
            ),
            text(Some(0), TextRole::Body, "b1", 1, vec![line("next paragraph", true)]),
            text(None, TextRole::PageNumber, "page-number-1", 0, vec![line("1", true)]),
        ]);
        let word = WordDocument::from_program(&program).unwrap();
        assert_eq!(word.blocks.len(), 2);
        let WordBlock::Paragraph(heading) = &word.blocks[0] else {
            panic!("heading should be a paragraph");
        };
        assert!(heading.bold);
        let WordBlock::Paragraph(body) = &word.blocks[1] else {
            panic!("body should be a paragraph");
        };
        assert_eq!(
            body.inlines,
            vec![
                Inline::Text("first line".to_string()),
                Inline::Text(" ".to_string()),
                Inline::Text("ends here".to_string()),
                Inline::LineBreak,
                Inline::Text("next paragraph".to_string()),
            ]
        );
        let report = word.report(1);
        assert_eq!(
            report.section_texts,
            vec!["I. INTRODUCTION first line ends here next paragraph".to_string()]
        );
    }

    #[test]
    fn references_are_counted_once_per_entry() {
        let mut reference = text(None, TextRole::Reference, "r1", 0, vec![line("[1] A. Author,", false)]);
        if let Payload::Text(run) = &mut reference.payload {
            run.hanging_indent = Pt::from_i32(18);
        }
        let continued = text(None, TextRole::Reference, "r1", 1, vec![line("2020.", true)]);
        let word = WordDocument::from_program(&program(vec![reference, continued])).unwrap();
        assert_eq!(word.report(1).reference_count, 1);
        let WordBlock::Paragraph(paragraph) = &word.blocks[0] else {
            panic!("reference should be a paragraph");
        };
        assert_eq!(paragraph.hanging_indent, Pt::from_i32(18));
        assert_eq!(paragraph.text(), "[1] A. Author, 2020.");
    }

    #[test]
    fn packs_a_zip_with_the_document_part() {
        let program = program(vec![text(
            Some(0),
            TextRole::Body,
            "b1",
            0,
            vec![line("Hello", true)],
        )]);
        let bytes = WordDocument::from_program(&program).unwrap().pack().unwrap();
        assert_eq!(&bytes[..2], b"PK");
        let needle = b"word/document.xml";
        assert!(bytes.windows(needle.len()).any(|window| window == needle));
    }

    fn placed(role: TextRole, id: &str, x: i32, y: i32, width: i32, lines: Vec<LineBox>) -> PlacedElement {
        let mut element = text(None, role, id, 0, lines);
        element.x = Pt::from_i32(x);
        element.y = Pt::from_i32(y);
        element.width = Pt::from_i32(width);
        element
    }

    fn front_matter_program() -> LayoutProgram {
        program(vec![
            placed(TextRole::Copyright, "copyright", 54, 700, 243, vec![line("978-1-0000-0000-0/26/$31.00 \u{a9}2026 IEEE", true)]),
            placed(TextRole::Title, "title", 54, 54, 504, vec![line("Quantum Computing", true)]),
            placed(TextRole::AuthorName, "author-0", 54, 90, 252, vec![line("Ada Lovelace", true)]),
            placed(TextRole::AuthorDetail, "author-0-details", 54, 100, 252, vec![line("Analytical", false), line("Engines Ltd.", true), line("London", true)]),
            placed(TextRole::AuthorName, "author-1", 306, 90, 252, vec![line("Alan Turing", true)]),
            placed(TextRole::AuthorName, "author-2", 54, 130, 504, vec![line("Grace Hopper", true)]),
            placed(TextRole::Abstract, "abstract", 54, 160, 504, vec![line("Abstract\u{2014}We study qubits.", true)]),
            text(Some(0), TextRole::SectionHeading, "s1", 0, vec![line("I. INTRODUCTION", true)]),
            text(Some(0), TextRole::Body, "b1", 0, vec![line("Body text.", true)]),
        ])
    }

    #[test]
    fn authors_fold_into_rows_of_cells() {
        let word = WordDocument::from_program(&front_matter_program()).unwrap();
        let WordBlock::Authors(authors) = &word.blocks[1] else {
            panic!("authors should follow the title");
        };
        assert_eq!(authors.rows.len(), 2);
        assert_eq!(authors.rows[0].len(), 2);
        assert_eq!(authors.rows[0][0].details, vec!["Analytical Engines Ltd.", "London"]);
        assert_eq!(authors.rows[0][1].name, "Alan Turing");
        assert_eq!(authors.rows[1][0].width, Pt::from_i32(504));
        let front: Vec<bool> = word.blocks.iter().map(WordBlock::is_front_matter).collect();
        assert_eq!(front, vec![true, true, true, false, false]);
        assert!(word.copyright.is_some());
        assert_eq!(word.column_gutter, Pt::from_i32(18));
    }

    #[test]
    fn front_matter_section_precedes_the_column_section() {
        let word = WordDocument::from_program(&front_matter_program()).unwrap();
        let xml = String::from_utf8(word.to_docx().build().document).unwrap();
        let single = xml.find(r#"w:num="1""#).expect("front matter section");
        let double = xml.find(r#"w:num="2""#).expect("body section");
        assert!(single < double);
        assert!(xml.find("I. INTRODUCTION").unwrap() > single);
        assert!(xml.find("Abstract").unwrap() < single);
        assert!(xml[single..].contains(r#"w:space="360""#));
        assert!(xml.contains(r#"w:type w:val="continuous""#));
        // The notice is a frame at the foot of the first column.
        let notice = xml.find("IEEE").unwrap();
        let frame = xml[..notice].rfind("<w:framePr").expect("copyright frame");
        assert!(frame > single);
        assert!(xml[frame..notice].contains(r#"w:yAlign="bottom""#));
        assert!(xml[frame..notice].contains(r#"w:w="4860""#));
    }

    #[test]
    fn paragraph_ids_restart_for_every_document() {
        let word = WordDocument::from_program(&front_matter_program()).unwrap();
        let first = word.to_docx().build().document;
        let second = word.to_docx().build().document;
        assert_eq!(first, second);
    }

    #[test]
    fn half_points_round() {
        assert_eq!(half_points(Pt::from_f32(9.5)), 19);
        assert_eq!(half_points(Pt::from_i32(24)), 48);
        assert_eq!(half_points(Pt::from_f32(8.2)), 16);
    }
}
