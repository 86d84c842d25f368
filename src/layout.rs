//! Layout Engine: walks a normalized document in order and emits the Layout
//! Program.
//!
//! The cursor is the current frame of the current page. Front matter flows
//! through a single full-width frame; the body flows through one frame per
//! column. Text splits between lines; figures, tables and equations move
//! whole to the next column when they do not fit.

use serde_json::json;

use crate::debug::{DebugLogger, DebugTrace};
use crate::error::{LayoutError, Location, RenderWarning};
use crate::frame::{AddResult, Frame};
use crate::imaging::{DecodedImage, ImageDecoder};
use crate::metrics::{LineBox, Measured, TextMeasurer};
use crate::normalize::{
    Block, FigurePosition, ImageBlock, NormalizedDocument, NormalizedSection,
};
use crate::numbering::{
    equation_label, figure_caption, format_references, section_heading, subsection_heading,
    table_label,
};
use crate::page_template::PageTemplate;
use crate::program::{
    Align, EquationLine, ImagePlacement, LayoutProgram, PageGeometry, Payload, PlacedElement,
    TableGrid, TableRowBox, TextRole, TextRun,
};
use crate::style::{BlockSize, StyleConfig};
use crate::types::{Pt, Rect};

const CELL_PADDING: i32 = 2;
const AUTHOR_CELL_PADDING: i32 = 3;
const EQUATION_LABEL_GAP: i32 = 4;

pub struct LayoutEngine<'a> {
    style: &'a StyleConfig,
    measurer: &'a TextMeasurer,
    decoder: &'a dyn ImageDecoder,
    debug: Option<&'a DebugLogger>,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(
        style: &'a StyleConfig,
        measurer: &'a TextMeasurer,
        decoder: &'a dyn ImageDecoder,
    ) -> Self {
        Self {
            style,
            measurer,
            decoder,
            debug: None,
        }
    }

    pub(crate) fn with_debug(mut self, debug: Option<&'a DebugLogger>) -> Self {
        self.debug = debug;
        self
    }

    pub fn layout(&self, doc: &NormalizedDocument) -> Result<LayoutProgram, LayoutError> {
        let column_width = self.style.column_width();
        if column_width <= Pt::ZERO {
            return Err(LayoutError::NonPositiveDimension {
                dimension: "column width",
                value: column_width.to_f32(),
                location: Location::default(),
            });
        }
        let trace = self.debug.map(|debug| debug.trace(&doc.title));
        let mut composer = Composer {
            style: self.style,
            measurer: self.measurer,
            decoder: self.decoder,
            pager: Pager::new(self.style, trace),
            figures: 0,
            tables: 0,
            equations: 0,
            copyright_strip: Pt::ZERO,
            warnings: doc.warnings.clone(),
        };
        if let Err(err) = composer.compose(doc) {
            composer.pager.close_trace();
            return Err(err);
        }
        composer.finish(doc)
    }
}

struct Pager<'a> {
    style: &'a StyleConfig,
    trace: Option<DebugTrace>,
    page: usize,
    column: usize,
    frames: Vec<Frame>,
    in_body: bool,
    flush_pending: bool,
    /// The current frame holds nothing but a heading.
    heading_only: bool,
    section: Option<usize>,
    element_id: Option<String>,
    elements: Vec<PlacedElement>,
}

impl<'a> Pager<'a> {
    fn new(style: &'a StyleConfig, trace: Option<DebugTrace>) -> Self {
        Self {
            style,
            trace,
            page: 0,
            column: 0,
            frames: PageTemplate::full_width(style).instantiate_frames(),
            in_body: false,
            flush_pending: false,
            heading_only: false,
            section: None,
            element_id: None,
            elements: Vec::new(),
        }
    }

    fn frame(&self) -> &Frame {
        &self.frames[self.column]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.column]
    }

    fn location(&self) -> Location {
        Location {
            section_index: self.section,
            element_id: self.element_id.clone(),
            page_index: Some(self.page),
        }
    }

    fn log(&mut self, kind: &str, fields: serde_json::Value) {
        if let Some(trace) = &mut self.trace {
            trace.event(kind, fields);
        }
    }

    fn close_trace(&mut self) {
        if let Some(trace) = self.trace.take() {
            trace.finish();
        }
    }

    fn next_frame(&mut self, reason: &str) -> Result<(), LayoutError> {
        self.flush_pending = false;
        self.heading_only = false;
        if self.column + 1 < self.frames.len() {
            self.column += 1;
            self.log(
                "layout.column_break",
                json!({"page": self.page, "column": self.column, "reason": reason}),
            );
            return Ok(());
        }
        self.new_page(reason)
    }

    fn new_page(&mut self, reason: &str) -> Result<(), LayoutError> {
        if self.page + 1 >= self.style.page_ceiling {
            return Err(LayoutError::PageLimitExceeded {
                ceiling: self.style.page_ceiling,
                location: self.location(),
            });
        }
        let template = if self.in_body {
            PageTemplate::columns(self.style)
        } else {
            PageTemplate::full_width(self.style)
        };
        self.log(
            "layout.page_break",
            json!({
                "from_page": self.page,
                "to_page": self.page + 1,
                "reason": reason,
                "template": template.name,
            }),
        );
        self.page += 1;
        self.column = 0;
        self.frames = template.instantiate_frames();
        Ok(())
    }

    /// Applies a flush requested by a bottom-positioned figure.
    fn settle(&mut self) -> Result<(), LayoutError> {
        if self.flush_pending {
            self.next_frame("flush after bottom figure")?;
        }
        Ok(())
    }

    /// Reserves `height` in the first frame that can hold it. Returns the
    /// box and whether it had to move past the frame it started in.
    fn place_block(
        &mut self,
        width: Pt,
        height: Pt,
        reason: &str,
    ) -> Result<(Rect, bool), LayoutError> {
        self.settle()?;
        let mut moved = false;
        loop {
            match self.frame_mut().add(width, height) {
                AddResult::Placed(rect) => return Ok((rect, moved)),
                AddResult::Overflow => {
                    self.next_frame(reason)?;
                    moved = true;
                }
            }
        }
    }

    fn spacing(&mut self) {
        let gap = self.style.element_spacing;
        self.frame_mut().advance(gap);
    }

    fn push(&mut self, rect: Rect, payload: Payload) {
        self.heading_only = false;
        self.elements.push(PlacedElement {
            page: self.page,
            column: self.column,
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            section: self.section,
            payload,
        });
    }

    /// Flows `lines` through as many frames as needed, one element per frame.
    fn place_text(&mut self, run: TextRun, mut lines: Vec<LineBox>) -> Result<(), LayoutError> {
        self.settle()?;
        self.element_id = Some(run.source_id.clone());
        let line_milli = run.line_height.to_milli_i64().max(1);
        let mut fragment = 0;
        while !lines.is_empty() {
            let available = self.frame().remaining_height();
            let mut fit = (available.to_milli_i64() / line_milli) as usize;
            if fit == 0 {
                if !self.frame().is_empty() {
                    self.next_frame("text overflow")?;
                    continue;
                }
                fit = 1;
            }
            let rest = lines.split_off(fit.min(lines.len()));
            let chunk = std::mem::replace(&mut lines, rest);
            let width = self.frame().rect().width;
            let height = run.line_height * chunk.len() as i32;
            let (rect, _) = self.place_block(width, height, "text overflow")?;
            self.push(
                rect,
                Payload::Text(TextRun {
                    fragment,
                    lines: chunk,
                    ..run.clone()
                }),
            );
            fragment += 1;
            if !lines.is_empty() {
                self.next_frame("text continues")?;
            }
        }
        self.spacing();
        Ok(())
    }

    /// Headings open with `gap` of space and never end a column without the
    /// first `keep_with` points of what follows them. `None` means the next
    /// unit has to start a column, so the heading starts one too.
    fn place_heading(
        &mut self,
        run: TextRun,
        lines: Vec<LineBox>,
        gap: Pt,
        keep_with: Option<Pt>,
    ) -> Result<(), LayoutError> {
        self.settle()?;
        if !self.frame().is_empty() {
            let spacing = self.style.element_spacing;
            let extra = (gap - spacing).max(Pt::ZERO);
            let heading = run.line_height * lines.len() as i32;
            let fits =
                keep_with.is_some_and(|keep| self.frame().fits(extra + heading + spacing + keep));
            if fits {
                self.frame_mut().advance(extra);
            } else {
                self.log(
                    "layout.orphan_heading_moved",
                    json!({"page": self.page, "column": self.column, "heading": run.source_id}),
                );
                self.next_frame("keep heading with content")?;
            }
        }
        let opens_frame = self.frame().is_empty();
        self.place_text(run, lines)?;
        self.heading_only = opens_frame;
        Ok(())
    }
}

struct FigureUnit {
    id: String,
    block: ImageBlock,
    image: DecodedImage,
    number: usize,
    width: Pt,
    height: Pt,
    caption: TextRun,
    caption_lines: Vec<LineBox>,
    caption_height: Pt,
}

impl FigureUnit {
    fn total_height(&self, spacing: Pt) -> Pt {
        self.height + spacing + self.caption_height
    }
}

struct TableUnit {
    caption: TextRun,
    caption_lines: Vec<LineBox>,
    caption_height: Pt,
    grid: TableGrid,
    grid_height: Pt,
}

enum Unit {
    Text { run: TextRun, lines: Vec<LineBox> },
    Heading { run: TextRun, lines: Vec<LineBox>, gap: Pt },
    Figure(Box<FigureUnit>),
    Table(Box<TableUnit>),
    Equation { eq: EquationLine, height: Pt },
}

impl Unit {
    /// How much of this unit must share a column with a heading above it;
    /// `None` for a figure that asks for the top of a column.
    fn keep_height(&self, spacing: Pt) -> Option<Pt> {
        match self {
            Unit::Text { run, .. } | Unit::Heading { run, .. } => Some(run.line_height),
            Unit::Figure(fig) if fig.block.position == FigurePosition::Top => None,
            Unit::Figure(fig) => Some(fig.total_height(spacing)),
            Unit::Table(table) => Some(table.caption_height + spacing + table.grid_height),
            Unit::Equation { height, .. } => Some(*height),
        }
    }
}

struct Composer<'a> {
    style: &'a StyleConfig,
    measurer: &'a TextMeasurer,
    decoder: &'a dyn ImageDecoder,
    pager: Pager<'a>,
    figures: usize,
    tables: usize,
    equations: usize,
    /// Height reserved for the copyright notice under page 1's first column.
    copyright_strip: Pt,
    warnings: Vec<RenderWarning>,
}

impl<'a> Composer<'a> {
    fn measure(&mut self, text: &str, family: &str, size: Pt, width: Pt) -> Measured {
        let measured = self.measurer.measure(text, family, size, width);
        self.note_fallbacks(&measured);
        measured
    }

    fn note_fallbacks(&mut self, measured: &Measured) {
        for err in &measured.fallbacks {
            let warning = RenderWarning::from(err);
            if !self.warnings.contains(&warning) {
                self.warnings.push(warning);
            }
        }
    }

    fn run(&self, role: TextRole, source_id: &str, font: &str, size: Pt, align: Align) -> TextRun {
        TextRun {
            role,
            source_id: source_id.to_string(),
            fragment: 0,
            font: font.to_string(),
            size,
            line_height: self.measurer.line_height(size),
            align,
            hanging_indent: Pt::ZERO,
            lines: Vec::new(),
        }
    }

    fn text_unit(
        &mut self,
        role: TextRole,
        source_id: &str,
        text: &str,
        font: &str,
        size: Pt,
        align: Align,
    ) -> Unit {
        let width = self.pager.frame().rect().width;
        let lines = self.measure(text, font, size, width).lines;
        Unit::Text {
            run: self.run(role, source_id, font, size, align),
            lines,
        }
    }

    fn heading_unit(
        &mut self,
        role: TextRole,
        source_id: &str,
        text: &str,
        font: &str,
        size: Pt,
        align: Align,
        gap: Pt,
    ) -> Unit {
        match self.text_unit(role, source_id, text, font, size, align) {
            Unit::Text { run, lines } => Unit::Heading { run, lines, gap },
            other => other,
        }
    }

    fn place_units(&mut self, units: Vec<Unit>) -> Result<(), LayoutError> {
        let spacing = self.style.element_spacing;
        let keeps: Vec<Option<Pt>> = units
            .iter()
            .skip(1)
            .map(|unit| unit.keep_height(spacing))
            .chain(std::iter::once(Some(Pt::ZERO)))
            .collect();
        for (unit, keep_with) in units.into_iter().zip(keeps) {
            match unit {
                Unit::Text { run, lines } => self.pager.place_text(run, lines)?,
                Unit::Heading { run, lines, gap } => {
                    self.pager.place_heading(run, lines, gap, keep_with)?
                }
                Unit::Figure(fig) => self.place_figure(*fig)?,
                Unit::Table(table) => self.place_table(*table)?,
                Unit::Equation { eq, height } => {
                    self.pager.element_id = Some(eq.equation_id.clone());
                    let width = self.pager.frame().rect().width;
                    let (rect, _) = self.pager.place_block(width, height, "equation does not fit")?;
                    self.pager.push(rect, Payload::Equation(eq));
                    self.pager.spacing();
                }
            }
        }
        Ok(())
    }

    fn compose(&mut self, doc: &NormalizedDocument) -> Result<(), LayoutError> {
        self.copyright(doc.settings.include_copyright);
        self.front_matter(doc)?;
        self.start_body()?;
        for (index, section) in doc.sections.iter().enumerate() {
            self.section(doc, index, section)?;
        }
        self.trailing_figures(doc)?;
        self.references(doc)
    }

    /// Reserves the foot of page 1's first column for the notice before
    /// anything else is placed, so long front matter cannot push it off
    /// the page.
    fn copyright(&mut self, include: bool) {
        if !include {
            return;
        }
        let style = self.style;
        let width = style.column_width();
        let measured = self.measure(
            &style.copyright_notice,
            &style.fonts.regular,
            style.reference_size,
            width,
        );
        let height = measured.height();
        self.copyright_strip = height + style.element_spacing;
        let strip = self.pager.frames[0].reserve_bottom(self.copyright_strip);
        let run = TextRun {
            lines: measured.lines,
            ..self.run(
                TextRole::Copyright,
                "copyright",
                &style.fonts.regular,
                style.reference_size,
                Align::Left,
            )
        };
        self.pager.push(
            Rect {
                x: style.column_x(0),
                y: strip.y + style.element_spacing,
                width,
                height,
            },
            Payload::Text(run),
        );
    }

    fn front_matter(&mut self, doc: &NormalizedDocument) -> Result<(), LayoutError> {
        let style = self.style;
        let title = self.text_unit(
            TextRole::Title,
            "title",
            &doc.title,
            &style.fonts.bold,
            style.title_size,
            Align::Center,
        );
        self.place_units(vec![title])?;
        let extra = (style.title_after - style.element_spacing).max(Pt::ZERO);
        self.pager.frame_mut().advance(extra);

        self.authors(doc)?;

        let lead_size = (style.body_size - Pt::from_f32(0.5)).max(Pt::from_i32(1));
        let mut units = Vec::new();
        if let Some(text) = &doc.abstract_text {
            units.push(self.text_unit(
                TextRole::Abstract,
                "abstract",
                &format!("Abstract\u{2014}{text}"),
                &style.fonts.bold,
                lead_size,
                Align::Justify,
            ));
        }
        if let Some(text) = &doc.keywords {
            units.push(self.text_unit(
                TextRole::Keywords,
                "keywords",
                &format!("Keywords\u{2014}{text}"),
                &style.fonts.italic,
                lead_size,
                Align::Justify,
            ));
        }
        self.place_units(units)
    }

    /// Authors sit side by side in equal cells, `authors_per_row` per row.
    fn authors(&mut self, doc: &NormalizedDocument) -> Result<(), LayoutError> {
        let style = self.style;
        let area_width = self.pager.frame().rect().width;
        let padding = Pt::from_i32(AUTHOR_CELL_PADDING);
        for (row_index, row) in doc.authors.chunks(style.authors_per_row).enumerate() {
            let cell_width = area_width / row.len() as i32;
            let text_width = (cell_width - padding * 2).max(Pt::from_i32(1));
            let mut cells = Vec::with_capacity(row.len());
            for (col, author) in row.iter().enumerate() {
                let id = format!("author-{}", row_index * style.authors_per_row + col);
                let name = self
                    .measure(&author.name, &style.fonts.bold, style.author_size, text_width)
                    .lines;
                let details = self
                    .measure(
                        &author.details.join("\n"),
                        &style.fonts.italic,
                        style.author_size,
                        text_width,
                    )
                    .lines;
                cells.push((id, name, details));
            }
            let line_height = self.measurer.line_height(style.author_size);
            let row_height = cells
                .iter()
                .map(|(_, name, details)| line_height * (name.len() + details.len()) as i32)
                .fold(Pt::ZERO, Pt::max);
            let (rect, _) = self
                .pager
                .place_block(area_width, row_height, "author row does not fit")?;
            for (col, (id, name, details)) in cells.into_iter().enumerate() {
                let x = rect.x + cell_width * col as i32;
                let name_height = line_height * name.len() as i32;
                let name_run = TextRun {
                    lines: name,
                    ..self.run(
                        TextRole::AuthorName,
                        &id,
                        &style.fonts.bold,
                        style.author_size,
                        Align::Center,
                    )
                };
                self.pager.push(
                    Rect {
                        x,
                        y: rect.y,
                        width: cell_width,
                        height: name_height,
                    },
                    Payload::Text(name_run),
                );
                if !details.is_empty() {
                    let height = line_height * details.len() as i32;
                    let detail_run = TextRun {
                        lines: details,
                        ..self.run(
                            TextRole::AuthorDetail,
                            &format!("{id}-details"),
                            &style.fonts.italic,
                            style.author_size,
                            Align::Center,
                        )
                    };
                    self.pager.push(
                        Rect {
                            x,
                            y: rect.y + name_height,
                            width: cell_width,
                            height,
                        },
                        Payload::Text(detail_run),
                    );
                }
            }
            self.pager.spacing();
        }
        Ok(())
    }

    /// Switches from the full-width frame to body columns on the same page
    /// when at least one body line still fits.
    fn start_body(&mut self) -> Result<(), LayoutError> {
        let style = self.style;
        let extra = (style.front_matter_after - style.element_spacing).max(Pt::ZERO);
        let top = self.pager.frame().cursor_top() + extra;
        self.pager.in_body = true;
        self.pager.flush_pending = false;
        if style.page_bottom() - top < style.body_leading {
            self.pager.new_page("front matter filled the page")?;
        } else {
            self.pager.frames = PageTemplate::columns_below(style, top).instantiate_frames();
            self.pager.column = 0;
            if self.pager.page == 0 && self.copyright_strip > Pt::ZERO {
                self.pager.frames[0].reserve_bottom(self.copyright_strip);
            }
        }
        Ok(())
    }

    fn section(
        &mut self,
        doc: &NormalizedDocument,
        index: usize,
        section: &NormalizedSection,
    ) -> Result<(), LayoutError> {
        let style = self.style;
        self.pager.section = Some(index);
        let mut units = vec![self.heading_unit(
            TextRole::SectionHeading,
            &section.id,
            &section_heading(index, &section.title),
            &style.fonts.bold,
            style.heading_size,
            Align::Center,
            style.section_gap,
        )];
        for block in &section.blocks {
            let location = Location::element(Some(index), block.id.clone());
            units.push(match &block.block {
                Block::Text { text } => self.text_unit(
                    TextRole::Body,
                    &block.id,
                    text,
                    &style.fonts.regular,
                    style.body_size,
                    Align::Justify,
                ),
                Block::Image(image) => {
                    Unit::Figure(Box::new(self.figure_unit(&block.id, image, location)?))
                }
                Block::Table {
                    rows,
                    caption,
                    size,
                } => Unit::Table(Box::new(self.table_unit(
                    &block.id,
                    rows,
                    caption.as_deref(),
                    *size,
                )?)),
                Block::Equation { text, size } => self.equation_unit(&block.id, text, *size),
            });
        }
        for figure in doc.figures.iter().filter(|f| f.section_index == Some(index)) {
            let location = Location::element(Some(index), figure.id.clone());
            units.push(Unit::Figure(Box::new(self.figure_unit(
                &figure.id,
                &figure.image,
                location,
            )?)));
        }
        for (sub_index, sub) in section.subsections.iter().enumerate() {
            units.push(self.heading_unit(
                TextRole::SubsectionHeading,
                &sub.id,
                &subsection_heading(index, sub_index, &sub.title),
                &style.fonts.italic,
                style.body_size,
                Align::Left,
                style.section_gap / 2,
            ));
            if let Some(content) = &sub.content {
                units.push(self.text_unit(
                    TextRole::Body,
                    &format!("{}-content", sub.id),
                    content,
                    &style.fonts.regular,
                    style.body_size,
                    Align::Justify,
                ));
            }
        }
        self.place_units(units)
    }

    /// Figures with no (or a dangling) section link go after the last section.
    fn trailing_figures(&mut self, doc: &NormalizedDocument) -> Result<(), LayoutError> {
        self.pager.section = None;
        let mut units = Vec::new();
        for figure in doc.figures.iter().filter(|f| f.section_index.is_none()) {
            let location = Location::element(None, figure.id.clone());
            units.push(Unit::Figure(Box::new(self.figure_unit(
                &figure.id,
                &figure.image,
                location,
            )?)));
        }
        self.place_units(units)
    }

    fn references(&mut self, doc: &NormalizedDocument) -> Result<(), LayoutError> {
        self.pager.section = None;
        if doc.references.is_empty() {
            return Ok(());
        }
        let style = self.style;
        let (formatted, warnings) = format_references(
            doc.references
                .iter()
                .map(|r| (r.text.as_str(), r.declared_order)),
        );
        self.warnings.extend(warnings);

        let mut units = vec![self.heading_unit(
            TextRole::ReferencesHeading,
            "references",
            "REFERENCES",
            &style.fonts.bold,
            style.heading_size,
            Align::Center,
            style.section_gap,
        )];
        let width = self.pager.frame().rect().width;
        let rest_width = width - style.hanging_indent;
        for (reference, source) in formatted.iter().zip(&doc.references) {
            let measured = self.measurer.measure_hanging(
                &reference.display(),
                &style.fonts.regular,
                style.reference_size,
                width,
                rest_width,
            );
            self.note_fallbacks(&measured);
            let id = if source.id.is_empty() {
                format!("reference-{}", reference.number)
            } else {
                source.id.clone()
            };
            let run = TextRun {
                hanging_indent: style.hanging_indent,
                ..self.run(
                    TextRole::Reference,
                    &id,
                    &style.fonts.regular,
                    style.reference_size,
                    Align::Left,
                )
            };
            units.push(Unit::Text {
                run,
                lines: measured.lines,
            });
        }
        self.place_units(units)
    }

    fn figure_unit(
        &mut self,
        id: &str,
        block: &ImageBlock,
        location: Location,
    ) -> Result<FigureUnit, LayoutError> {
        let style = self.style;
        let image = self
            .decoder
            .decode(&block.data)
            .map_err(|reason| LayoutError::UndecodableImage {
                reason,
                location: location.clone(),
            })?;
        for (dimension, value) in [("image width", image.width), ("image height", image.height)] {
            if value == 0 {
                return Err(LayoutError::NonPositiveDimension {
                    dimension,
                    value: 0.0,
                    location,
                });
            }
        }
        self.figures += 1;
        let number = self.figures;
        let column_width = style.column_width();
        let caption_text = figure_caption(number, block.caption.as_deref());
        let caption_lines = self
            .measure(&caption_text, &style.fonts.regular, style.caption_size, column_width)
            .lines;
        let caption = self.run(
            TextRole::Caption,
            &format!("{id}-caption"),
            &style.fonts.regular,
            style.caption_size,
            Align::Center,
        );
        let caption_height = caption.line_height * caption_lines.len() as i32;

        let column_height = style.body_area().height;
        let max_height = style
            .max_figure_height
            .min(column_height - caption_height - style.element_spacing);
        let mut width = style
            .figure_width_fractions
            .apply(block.size, column_width)
            .min(column_width);
        let mut height = width * image.aspect();
        if height > max_height {
            height = max_height;
            width = height * (image.width as f32 / image.height as f32);
        }
        if width <= Pt::ZERO || height <= Pt::ZERO {
            return Err(LayoutError::NonPositiveDimension {
                dimension: if width <= Pt::ZERO { "figure width" } else { "figure height" },
                value: width.min(height).to_f32(),
                location,
            });
        }
        Ok(FigureUnit {
            id: id.to_string(),
            block: block.clone(),
            image,
            number,
            width,
            height,
            caption,
            caption_lines,
            caption_height,
        })
    }

    fn place_figure(&mut self, fig: FigureUnit) -> Result<(), LayoutError> {
        let spacing = self.style.element_spacing;
        self.pager.settle()?;
        self.pager.element_id = Some(fig.id.clone());
        let requested = (self.pager.page, self.pager.column);
        if fig.block.position == FigurePosition::Top
            && !self.pager.frame().is_empty()
            && !self.pager.heading_only
        {
            self.pager.next_frame("figure requested at column top")?;
        }
        let column_width = self.pager.frame().rect().width;
        let (rect, _) = self.pager.place_block(
            column_width,
            fig.total_height(spacing),
            "figure does not fit",
        )?;
        let deferred = (self.pager.page, self.pager.column) != requested;
        if deferred {
            self.pager.log(
                "layout.figure_deferred",
                json!({
                    "figure": fig.id,
                    "from": {"page": requested.0, "column": requested.1},
                    "to": {"page": self.pager.page, "column": self.pager.column},
                }),
            );
        }
        self.pager.push(
            Rect {
                x: rect.x + (column_width - fig.width) / 2,
                y: rect.y,
                width: fig.width,
                height: fig.height,
            },
            Payload::Image(ImagePlacement {
                figure_id: fig.id.clone(),
                number: fig.number,
                pixel_width: fig.image.width,
                pixel_height: fig.image.height,
                size: fig.block.size,
                position: fig.block.position,
                deferred,
                image: fig.image,
            }),
        );
        self.pager.push(
            Rect {
                x: rect.x,
                y: rect.y + fig.height + spacing,
                width: column_width,
                height: fig.caption_height,
            },
            Payload::Text(TextRun {
                lines: fig.caption_lines,
                ..fig.caption
            }),
        );
        self.pager.spacing();
        if fig.block.position == FigurePosition::Bottom {
            self.pager.flush_pending = true;
        }
        Ok(())
    }

    fn table_unit(
        &mut self,
        id: &str,
        rows: &[Vec<String>],
        caption: Option<&str>,
        size: BlockSize,
    ) -> Result<TableUnit, LayoutError> {
        let style = self.style;
        self.tables += 1;
        let number = self.tables;
        let column_width = style.column_width();
        let caption_text = match caption {
            Some(text) => format!("{}\n{}", table_label(number), text),
            None => table_label(number),
        };
        let caption_lines = self
            .measure(&caption_text, &style.fonts.regular, style.caption_size, column_width)
            .lines;
        let caption_run = self.run(
            TextRole::Caption,
            &format!("{id}-caption"),
            &style.fonts.regular,
            style.caption_size,
            Align::Center,
        );
        let caption_height = caption_run.line_height * caption_lines.len() as i32;

        let columns = rows.iter().map(Vec::len).max().unwrap_or(1).max(1);
        let padding = Pt::from_i32(CELL_PADDING);
        let cell_width = column_width / columns as i32;
        let text_width = (cell_width - padding * 2).max(Pt::from_i32(1));
        let line_height = self.measurer.line_height(style.caption_size);
        let mut row_boxes = Vec::with_capacity(rows.len());
        for (row_index, row) in rows.iter().enumerate() {
            let font = if row_index == 0 {
                &style.fonts.bold
            } else {
                &style.fonts.regular
            };
            let mut cells = Vec::with_capacity(columns);
            let mut tallest = 1usize;
            for col in 0..columns {
                let text = row.get(col).map(String::as_str).unwrap_or_default();
                let lines = self.measure(text, font, style.caption_size, text_width).lines;
                tallest = tallest.max(lines.len());
                cells.push(lines);
            }
            row_boxes.push(TableRowBox {
                height: line_height * tallest as i32 + padding * 2,
                cells,
            });
        }
        let natural: Pt = row_boxes.iter().map(|row| row.height).sum();
        let minimum = style.table_height_fractions.apply(size, column_width);
        if natural < minimum && !row_boxes.is_empty() {
            let extra = (minimum - natural) / row_boxes.len() as i32;
            for row in &mut row_boxes {
                row.height += extra;
            }
            let spread: Pt = row_boxes.iter().map(|row| row.height).sum();
            if let Some(last) = row_boxes.last_mut() {
                last.height += minimum - spread;
            }
        }
        let grid_height: Pt = row_boxes.iter().map(|row| row.height).sum();
        if caption_height + style.element_spacing + grid_height > style.body_area().height {
            let message = format!("table '{id}' is taller than a column and will overhang");
            log::warn!("{message}");
            self.warnings
                .push(RenderWarning::new("LAYOUT_TABLE_TALLER_THAN_COLUMN", message));
        }
        Ok(TableUnit {
            caption: caption_run,
            caption_lines,
            caption_height,
            grid: TableGrid {
                table_id: id.to_string(),
                number,
                font: style.fonts.regular.clone(),
                header_font: style.fonts.bold.clone(),
                size: style.caption_size,
                line_height,
                padding,
                column_widths: vec![cell_width; columns],
                rows: row_boxes,
            },
            grid_height,
        })
    }

    fn place_table(&mut self, table: TableUnit) -> Result<(), LayoutError> {
        let spacing = self.style.element_spacing;
        self.pager.element_id = Some(table.grid.table_id.clone());
        let width = self.pager.frame().rect().width;
        let total = table.caption_height + spacing + table.grid_height;
        let (rect, _) = self.pager.place_block(width, total, "table does not fit")?;
        self.pager.push(
            Rect {
                x: rect.x,
                y: rect.y,
                width,
                height: table.caption_height,
            },
            Payload::Text(TextRun {
                lines: table.caption_lines,
                ..table.caption
            }),
        );
        self.pager.push(
            Rect {
                x: rect.x,
                y: rect.y + table.caption_height + spacing,
                width,
                height: table.grid_height,
            },
            Payload::Table(table.grid),
        );
        self.pager.spacing();
        Ok(())
    }

    fn equation_unit(&mut self, id: &str, text: &str, size: BlockSize) -> Unit {
        let style = self.style;
        self.equations += 1;
        let number = self.equations;
        let label = equation_label(number);
        let label_width = self
            .measurer
            .text_width(&label, &style.fonts.regular, style.body_size);
        let column_width = style.column_width();
        let text_width = column_width - (label_width + Pt::from_i32(EQUATION_LABEL_GAP)) * 2;
        let lines = self
            .measure(text, &style.fonts.italic, style.body_size, text_width)
            .lines;
        let line_height = self.measurer.line_height(style.body_size);
        let height = (line_height * lines.len() as i32).max(
            style
                .equation_height_fractions
                .apply(size, column_width),
        );
        Unit::Equation {
            eq: EquationLine {
                equation_id: id.to_string(),
                number,
                label,
                label_width,
                font: style.fonts.italic.clone(),
                label_font: style.fonts.regular.clone(),
                size: style.body_size,
                line_height,
                lines,
            },
            height,
        }
    }

    fn finish(mut self, doc: &NormalizedDocument) -> Result<LayoutProgram, LayoutError> {
        let style = self.style;
        let page_count = self.pager.page + 1;
        if doc.settings.include_page_numbers {
            let size = style.footer_size;
            let line_height = self.measurer.line_height(size);
            let area = style.body_area();
            let y = style.page_size.height - (style.margins.bottom + line_height) / 2;
            for page in 0..page_count {
                let text = (page + 1).to_string();
                let width = self.measurer.text_width(&text, &style.fonts.regular, size);
                let run = TextRun {
                    lines: vec![LineBox {
                        text,
                        width,
                        ends_paragraph: true,
                    }],
                    ..self.run(
                        TextRole::PageNumber,
                        &format!("page-number-{}", page + 1),
                        &style.fonts.regular,
                        size,
                        Align::Center,
                    )
                };
                self.pager.elements.push(PlacedElement {
                    page,
                    column: 0,
                    x: area.x,
                    y,
                    width: area.width,
                    height: line_height,
                    section: None,
                    payload: Payload::Text(run),
                });
            }
        }
        let summary = json!({
            "pages": page_count,
            "elements": self.pager.elements.len(),
            "figures": self.figures,
            "tables": self.tables,
            "equations": self.equations,
        });
        self.pager.log("layout.summary", summary);
        self.pager.close_trace();
        Ok(LayoutProgram {
            title: doc.title.clone(),
            geometry: PageGeometry {
                page_size: style.page_size,
                margins: style.margins,
                columns: style.columns,
                column_gutter: style.column_gutter,
            },
            fonts: style.fonts.clone(),
            page_count,
            section_count: doc.sections.len(),
            page_numbers: doc.settings.include_page_numbers,
            footer_size: style.footer_size,
            element_spacing: style.element_spacing,
            elements: self.pager.elements,
            warnings: self.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RasterImageDecoder;
    use crate::imaging::tests::png_base64;
    use crate::metrics::FontRegistry;
    use crate::model::{Author, ContentBlock, Document, Figure, Reference, Section};
    use crate::normalize::normalize;
    use std::sync::Arc;

    fn prose(chars: usize) -> String {
        let words = [
            "qubits", "entangle", "under", "careful", "control", "and", "the", "measurement",
            "collapses", "their", "joint", "state",
        ];
        let mut out = String::new();
        for word in words.iter().cycle() {
            if out.len() >= chars {
                break;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
        out
    }

    fn text_block(id: &str, content: &str) -> ContentBlock {
        ContentBlock {
            id: id.to_string(),
            block_type: "text".to_string(),
            content: Some(content.to_string()),
            ..ContentBlock::default()
        }
    }

    fn image_block(id: &str, position: &str) -> ContentBlock {
        ContentBlock {
            id: id.to_string(),
            block_type: "image".to_string(),
            data: Some(png_base64(40, 30)),
            caption: Some("Circuit".to_string()),
            size: Some("medium".to_string()),
            position: Some(position.to_string()),
            ..ContentBlock::default()
        }
    }

    fn paper(sections: Vec<Section>) -> Document {
        Document {
            title: "Quantum Computing".to_string(),
            authors: vec![Author {
                name: "Ada Lovelace".to_string(),
                organization: Some("Analytical Engines Ltd.".to_string()),
                ..Author::default()
            }],
            sections,
            ..Document::default()
        }
    }

    fn section(id: &str, title: &str, blocks: Vec<ContentBlock>) -> Section {
        Section {
            id: id.to_string(),
            title: title.to_string(),
            content_blocks: blocks,
            ..Section::default()
        }
    }

    fn lay_out_with(style: &StyleConfig, doc: &Document) -> Result<LayoutProgram, LayoutError> {
        let normalized = normalize(doc).unwrap();
        let measurer = TextMeasurer::for_style(Arc::new(FontRegistry::new()), style);
        LayoutEngine::new(style, &measurer, &RasterImageDecoder).layout(&normalized)
    }

    fn lay_out(doc: &Document) -> LayoutProgram {
        lay_out_with(&StyleConfig::ieee_conference().unwrap(), doc).unwrap()
    }

    #[test]
    fn split_text_fills_each_column_before_moving_on() {
        let doc = paper(vec![
            section("s1", "Introduction", vec![text_block("b1", &prose(3000))]),
            section("s2", "Method", vec![text_block("b2", &prose(3000))]),
        ]);
        let program = lay_out(&doc);
        let style = StyleConfig::ieee_conference().unwrap();
        let bottom = style.page_bottom();
        let body: Vec<&PlacedElement> = program
            .elements
            .iter()
            .filter(|el| el.kind() == "text")
            .collect();
        for pair in body.windows(2) {
            let (Some(a), Some(b)) = (pair[0].text_run(), pair[1].text_run()) else {
                continue;
            };
            if a.source_id == b.source_id {
                // The earlier fragment left less than a line unused.
                assert!(pair[0].bottom() + a.line_height > bottom);
                assert_eq!(b.fragment, a.fragment + 1);
            }
        }
        let last_page = program.elements.iter().map(|el| el.page).max().unwrap();
        assert_eq!(program.page_count, last_page + 1);
        assert_eq!(program.section_count, 2);
    }

    #[test]
    fn top_figure_after_text_opens_the_next_column() {
        let doc = paper(vec![section(
            "s1",
            "Introduction",
            vec![text_block("b1", &prose(400)), image_block("f1", "top")],
        )]);
        let program = lay_out(&doc);
        let image = program
            .elements
            .iter()
            .find(|el| el.kind() == "image")
            .unwrap();
        let Payload::Image(placement) = &image.payload else {
            unreachable!()
        };
        assert!(placement.deferred);
        assert_eq!((image.page, image.column), (0, 1));
        let first_in_column = program
            .elements
            .iter()
            .filter(|el| el.page == image.page && el.column == image.column)
            .filter(|el| el.kind() != "page_number")
            .min_by(|a, b| a.y.partial_cmp(&b.y).unwrap())
            .unwrap();
        assert_eq!(first_in_column.kind(), "image");
    }

    #[test]
    fn here_figure_with_room_stays_in_place() {
        let doc = paper(vec![section(
            "s1",
            "Introduction",
            vec![text_block("b1", &prose(200)), image_block("f1", "here")],
        )]);
        let program = lay_out(&doc);
        let image = program.elements.iter().find(|el| el.kind() == "image").unwrap();
        let Payload::Image(placement) = &image.payload else {
            unreachable!()
        };
        assert!(!placement.deferred);
        assert_eq!(image.column, 0);
        let caption = program
            .elements
            .iter()
            .find(|el| el.kind() == "caption")
            .unwrap();
        assert_eq!(caption.text(), "Fig. 1. Circuit");
        assert!(caption.y > image.bottom());
    }

    #[test]
    fn bottom_figure_closes_its_column() {
        let doc = paper(vec![section(
            "s1",
            "Introduction",
            vec![
                text_block("b1", &prose(200)),
                image_block("f1", "bottom"),
                text_block("b2", &prose(200)),
            ],
        )]);
        let program = lay_out(&doc);
        let image = program.elements.iter().find(|el| el.kind() == "image").unwrap();
        let after = program
            .elements
            .iter()
            .find(|el| el.text_run().is_some_and(|run| run.source_id == "b2"))
            .unwrap();
        assert_eq!(after.column, image.column + 1);
    }

    #[test]
    fn figures_and_tables_number_in_document_order() {
        let table = ContentBlock {
            id: "t1".to_string(),
            block_type: "table".to_string(),
            rows: Some(vec![
                vec!["Gate".to_string(), "Fidelity".to_string()],
                vec!["CNOT".to_string(), "0.99".to_string()],
            ]),
            caption: Some("Results".to_string()),
            ..ContentBlock::default()
        };
        let mut doc = paper(vec![section(
            "s1",
            "Introduction",
            vec![image_block("f1", "here"), table, image_block("f2", "here")],
        )]);
        doc.figures.push(Figure {
            id: "loose".to_string(),
            data: png_base64(20, 20),
            caption: "Loose".to_string(),
            ..Figure::default()
        });
        let program = lay_out(&doc);
        let numbers: Vec<usize> = program
            .elements
            .iter()
            .filter_map(|el| match &el.payload {
                Payload::Image(image) => Some(image.number),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        let captions: Vec<String> = program
            .elements
            .iter()
            .filter(|el| el.kind() == "caption")
            .map(PlacedElement::text)
            .collect();
        assert_eq!(captions[1], "TABLE I Results");
        assert_eq!(captions[3], "Fig. 3. Loose");
        let grid = program.elements.iter().find(|el| el.kind() == "table").unwrap();
        assert!(grid.height >= StyleConfig::ieee_conference().unwrap().table_height_fractions.apply(BlockSize::Medium, grid.width));
    }

    #[test]
    fn references_are_numbered_with_hanging_indent() {
        let mut doc = paper(vec![section("s1", "Introduction", vec![text_block("b1", "Short.")])]);
        doc.references = vec![
            Reference {
                text: "A. Author, \"First,\" 2020.".to_string(),
                ..Reference::default()
            },
            Reference {
                text: "B. Author, \"Second,\" 2021.".to_string(),
                ..Reference::default()
            },
        ];
        let program = lay_out(&doc);
        let refs: Vec<&PlacedElement> = program
            .elements
            .iter()
            .filter(|el| el.kind() == "reference")
            .collect();
        assert_eq!(refs.len(), 2);
        assert!(refs[0].text().starts_with("[1] "));
        assert!(refs[1].text().starts_with("[2] "));
        assert!(refs[0].text_run().unwrap().hanging_indent > Pt::ZERO);
        assert_eq!(program.reference_count(), 2);
        let heading = program
            .elements
            .iter()
            .position(|el| el.kind() == "references_heading")
            .unwrap();
        let first_ref = program.elements.iter().position(|el| el.kind() == "reference").unwrap();
        assert!(heading < first_ref);
    }

    #[test]
    fn page_ceiling_stops_runaway_documents() {
        let mut style = StyleConfig::ieee_conference().unwrap();
        style.page_ceiling = 1;
        let doc = paper(vec![section("s1", "Introduction", vec![text_block("b1", &prose(12000))])]);
        let err = lay_out_with(&style, &doc).unwrap_err();
        assert_eq!(err.code(), "LAYOUT_PAGE_LIMIT_EXCEEDED");
        assert_eq!(err.location().section_index, Some(0));
        assert_eq!(err.location().page_index, Some(0));
    }

    #[test]
    fn undecodable_figure_reports_its_block() {
        let mut bad = image_block("f1", "here");
        bad.data = Some("bm90IGFuIGltYWdl".to_string());
        let doc = paper(vec![section("s1", "Introduction", vec![bad])]);
        let err = lay_out_with(&StyleConfig::ieee_conference().unwrap(), &doc).unwrap_err();
        assert_eq!(err.code(), "LAYOUT_UNDECODABLE_IMAGE");
        assert_eq!(err.location().element_id.as_deref(), Some("f1"));
    }

    fn one_line(role: TextRole, id: &str, text: &str) -> (TextRun, Vec<LineBox>) {
        let run = TextRun {
            role,
            source_id: id.to_string(),
            fragment: 0,
            font: "Times-Bold".to_string(),
            size: Pt::from_i32(10),
            line_height: Pt::from_i32(10),
            align: Align::Center,
            hanging_indent: Pt::ZERO,
            lines: Vec::new(),
        };
        let lines = vec![LineBox {
            text: text.to_string(),
            width: Pt::from_i32(50),
            ends_paragraph: true,
        }];
        (run, lines)
    }

    /// A body pager whose first column has `left` points of room.
    fn pager_with_room(style: &StyleConfig, left: Pt) -> Pager<'_> {
        let mut pager = Pager::new(style, None);
        pager.in_body = true;
        pager.frames = PageTemplate::columns(style).instantiate_frames();
        let used = pager.frame().rect().height - left;
        pager.frame_mut().add(Pt::from_i32(243), used);
        pager
    }

    #[test]
    fn heading_never_ends_a_column_alone() {
        let style = StyleConfig::ieee_conference().unwrap();
        let line = Pt::from_i32(10);
        let mut pager = pager_with_room(&style, line * 2);
        let (run, lines) = one_line(TextRole::SectionHeading, "s2", "II. METHOD");
        pager
            .place_heading(run, lines, style.section_gap, Some(line))
            .unwrap();
        let heading = pager.elements.last().unwrap();
        assert_eq!(heading.column, 1);
        assert_eq!(heading.y, style.margins.top);
    }

    #[test]
    fn heading_counts_the_spacing_before_its_first_line() {
        let style = StyleConfig::ieee_conference().unwrap();
        let line = Pt::from_i32(10);
        let extra = style.section_gap - style.element_spacing;
        // Room for the gap, the heading and one more line, but not the
        // spacing between heading and text.
        let mut pager = pager_with_room(&style, extra + line + line);
        let (run, lines) = one_line(TextRole::SectionHeading, "s2", "II. METHOD");
        pager
            .place_heading(run, lines, style.section_gap, Some(line))
            .unwrap();
        let (run, lines) = one_line(TextRole::Body, "b2", "First sentence.");
        pager.place_text(run, lines).unwrap();
        let heading = &pager.elements[0];
        let body = &pager.elements[1];
        assert_eq!((heading.page, heading.column), (body.page, body.column));
        assert_eq!(heading.column, 1);
    }

    #[test]
    fn heading_before_a_top_figure_opens_the_next_column() {
        let style = StyleConfig::ieee_conference().unwrap();
        let mut pager = pager_with_room(&style, Pt::from_i32(300));
        let (run, lines) = one_line(TextRole::SectionHeading, "s2", "II. METHOD");
        pager
            .place_heading(run, lines, style.section_gap, None)
            .unwrap();
        assert_eq!(pager.elements[0].column, 1);
        assert!(pager.heading_only);
    }

    #[test]
    fn top_figure_stays_under_the_heading_that_opened_its_column() {
        let doc = paper(vec![
            section("s1", "Introduction", vec![text_block("b1", &prose(400))]),
            section("s2", "Method", vec![image_block("f1", "top")]),
        ]);
        let program = lay_out(&doc);
        let heading = program
            .elements
            .iter()
            .find(|el| el.text_run().is_some_and(|run| run.source_id == "s2"))
            .unwrap();
        let image = program.elements.iter().find(|el| el.kind() == "image").unwrap();
        assert_eq!((heading.page, heading.column), (image.page, image.column));
        assert!(heading.bottom() <= image.y);
        let first_in_column = program
            .elements
            .iter()
            .filter(|el| el.page == heading.page && el.column == heading.column)
            .filter(|el| el.kind() != "page_number")
            .min_by(|a, b| a.y.partial_cmp(&b.y).unwrap())
            .unwrap();
        assert_eq!(first_in_column.kind(), "section_heading");
    }

    #[test]
    fn copyright_stays_on_page_one_under_long_front_matter() {
        let mut doc = paper(vec![section("s1", "Introduction", vec![text_block("b1", "Short.")])]);
        doc.abstract_text = Some(prose(12000));
        doc.settings.include_copyright = true;
        let program = lay_out(&doc);
        let last_abstract = program
            .elements
            .iter()
            .filter(|el| el.kind() == "abstract")
            .map(|el| el.page)
            .max()
            .unwrap();
        assert!(last_abstract >= 1);
        let copyright = program
            .elements
            .iter()
            .find(|el| el.kind() == "copyright")
            .unwrap();
        assert_eq!((copyright.page, copyright.column), (0, 0));
        assert_eq!(copyright.x, StyleConfig::ieee_conference().unwrap().margins.left);
        let content = program
            .elements_on_page(0)
            .filter(|el| !el.text_run().is_some_and(|run| run.role.is_furniture()))
            .filter(|el| el.kind() != "copyright");
        for el in content {
            assert!(el.bottom() <= copyright.y, "{} overlaps the notice", el.kind());
        }
    }

    #[test]
    fn page_numbers_and_copyright_are_furniture() {
        let mut doc = paper(vec![section("s1", "Introduction", vec![text_block("b1", &prose(6000))])]);
        doc.settings.include_page_numbers = true;
        doc.settings.include_copyright = true;
        let program = lay_out(&doc);
        let numbers: Vec<String> = program
            .elements
            .iter()
            .filter(|el| el.kind() == "page_number")
            .map(PlacedElement::text)
            .collect();
        assert_eq!(numbers.len(), program.page_count);
        assert_eq!(numbers[0], "1");
        let copyright = program
            .elements
            .iter()
            .find(|el| el.kind() == "copyright")
            .unwrap();
        assert_eq!((copyright.page, copyright.column), (0, 0));
        // Body text in the first column stays above the notice.
        for el in program.elements_on_page(0).filter(|el| el.column == 0 && el.kind() == "text") {
            assert!(el.bottom() <= copyright.y);
        }
    }
}
