mod canvas;
mod debug;
mod docx;
mod error;
mod frame;
mod imaging;
mod inspect;
mod layout;
mod metrics;
mod model;
mod normalize;
mod numbering;
mod page_template;
mod pdf;
mod program;
mod report;
mod style;
mod text;
mod types;

pub use canvas::{Canvas, Command, Drawing, Page};
use debug::DebugLogger;
pub use docx::{DocxOutput, Inline, WordBlock, WordDocument, WordParagraph, WordTable, render_docx};
pub use error::{
    LayoutError, Location, MeasurementError, RenderError, RenderWarning, ValidationError,
};
pub use frame::{AddResult, Frame};
pub use imaging::{DecodedImage, ImageDecoder, RasterFormat, RasterImageDecoder};
pub use inspect::{InspectError, PdfInspectReport, inspect_pdf_bytes, inspect_pdf_path};
pub use layout::LayoutEngine;
pub use metrics::{
    FontMetricsProvider, FontRegistry, LineBox, Measured, TextMeasurer, TrueTypeMetrics,
};
pub use model::{
    Author, ContentBlock, CustomField, Document, DocumentSettings, Figure, Reference, Section,
    Subsection,
};
pub use normalize::{
    Block, ExportFormat, FigurePosition, ImageBlock, NormalizedAuthor, NormalizedBlock,
    NormalizedDocument, NormalizedFigure, NormalizedReference, NormalizedSection,
    NormalizedSubsection, RenderSettings, normalize,
};
pub use numbering::{
    FormattedReference, arabic_to_roman, equation_label, figure_caption, figure_label,
    format_references, roman_to_arabic, section_heading, subsection_heading, subsection_label,
    table_label,
};
pub use page_template::{FrameSpec, PageTemplate};
pub use papersetter_style_contract::{
    CONTRACT_ID as STYLE_CONTRACT_ID, contract_fingerprint_sha256 as style_contract_fingerprint,
};
pub use pdf::{PdfOutput, render_pdf};
pub use program::{
    Align, EquationLine, ImagePlacement, LayoutProgram, PageGeometry, Payload, PlacedElement,
    TableGrid, TableRowBox, TextRole, TextRun,
};
use rayon::prelude::*;
pub use report::RendererReport;
use std::path::PathBuf;
use std::sync::Arc;
pub use style::{BlockSize, FontSet, SizeTable, StyleConfig};
pub use text::{collapse_whitespace, html_to_text, sanitize};
pub use types::{Margins, Pt, Rect, Size};

/// A finished paper in one export format.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub format: ExportFormat,
    pub bytes: Vec<u8>,
    pub page_count: usize,
    pub report: RendererReport,
    /// Normalizer, layout and backend warnings, in that order.
    pub warnings: Vec<RenderWarning>,
}

impl RenderOutput {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.format.extension())
    }
}

/// Both formats of one paper, from a single layout pass.
#[derive(Debug, Clone)]
pub struct RenderPair {
    pub pdf: RenderOutput,
    pub docx: RenderOutput,
}

/// The engine: a validated style plus the services layout needs. Cheap to
/// share across threads; every render works on its own state.
pub struct Papersetter {
    style: StyleConfig,
    metrics: Arc<dyn FontMetricsProvider>,
    decoder: Arc<dyn ImageDecoder>,
    debug: Option<DebugLogger>,
}

impl Papersetter {
    pub fn builder() -> PapersetterBuilder {
        PapersetterBuilder::new()
    }

    pub fn style(&self) -> &StyleConfig {
        &self.style
    }

    pub fn normalize(&self, document: &Document) -> Result<NormalizedDocument, RenderError> {
        normalize(document)
    }

    /// Normalizes and lays out a document without rendering it.
    pub fn layout(&self, document: &Document) -> Result<LayoutProgram, RenderError> {
        let normalized = normalize(document)?;
        self.layout_normalized(&normalized)
    }

    pub fn layout_normalized(
        &self,
        document: &NormalizedDocument,
    ) -> Result<LayoutProgram, RenderError> {
        let style = self.style_for(&document.settings)?;
        let measurer = TextMeasurer::for_style(Arc::clone(&self.metrics), &style);
        let engine = LayoutEngine::new(&style, &measurer, self.decoder.as_ref())
            .with_debug(self.debug.as_ref());
        let program = engine.layout(document)?;
        log::debug!(
            "laid out '{}': {} pages, {} elements",
            program.title,
            program.page_count,
            program.elements.len()
        );
        Ok(program)
    }

    /// Renders in the format the document's settings ask for.
    pub fn render(&self, document: &Document) -> Result<RenderOutput, RenderError> {
        let normalized = normalize(document)?;
        let program = self.layout_normalized(&normalized)?;
        match normalized.settings.export_format {
            ExportFormat::Pdf => pdf_output(&program),
            ExportFormat::Docx => docx_output(&program),
        }
    }

    pub fn render_pdf(&self, document: &Document) -> Result<RenderOutput, RenderError> {
        pdf_output(&self.layout(document)?)
    }

    pub fn render_docx(&self, document: &Document) -> Result<RenderOutput, RenderError> {
        docx_output(&self.layout(document)?)
    }

    /// Parses the editor JSON, then renders it like [`Papersetter::render`].
    pub fn render_json(&self, json: &str) -> Result<RenderOutput, RenderError> {
        let document = Document::from_json(json)?;
        self.render(&document)
    }

    /// The placed-element records as pretty JSON, for debugging layouts.
    pub fn render_layout_json(&self, document: &Document) -> Result<String, RenderError> {
        let program = self.layout(document)?;
        program.to_json().map_err(|err| RenderError::Backend {
            backend: "layout-json",
            message: err.to_string(),
        })
    }

    /// Lays the document out once and writes both formats concurrently.
    /// Fails when the two backends disagree on what they emitted.
    pub fn render_both(&self, document: &Document) -> Result<RenderPair, RenderError> {
        let program = self.layout(document)?;
        let (pdf, docx) = rayon::join(|| pdf_output(&program), || docx_output(&program));
        let (pdf, docx) = (pdf?, docx?);
        let differences = pdf.report.differences(&docx.report);
        if !differences.is_empty() {
            return Err(RenderError::Backend {
                backend: "docx",
                message: format!("renderers disagree: {}", differences.join("; ")),
            });
        }
        Ok(RenderPair { pdf, docx })
    }

    /// Renders every document in parallel. Results keep the input order and
    /// one failure does not stop the others.
    pub fn render_many(&self, documents: &[Document]) -> Vec<Result<RenderOutput, RenderError>> {
        documents
            .par_iter()
            .map(|document| self.render(document))
            .collect()
    }

    fn style_for(&self, settings: &RenderSettings) -> Result<StyleConfig, RenderError> {
        let mut style = match settings.body_size {
            Some(size) => self.style.with_body_size(size),
            None => self.style.clone(),
        };
        if let Some(columns) = settings.columns {
            style = style.with_columns(columns);
        }
        style.validate()?;
        Ok(style)
    }
}

fn pdf_output(program: &LayoutProgram) -> Result<RenderOutput, RenderError> {
    let PdfOutput {
        bytes,
        report,
        warnings,
    } = render_pdf(program)?;
    let mut all = program.warnings.clone();
    all.extend(warnings);
    Ok(RenderOutput {
        format: ExportFormat::Pdf,
        bytes,
        page_count: program.page_count,
        report,
        warnings: all,
    })
}

fn docx_output(program: &LayoutProgram) -> Result<RenderOutput, RenderError> {
    let DocxOutput { bytes, report } = render_docx(program)?;
    Ok(RenderOutput {
        format: ExportFormat::Docx,
        bytes,
        page_count: program.page_count,
        report,
        warnings: program.warnings.clone(),
    })
}

enum StyleSource {
    Preset,
    Json(String),
    Config(Box<StyleConfig>),
}

pub struct PapersetterBuilder {
    style: StyleSource,
    metrics: Option<Arc<dyn FontMetricsProvider>>,
    fonts: Vec<(Vec<u8>, Option<String>)>,
    decoder: Arc<dyn ImageDecoder>,
    page_ceiling: Option<usize>,
    debug_path: Option<PathBuf>,
}

impl PapersetterBuilder {
    pub fn new() -> Self {
        Self {
            style: StyleSource::Preset,
            metrics: None,
            fonts: Vec::new(),
            decoder: Arc::new(RasterImageDecoder),
            page_ceiling: None,
            debug_path: None,
        }
    }

    pub fn style(mut self, style: StyleConfig) -> Self {
        self.style = StyleSource::Config(Box::new(style));
        self
    }

    /// A style preset in the embedded preset's JSON shape.
    pub fn style_preset_json(mut self, json: impl Into<String>) -> Self {
        self.style = StyleSource::Json(json.into());
        self
    }

    pub fn metrics_provider(mut self, provider: Arc<dyn FontMetricsProvider>) -> Self {
        self.metrics = Some(provider);
        self
    }

    /// Measures text set in `alias` (and the face's own name) with a
    /// TrueType face instead of the built-in Times tables.
    pub fn register_font_bytes(mut self, data: Vec<u8>, alias: Option<&str>) -> Self {
        self.fonts.push((data, alias.map(str::to_string)));
        self
    }

    pub fn image_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Overrides the style's page ceiling.
    pub fn page_ceiling(mut self, pages: usize) -> Self {
        self.page_ceiling = Some(pages);
        self
    }

    /// Layout trace as JSONL: breaks, deferrals and a counter summary per render.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Papersetter, RenderError> {
        let mut style = match self.style {
            StyleSource::Preset => StyleConfig::ieee_conference()?,
            StyleSource::Json(json) => StyleConfig::from_preset_json(&json)?,
            StyleSource::Config(style) => *style,
        };
        if let Some(pages) = self.page_ceiling {
            style.page_ceiling = pages;
        }
        style.validate()?;

        if self.metrics.is_some() && !self.fonts.is_empty() {
            return Err(RenderError::InvalidConfiguration(
                "register_font_bytes cannot be combined with a custom metrics_provider"
                    .to_string(),
            ));
        }
        let metrics: Arc<dyn FontMetricsProvider> = match self.metrics {
            Some(provider) => provider,
            None => {
                let mut registry = FontRegistry::new();
                for (data, alias) in &self.fonts {
                    registry
                        .register_bytes(data, alias.as_deref())
                        .map_err(|err| RenderError::InvalidConfiguration(err.to_string()))?;
                }
                Arc::new(registry)
            }
        };

        let debug = match self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };
        Ok(Papersetter {
            style,
            metrics,
            decoder: self.decoder,
            debug,
        })
    }
}

impl Default for PapersetterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
