//! PDF backend: replays the Layout Program onto a [`Canvas`] and serializes
//! the drawing with base-14 Times fonts and flate-compressed streams.
//!
//! Output carries no timestamps or random ids, so the same program always
//! produces the same bytes.

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::ColorType;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use crate::canvas::{Canvas, Command, Drawing, Page};
use crate::error::{RenderError, RenderWarning};
use crate::imaging::{DecodedImage, RasterFormat};
use crate::program::{
    Align, EquationLine, LayoutProgram, Payload, PlacedElement, TableGrid, TextRole, TextRun,
};
use crate::report::RendererReport;
use crate::style::FontSet;
use crate::types::Pt;

const RULE_WIDTH_MILLI: i64 = 500;

pub struct PdfOutput {
    pub bytes: Vec<u8>,
    pub report: RendererReport,
    pub warnings: Vec<RenderWarning>,
}

pub fn render_pdf(program: &LayoutProgram) -> Result<PdfOutput, RenderError> {
    let mut painter = Painter::new(program);
    painter.paint();
    let Painter {
        canvas,
        report,
        images,
        mut warnings,
        ..
    } = painter;
    let drawing = canvas.finish();
    let bytes = write_pdf(&drawing, &images, &program.title, &mut warnings)?;
    log::debug!(
        "pdf written: {} pages, {} images, {} bytes",
        drawing.pages.len(),
        images.len(),
        bytes.len()
    );
    Ok(PdfOutput {
        bytes,
        report: report.finish(),
        warnings,
    })
}

struct Painter<'a> {
    program: &'a LayoutProgram,
    canvas: Canvas,
    report: RendererReport,
    images: BTreeMap<String, DecodedImage>,
    warnings: Vec<RenderWarning>,
    substituted: BTreeSet<String>,
}

impl<'a> Painter<'a> {
    fn new(program: &'a LayoutProgram) -> Self {
        Self {
            program,
            canvas: Canvas::new(program.geometry.page_size),
            report: RendererReport::new("pdf", program.section_count),
            images: BTreeMap::new(),
            warnings: Vec::new(),
            substituted: BTreeSet::new(),
        }
    }

    fn paint(&mut self) {
        let program = self.program;
        let mut pages: Vec<Vec<&PlacedElement>> = vec![Vec::new(); program.page_count.max(1)];
        for element in &program.elements {
            if let Some(page) = pages.get_mut(element.page) {
                page.push(element);
            }
        }
        let last = pages.len() - 1;
        for (index, elements) in pages.into_iter().enumerate() {
            for element in elements {
                self.element(element);
            }
            if index < last {
                self.canvas.show_page();
            }
        }
    }

    fn element(&mut self, element: &PlacedElement) {
        match &element.payload {
            Payload::Text(run) => {
                if run.role == TextRole::Reference && run.fragment == 0 {
                    self.report.reference_count += 1;
                }
                self.text(element, run);
            }
            Payload::Image(image) => {
                let resource = format!("Im{}", image.number);
                self.images
                    .entry(resource.clone())
                    .or_insert_with(|| image.image.clone());
                self.canvas
                    .draw_image(element.x, element.y, element.width, element.height, resource);
            }
            Payload::Table(grid) => self.table(element, grid),
            Payload::Equation(eq) => self.equation(element, eq),
        }
    }

    fn select_font(&mut self, family: &str, size: Pt) {
        let base = self.base_font(family);
        self.canvas.set_font_name(&base);
        self.canvas.set_font_size(size);
    }

    /// Maps a family onto the base-14 Times face it stands for.
    fn base_font(&mut self, family: &str) -> String {
        if let Some(base) = base14_name(family) {
            return base.to_string();
        }
        let fonts: &FontSet = &self.program.fonts;
        let base = match (fonts.is_bold(family), fonts.is_italic(family)) {
            (true, true) => "Times-BoldItalic",
            (true, false) => "Times-Bold",
            (false, true) => "Times-Italic",
            (false, false) => "Times-Roman",
        };
        if self.substituted.insert(family.to_string()) {
            let message = format!("font family '{family}' is drawn as {base}");
            log::warn!("{message}");
            self.warnings
                .push(RenderWarning::new("PDF_FONT_SUBSTITUTED", message));
        }
        base.to_string()
    }

    fn text(&mut self, element: &PlacedElement, run: &TextRun) {
        self.select_font(&run.font, run.size);
        let offset = baseline_offset(run.size, run.line_height);
        for (index, line) in run.lines.iter().enumerate() {
            if line.text.is_empty() {
                continue;
            }
            let first_of_block = run.fragment == 0 && index == 0;
            let indent = if first_of_block {
                Pt::ZERO
            } else {
                run.hanging_indent
            };
            let available = element.width - indent;
            let slack = (available - line.width).max(Pt::ZERO);
            let x = element.x
                + indent
                + match run.align {
                    Align::Left | Align::Justify => Pt::ZERO,
                    Align::Center => slack / 2,
                    Align::Right => slack,
                };
            let spaces = line.text.matches(' ').count() as i32;
            let spacing = if run.align == Align::Justify && !line.ends_paragraph && spaces > 0 {
                slack / spaces
            } else {
                Pt::ZERO
            };
            self.canvas.set_word_spacing(spacing);
            let baseline = element.y + run.line_height * index as i32 + offset;
            self.canvas.draw_string(x, baseline, line.text.clone());
            if let Some(section) = element.section {
                self.report.push_text(section, &line.text);
            }
        }
        self.canvas.set_word_spacing(Pt::ZERO);
    }

    fn table(&mut self, element: &PlacedElement, grid: &TableGrid) {
        let right = element.x + grid.column_widths.iter().copied().sum::<Pt>();
        let offset = baseline_offset(grid.size, grid.line_height);
        self.canvas.set_line_width(Pt::from_milli_i64(RULE_WIDTH_MILLI));
        let mut top = element.y;
        self.canvas.rule((element.x, top), (right, top));
        for (row_index, row) in grid.rows.iter().enumerate() {
            let font = if row_index == 0 {
                grid.header_font.clone()
            } else {
                grid.font.clone()
            };
            self.select_font(&font, grid.size);
            let mut x = element.x;
            for (cell, width) in row.cells.iter().zip(&grid.column_widths) {
                for (index, line) in cell.iter().enumerate() {
                    if line.text.is_empty() {
                        continue;
                    }
                    let baseline = top + grid.padding + grid.line_height * index as i32 + offset;
                    self.canvas
                        .draw_string(x + grid.padding, baseline, line.text.clone());
                    if let Some(section) = element.section {
                        self.report.push_text(section, &line.text);
                    }
                }
                x += *width;
            }
            top += row.height;
            self.canvas.rule((element.x, top), (right, top));
        }
        let mut x = element.x;
        self.canvas.rule((x, element.y), (x, top));
        for width in &grid.column_widths {
            x += *width;
            self.canvas.rule((x, element.y), (x, top));
        }
    }

    fn equation(&mut self, element: &PlacedElement, eq: &EquationLine) {
        let block = eq.line_height * eq.lines.len().max(1) as i32;
        let top = element.y + ((element.height - block) / 2).max(Pt::ZERO);
        let offset = baseline_offset(eq.size, eq.line_height);
        self.select_font(&eq.font, eq.size);
        for (index, line) in eq.lines.iter().enumerate() {
            let x = element.x + ((element.width - line.width) / 2).max(Pt::ZERO);
            let baseline = top + eq.line_height * index as i32 + offset;
            self.canvas.draw_string(x, baseline, line.text.clone());
            if let Some(section) = element.section {
                self.report.push_text(section, &line.text);
            }
        }
        self.select_font(&eq.label_font, eq.size);
        self.canvas
            .draw_string(element.right() - eq.label_width, top + offset, eq.label.clone());
        if let Some(section) = element.section {
            self.report.push_text(section, &eq.label);
        }
    }
}

/// Distance from the top of a line box to the baseline: the glyphs sit
/// centered in the leading with a 0.8em ascent.
fn baseline_offset(size: Pt, line_height: Pt) -> Pt {
    (line_height - size) / 2 + size.mul_ratio(4, 5)
}

fn base14_name(name: &str) -> Option<&'static str> {
    let n = name
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase();
    let base = match n.as_str() {
        "times-roman" | "times" => "Times-Roman",
        "times-bold" => "Times-Bold",
        "times-italic" => "Times-Italic",
        "times-bolditalic" => "Times-BoldItalic",
        "helvetica" => "Helvetica",
        "helvetica-bold" => "Helvetica-Bold",
        "helvetica-oblique" => "Helvetica-Oblique",
        "helvetica-boldoblique" => "Helvetica-BoldOblique",
        "courier" => "Courier",
        "courier-bold" => "Courier-Bold",
        "courier-oblique" => "Courier-Oblique",
        "courier-boldoblique" => "Courier-BoldOblique",
        "symbol" => "Symbol",
        _ => return None,
    };
    Some(base)
}

struct ImageData {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

/// JPEG passes through untouched; everything else becomes flate RGB with an
/// optional soft mask.
fn image_data(image: &DecodedImage) -> Result<ImageData, RenderError> {
    let (width, height) = (image.width, image.height);
    if image.format == RasterFormat::Jpeg {
        let color_space = match image.pixels.color() {
            ColorType::L8 | ColorType::La8 => "/DeviceGray",
            _ => "/DeviceRGB",
        };
        return Ok(ImageData {
            width,
            height,
            color_space,
            filter: "/DCTDecode",
            data: image.encoded.as_ref().clone(),
            alpha: None,
        });
    }

    let rgba = image.pixels.to_rgba8();
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    let mut alpha = Vec::with_capacity(width as usize * height as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        has_alpha |= a != 255;
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    Ok(ImageData {
        width,
        height,
        color_space: "/DeviceRGB",
        filter: "/FlateDecode",
        data: flate_compress(&rgb)?,
        alpha: if has_alpha {
            Some(flate_compress(&alpha)?)
        } else {
            None
        },
    })
}

fn flate_compress(data: &[u8]) -> Result<Vec<u8>, RenderError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).map_err(backend_error)?;
    encoder.finish().map_err(backend_error)
}

fn backend_error(err: std::io::Error) -> RenderError {
    RenderError::Backend {
        backend: "pdf",
        message: err.to_string(),
    }
}

fn collect_font_names(drawing: &Drawing) -> BTreeSet<String> {
    drawing
        .pages
        .iter()
        .flat_map(|page| page.commands.iter())
        .filter_map(|cmd| match cmd {
            Command::SetFontName(name) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

fn write_pdf(
    drawing: &Drawing,
    images: &BTreeMap<String, DecodedImage>,
    title: &str,
    warnings: &mut Vec<RenderWarning>,
) -> Result<Vec<u8>, RenderError> {
    // Object ids are assigned up front: catalog, pages, info, fonts, images,
    // then a (content, page) pair per page.
    let mut objects: Vec<Vec<u8>> = Vec::new();
    let catalog_id = 1;
    let pages_id = 2;
    let info_id = 3;
    let mut next_id = 4;

    let fonts: Vec<(String, String, usize)> = collect_font_names(drawing)
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let id = next_id + index;
            (name, format!("F{}", index + 1), id)
        })
        .collect();
    next_id += fonts.len();

    let mut image_objects: Vec<(String, usize, Vec<u8>, Option<Vec<u8>>)> = Vec::new();
    let mut encoded_images = Vec::new();
    for (resource, image) in images {
        let data = image_data(image)?;
        let image_id = next_id;
        let smask_id = data.alpha.as_ref().map(|_| next_id + 1);
        next_id += if smask_id.is_some() { 2 } else { 1 };
        let smask_entry = smask_id
            .map(|id| format!(" /SMask {id} 0 R"))
            .unwrap_or_default();
        let dict = format!(
            "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Filter {}{}",
            data.width, data.height, data.color_space, data.filter, smask_entry
        );
        let smask = data.alpha.as_ref().map(|alpha| {
            stream_object(
                &format!(
                    "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode",
                    data.width, data.height
                ),
                alpha,
            )
        });
        image_objects.push((resource.clone(), image_id, stream_object(&dict, &data.data), smask));
        encoded_images.push((resource.clone(), image_id));
    }

    let font_map: BTreeMap<&str, &str> = fonts
        .iter()
        .map(|(name, resource, _)| (name.as_str(), resource.as_str()))
        .collect();
    let resources = format!(
        "<< /Font << {} >> /XObject << {} >> >>",
        fonts
            .iter()
            .map(|(_, resource, id)| format!("/{resource} {id} 0 R"))
            .collect::<Vec<_>>()
            .join(" "),
        encoded_images
            .iter()
            .map(|(resource, id)| format!("/{resource} {id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut page_ids = Vec::with_capacity(drawing.pages.len());
    let mut page_objects = Vec::with_capacity(drawing.pages.len() * 2);
    let mut replaced = 0usize;
    for page in &drawing.pages {
        let content_id = next_id;
        let page_id = next_id + 1;
        next_id += 2;
        let (content, page_replaced) = render_page(page, drawing.page_size.height, &font_map);
        replaced += page_replaced;
        page_objects.push(stream_object("/Filter /FlateDecode", &flate_compress(content.as_bytes())?));
        page_objects.push(
            format!(
                "<< /Type /Page /Parent {pages_id} 0 R /MediaBox [0 0 {} {}] /Resources {resources} /Contents {content_id} 0 R >>",
                fmt_pt(drawing.page_size.width),
                fmt_pt(drawing.page_size.height),
            )
            .into_bytes(),
        );
        page_ids.push(page_id);
    }
    if replaced > 0 {
        let message = format!("{replaced} characters have no WinAnsi code and were drawn as '?'");
        log::warn!("{message}");
        warnings.push(RenderWarning::new("PDF_GLYPH_REPLACED", message));
    }

    objects.push(format!("<< /Type /Catalog /Pages {pages_id} 0 R >>").into_bytes());
    objects.push(
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            page_ids
                .iter()
                .map(|id| format!("{id} 0 R"))
                .collect::<Vec<_>>()
                .join(" "),
            page_ids.len()
        )
        .into_bytes(),
    );
    objects.push(
        format!(
            "<< /Title ({}) /Producer (papersetter) >>",
            encode_winansi_pdf_string(title).text
        )
        .into_bytes(),
    );
    for (name, _, _) in &fonts {
        objects.push(font_object(name).into_bytes());
    }
    for (_, _, image, smask) in image_objects {
        objects.push(image);
        if let Some(smask) = smask {
            objects.push(smask);
        }
    }
    objects.extend(page_objects);
    debug_assert_eq!(objects.len() + 1, next_id);

    Ok(build_pdf(&objects, catalog_id, info_id))
}

fn render_page(page: &Page, page_height: Pt, fonts: &BTreeMap<&str, &str>) -> (String, usize) {
    let mut out = String::new();
    let mut replaced = 0usize;
    let mut font_name = String::new();
    let mut font_size = Pt::from_i32(12);
    for cmd in &page.commands {
        match cmd {
            Command::SetFontName(name) => font_name = name.clone(),
            Command::SetFontSize(size) => font_size = *size,
            Command::SetWordSpacing(spacing) => {
                out.push_str(&format!("{} Tw\n", fmt_pt(*spacing)));
            }
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::DrawString { x, baseline, text } => {
                let resource = fonts.get(font_name.as_str()).copied().unwrap_or("F1");
                let encoded = encode_winansi_pdf_string(text);
                replaced += encoded.replaced;
                out.push_str(&format!(
                    "BT\n/{resource} {} Tf\n{} {} Td\n({}) Tj\nET\n",
                    fmt_pt(font_size),
                    fmt_pt(*x),
                    fmt_pt(page_height - *baseline),
                    encoded.text
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                out.push_str(&format!(
                    "q\n{} 0 0 {} {} {} cm\n/{resource_id} Do\nQ\n",
                    fmt_pt(*width),
                    fmt_pt(*height),
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height)
                ));
            }
        }
    }
    (out, replaced)
}

fn stream_object(dict: &str, data: &[u8]) -> Vec<u8> {
    let mut out = format!("<< {dict} /Length {} >>\nstream\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\nendstream");
    out
}

fn font_object(name: &str) -> String {
    let encoding = if name == "Symbol" {
        ""
    } else {
        " /Encoding /WinAnsiEncoding"
    };
    format!("<< /Type /Font /Subtype /Type1 /BaseFont /{name}{encoding} >>")
}

fn build_pdf(objects: &[Vec<u8>], catalog_id: usize, info_id: usize) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n");
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        out.extend_from_slice(obj);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root {catalog_id} 0 R /Info {info_id} 0 R >>\nstartxref\n{xref_start}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => {
                replaced += 1;
                b'?'
            }
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b if !(0x20..0x7f).contains(&b) => out.push_str(&format!("\\{b:03o}")),
            b => out.push(b as char),
        }
    }
    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{sign}{int_part}")
    } else {
        let mut s = format!("{sign}{int_part}.{frac_part:03}");
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winansi_escapes_and_counts_replacements() {
        let encoded = encode_winansi_pdf_string("Abstract\u{2014}(a\\b) \u{03B1}");
        assert_eq!(encoded.text, "Abstract\\227\\(a\\\\b\\) ?");
        assert_eq!(encoded.replaced, 1);
    }

    #[test]
    fn milli_formatting_trims_zeros() {
        assert_eq!(format_milli(0), "0");
        assert_eq!(format_milli(9500), "9.5");
        assert_eq!(format_milli(-1250), "-1.25");
        assert_eq!(format_milli(72000), "72");
        assert_eq!(fmt_pt(Pt::from_f32(0.001)), "0.001");
    }

    #[test]
    fn base14_names_are_canonical() {
        assert_eq!(base14_name("times-bolditalic"), Some("Times-BoldItalic"));
        assert_eq!(base14_name(" 'Times-Roman' "), Some("Times-Roman"));
        assert_eq!(base14_name("Times New Roman"), None);
    }

    #[test]
    fn pages_become_flipped_content_streams() {
        let mut canvas = Canvas::new(crate::types::Size::letter());
        canvas.set_font_name("Times-Bold");
        canvas.set_font_size(Pt::from_i32(24));
        canvas.draw_string(Pt::from_i32(100), Pt::from_i32(92), "Title");
        canvas.draw_image(
            Pt::from_i32(54),
            Pt::from_i32(100),
            Pt::from_i32(50),
            Pt::from_i32(40),
            "Im1",
        );
        let drawing = canvas.finish();
        let fonts: BTreeMap<&str, &str> = [("Times-Bold", "F1")].into_iter().collect();
        let (content, replaced) = render_page(&drawing.pages[0], Pt::from_i32(792), &fonts);
        assert_eq!(replaced, 0);
        assert!(content.contains("/F1 24 Tf\n100 700 Td\n(Title) Tj"));
        assert!(content.contains("50 0 0 40 54 652 cm\n/Im1 Do"));
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let objects = vec![
            b"<< /Type /Catalog /Pages 2 0 R >>".to_vec(),
            b"<< /Type /Pages /Kids [] /Count 0 >>".to_vec(),
            b"<< /Producer (papersetter) >>".to_vec(),
        ];
        let bytes = build_pdf(&objects, 1, 3);
        let second = bytes
            .windows(7)
            .position(|window| window == b"2 0 obj")
            .unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains(&format!("{second:010} 00000 n")));
        assert!(text.ends_with("%%EOF\n"));
    }
}
