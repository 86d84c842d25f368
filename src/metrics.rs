//! Text measurement: font-metric providers and the greedy line breaker.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::MeasurementError;
use crate::style::{StyleConfig, leading_for};
use crate::types::Pt;

/// Source of glyph advances, in thousandths of an em.
pub trait FontMetricsProvider: Send + Sync {
    fn has_family(&self, family: &str) -> bool;

    /// `None` when the family is unknown. Characters outside the family's
    /// coverage still get an advance (the family's missing width).
    fn advance(&self, family: &str, ch: char) -> Option<u16>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Base14Times {
    Roman,
    Bold,
    Italic,
    BoldItalic,
}

// Advances for U+0020..=U+007E.
#[rustfmt::skip]
const TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    278, 278, 564, 564, 564, 444, 921,
    722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889,
    722, 722, 556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611,
    333, 278, 333, 469, 500, 333,
    444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778,
    500, 500, 500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444,
    480, 200, 480, 541,
];

#[rustfmt::skip]
const TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    333, 333, 570, 570, 570, 500, 930,
    722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944,
    722, 778, 611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667,
    333, 278, 333, 581, 500, 333,
    500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833,
    556, 500, 556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444,
    394, 220, 394, 520,
];

#[rustfmt::skip]
const TIMES_ITALIC: [u16; 95] = [
    250, 333, 420, 500, 500, 833, 778, 214, 333, 333, 500, 675, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    333, 333, 675, 675, 675, 500, 920,
    611, 611, 667, 722, 611, 611, 722, 722, 333, 444, 667, 556, 833,
    667, 722, 611, 722, 611, 500, 556, 722, 611, 833, 611, 556, 556,
    389, 278, 389, 422, 500, 333,
    500, 500, 444, 500, 444, 278, 500, 500, 278, 278, 444, 278, 722,
    500, 500, 500, 500, 389, 389, 278, 500, 444, 667, 444, 444, 389,
    400, 275, 400, 541,
];

#[rustfmt::skip]
const TIMES_BOLD_ITALIC: [u16; 95] = [
    250, 389, 555, 500, 500, 833, 778, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500,
    333, 333, 570, 570, 570, 500, 832,
    667, 667, 667, 722, 667, 667, 722, 778, 389, 500, 667, 611, 889,
    722, 722, 611, 722, 667, 556, 611, 722, 667, 889, 667, 611, 611,
    333, 278, 333, 570, 500, 333,
    500, 500, 444, 500, 444, 333, 500, 556, 278, 278, 500, 278, 778,
    556, 500, 500, 500, 389, 389, 278, 556, 444, 667, 500, 444, 389,
    348, 220, 348, 570,
];

const AVERAGE_ADVANCE: u16 = 500;

impl Base14Times {
    fn lookup(family: &str) -> Option<Self> {
        let key: String = family
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_' | '"' | '\''))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "times" | "timesroman" | "timesnewroman" | "serif" => Some(Base14Times::Roman),
            "timesbold" | "timesnewromanbold" => Some(Base14Times::Bold),
            "timesitalic" | "timesnewromanitalic" => Some(Base14Times::Italic),
            "timesbolditalic" | "timesnewromanbolditalic" => Some(Base14Times::BoldItalic),
            _ => None,
        }
    }

    fn table(self) -> &'static [u16; 95] {
        match self {
            Base14Times::Roman => &TIMES_ROMAN,
            Base14Times::Bold => &TIMES_BOLD,
            Base14Times::Italic => &TIMES_ITALIC,
            Base14Times::BoldItalic => &TIMES_BOLD_ITALIC,
        }
    }

    fn advance(self, ch: char) -> u16 {
        let code = ch as u32;
        if (32..=126).contains(&code) {
            return self.table()[(code - 32) as usize];
        }
        match ch {
            '\u{00a0}' => 250,
            '\u{2013}' => 500,
            '\u{2014}' | '\u{2026}' => 1000,
            '\u{2018}' | '\u{2019}' => 333,
            '\u{201c}' | '\u{201d}' => 444,
            '\u{2022}' => 350,
            '\u{00b0}' => 400,
            '\u{00a9}' | '\u{00ae}' => 760,
            _ => AVERAGE_ADVANCE,
        }
    }
}

/// Advances parsed from a TrueType/OpenType face for the Latin-1 range.
#[derive(Debug, Clone)]
pub struct TrueTypeMetrics {
    name: String,
    widths: Vec<u16>,
    missing_width: u16,
}

const FIRST_CHAR: u32 = 32;
const LAST_CHAR: u32 = 255;

impl TrueTypeMetrics {
    pub fn from_bytes(data: &[u8], source_name: &str) -> Result<Self, MeasurementError> {
        let face = ttf_parser::Face::parse(data, 0).map_err(|_| {
            MeasurementError::InvalidFontData {
                source_name: source_name.to_string(),
            }
        })?;
        let scale = 1000.0 / face.units_per_em().max(1) as f32;
        let mut widths = Vec::with_capacity((LAST_CHAR - FIRST_CHAR + 1) as usize);
        for code in FIRST_CHAR..=LAST_CHAR {
            let advance = char::from_u32(code)
                .and_then(|ch| face.glyph_index(ch))
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(0);
            let scaled = (advance as f32 * scale).round() as i32;
            widths.push(scaled.clamp(0, u16::MAX as i32) as u16);
        }
        let missing_width = widths.first().copied().filter(|w| *w > 0).unwrap_or(AVERAGE_ADVANCE);
        Ok(Self {
            name: face_name(&face).unwrap_or_else(|| source_name.to_string()),
            widths,
            missing_width,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn advance(&self, ch: char) -> u16 {
        let code = ch as u32;
        if !(FIRST_CHAR..=LAST_CHAR).contains(&code) {
            return self.missing_width;
        }
        match self.widths[(code - FIRST_CHAR) as usize] {
            0 => self.missing_width,
            width => width,
        }
    }
}

fn face_name(face: &ttf_parser::Face<'_>) -> Option<String> {
    use ttf_parser::name::name_id;

    let mut family = None;
    let mut full = None;
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::FULL_NAME if full.is_none() => full = Some(name),
            name_id::TYPOGRAPHIC_FAMILY | name_id::FAMILY if family.is_none() => {
                family = Some(name)
            }
            _ => {}
        }
    }
    full.or(family)
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_ascii_lowercase()
}

/// Built-in Times tables plus any faces registered at build time.
#[derive(Debug, Clone, Default)]
pub struct FontRegistry {
    faces: Vec<TrueTypeMetrics>,
    lookup: HashMap<String, usize>,
}

impl FontRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a face under its own name and under `alias`; returns the
    /// face name.
    pub fn register_bytes(
        &mut self,
        data: &[u8],
        alias: Option<&str>,
    ) -> Result<String, MeasurementError> {
        let source = alias.unwrap_or("EmbeddedFont");
        let metrics = TrueTypeMetrics::from_bytes(data, source)?;
        let name = metrics.name().to_string();
        let index = self.faces.len();
        self.faces.push(metrics);
        for key in [Some(name.as_str()), alias].into_iter().flatten() {
            let key = normalize_name(key);
            if !key.is_empty() {
                self.lookup.entry(key).or_insert(index);
            }
        }
        Ok(name)
    }

    fn registered(&self, family: &str) -> Option<&TrueTypeMetrics> {
        self.lookup
            .get(&normalize_name(family))
            .and_then(|index| self.faces.get(*index))
    }
}

impl FontMetricsProvider for FontRegistry {
    fn has_family(&self, family: &str) -> bool {
        self.registered(family).is_some() || Base14Times::lookup(family).is_some()
    }

    fn advance(&self, family: &str, ch: char) -> Option<u16> {
        if let Some(face) = self.registered(family) {
            return Some(face.advance(ch));
        }
        Base14Times::lookup(family).map(|times| times.advance(ch))
    }
}

/// One wrapped line. `ends_paragraph` is set on the last line before an
/// explicit newline and on the final line; such lines are never justified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineBox {
    pub text: String,
    pub width: Pt,
    pub ends_paragraph: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measured {
    pub lines: Vec<LineBox>,
    pub line_height: Pt,
    pub fallbacks: Vec<MeasurementError>,
}

impl Measured {
    pub fn height(&self) -> Pt {
        self.line_height * self.lines.len() as i32
    }
}

/// Deterministic greedy wrapping against an injected metrics provider.
#[derive(Clone)]
pub struct TextMeasurer {
    provider: Arc<dyn FontMetricsProvider>,
    fallback_family: String,
    body_size: Pt,
    body_leading: Pt,
}

impl TextMeasurer {
    pub fn new(
        provider: Arc<dyn FontMetricsProvider>,
        fallback_family: impl Into<String>,
        body_size: Pt,
        body_leading: Pt,
    ) -> Self {
        Self {
            provider,
            fallback_family: fallback_family.into(),
            body_size,
            body_leading,
        }
    }

    pub fn for_style(provider: Arc<dyn FontMetricsProvider>, style: &StyleConfig) -> Self {
        Self::new(
            provider,
            style.fonts.regular.clone(),
            style.body_size,
            style.body_leading,
        )
    }

    pub fn line_height(&self, size: Pt) -> Pt {
        leading_for(size, self.body_size, self.body_leading)
    }

    pub fn measure(&self, text: &str, family: &str, size: Pt, max_width: Pt) -> Measured {
        self.measure_hanging(text, family, size, max_width, max_width)
    }

    /// Like [`measure`](Self::measure) but continuation lines get
    /// `rest_width`, for hanging-indent paragraphs.
    pub fn measure_hanging(
        &self,
        text: &str,
        family: &str,
        size: Pt,
        first_width: Pt,
        rest_width: Pt,
    ) -> Measured {
        let mut fallbacks = Vec::new();
        let family = self.resolve_family(family, &mut fallbacks);
        let size = if size > Pt::ZERO {
            size
        } else {
            log::warn!("invalid font size {}; using {}", size.to_f32(), self.body_size.to_f32());
            fallbacks.push(MeasurementError::InvalidFontSize {
                size: size.to_f32(),
            });
            self.body_size
        };
        let first_width = first_width.max(Pt::from_i32(1));
        let rest_width = rest_width.max(Pt::from_i32(1));
        let space = self.width_in(&family, size, " ");

        let mut lines: Vec<LineBox> = Vec::new();
        if !text.trim().is_empty() {
            for segment in text.split('\n') {
                let mut current = String::new();
                let mut current_width = Pt::ZERO;
                for word in segment.split_whitespace() {
                    let word_width = self.width_in(&family, size, word);
                    if current.is_empty() {
                        current.push_str(word);
                        current_width = word_width;
                        continue;
                    }
                    let limit = if lines.is_empty() { first_width } else { rest_width };
                    let candidate = current_width + space + word_width;
                    if candidate <= limit {
                        current.push(' ');
                        current.push_str(word);
                        current_width = candidate;
                    } else {
                        lines.push(LineBox {
                            text: std::mem::take(&mut current),
                            width: current_width,
                            ends_paragraph: false,
                        });
                        current.push_str(word);
                        current_width = word_width;
                    }
                }
                lines.push(LineBox {
                    text: current,
                    width: current_width,
                    ends_paragraph: true,
                });
            }
        }

        Measured {
            lines,
            line_height: self.line_height(size),
            fallbacks,
        }
    }

    /// Width of a single run, no wrapping.
    pub fn text_width(&self, text: &str, family: &str, size: Pt) -> Pt {
        let mut ignored = Vec::new();
        let family = self.resolve_family(family, &mut ignored);
        self.width_in(&family, size, text)
    }

    fn resolve_family(&self, family: &str, fallbacks: &mut Vec<MeasurementError>) -> String {
        if self.provider.has_family(family) {
            return family.to_string();
        }
        log::warn!(
            "no metrics for font family '{family}'; measuring with '{}'",
            self.fallback_family
        );
        fallbacks.push(MeasurementError::UnknownFontFamily {
            family: family.to_string(),
        });
        self.fallback_family.clone()
    }

    fn width_in(&self, family: &str, size: Pt, text: &str) -> Pt {
        let units: i32 = text
            .chars()
            .map(|ch| {
                self.provider
                    .advance(family, ch)
                    .unwrap_or_else(|| Base14Times::Roman.advance(ch)) as i32
            })
            .fold(0i32, |acc, w| acc.saturating_add(w));
        if units <= 0 {
            return Pt::ZERO;
        }
        size.mul_ratio(units, 1000)
    }
}
