//! Section, reference, figure, table and equation labels.

use serde::Serialize;

use crate::error::RenderWarning;

const ROMAN_TABLE: [(u32, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

/// Greedy subtraction over the symbol table. Zero yields an empty string.
pub fn arabic_to_roman(mut n: u32) -> String {
    let mut out = String::new();
    for (value, symbol) in ROMAN_TABLE {
        while n >= value {
            out.push_str(symbol);
            n -= value;
        }
    }
    out
}

/// Inverse of [`arabic_to_roman`]; rejects anything that is not its exact
/// canonical output.
pub fn roman_to_arabic(roman: &str) -> Option<u32> {
    if roman.is_empty() {
        return None;
    }
    let mut rest = roman;
    let mut total = 0u32;
    for (value, symbol) in ROMAN_TABLE {
        while let Some(next) = rest.strip_prefix(symbol) {
            total += value;
            rest = next;
        }
    }
    if !rest.is_empty() || arabic_to_roman(total) != roman {
        return None;
    }
    Some(total)
}

/// "I. INTRODUCTION" for the first top-level section.
pub fn section_heading(index: usize, title: &str) -> String {
    format!("{}. {}", arabic_to_roman(index as u32 + 1), title.to_uppercase())
        .trim_end()
        .to_string()
}

/// Decimal "{parent}.{sub}" label, both 1-based.
pub fn subsection_label(section_index: usize, sub_index: usize) -> String {
    format!("{}.{}", section_index + 1, sub_index + 1)
}

pub fn subsection_heading(section_index: usize, sub_index: usize, title: &str) -> String {
    format!("{} {}", subsection_label(section_index, sub_index), title)
        .trim_end()
        .to_string()
}

pub fn figure_label(number: usize) -> String {
    format!("Fig. {number}.")
}

pub fn figure_caption(number: usize, caption: Option<&str>) -> String {
    match caption {
        Some(text) => format!("{} {}", figure_label(number), text),
        None => figure_label(number),
    }
}

pub fn table_label(number: usize) -> String {
    format!("TABLE {}", arabic_to_roman(number as u32))
}

pub fn equation_label(number: usize) -> String {
    format!("({number})")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedReference {
    pub number: usize,
    pub label: String,
    pub text: String,
    /// Continuation lines are indented past the label.
    pub hanging_indent: bool,
}

impl FormattedReference {
    pub fn display(&self) -> String {
        format!("{} {}", self.label, self.text)
    }
}

/// Numbers references in the order given. Declared `order` values are only
/// inspected for gaps and duplicates; the list itself is never reordered.
pub fn format_references<'a>(
    entries: impl IntoIterator<Item = (&'a str, Option<i64>)>,
) -> (Vec<FormattedReference>, Vec<RenderWarning>) {
    let mut formatted = Vec::new();
    let mut declared = Vec::new();
    for (index, (text, order)) in entries.into_iter().enumerate() {
        let number = index + 1;
        formatted.push(FormattedReference {
            number,
            label: format!("[{number}]"),
            text: text.to_string(),
            hanging_indent: true,
        });
        if let Some(order) = order {
            declared.push(order);
        }
    }
    (formatted, order_warnings("reference", &declared))
}

/// Duplicate and gap findings for a list of declared order values.
pub fn order_warnings(collection: &str, declared: &[i64]) -> Vec<RenderWarning> {
    let mut warnings = Vec::new();
    let mut sorted = declared.to_vec();
    sorted.sort_unstable();
    let duplicates: Vec<i64> = sorted
        .windows(2)
        .filter(|pair| pair[0] == pair[1])
        .map(|pair| pair[0])
        .collect();
    if !duplicates.is_empty() {
        let message = format!("{collection} order values repeat: {duplicates:?}");
        log::warn!("{message}");
        warnings.push(RenderWarning::new("NUMBERING_DUPLICATE_ORDER", message));
    }
    let gaps = sorted.windows(2).any(|pair| pair[1] - pair[0] > 1);
    if gaps {
        let message = format!("{collection} order values have gaps: {sorted:?}");
        log::warn!("{message}");
        warnings.push(RenderWarning::new("NUMBERING_ORDER_GAP", message));
    }
    warnings
}
