//! What each backend actually emitted, reduced to a shape both can produce:
//! the section count, the reference count and the text of every section.
//! Two reports that compare equal describe equivalent papers.

use serde::Serialize;

use crate::text::collapse_whitespace;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RendererReport {
    pub backend: &'static str,
    pub section_count: usize,
    pub reference_count: usize,
    /// Text of each top-level section in reading order, whitespace collapsed.
    pub section_texts: Vec<String>,
}

impl RendererReport {
    pub fn new(backend: &'static str, section_count: usize) -> Self {
        Self {
            backend,
            section_count,
            reference_count: 0,
            section_texts: vec![String::new(); section_count],
        }
    }

    pub(crate) fn push_text(&mut self, section: usize, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if section >= self.section_texts.len() {
            self.section_texts.resize(section + 1, String::new());
        }
        let slot = &mut self.section_texts[section];
        if !slot.is_empty() {
            slot.push(' ');
        }
        slot.push_str(text);
    }

    pub(crate) fn finish(mut self) -> Self {
        for text in &mut self.section_texts {
            *text = collapse_whitespace(text);
        }
        self
    }

    /// Every way `other` differs from `self`; empty when equivalent.
    pub fn differences(&self, other: &RendererReport) -> Vec<String> {
        let mut out = Vec::new();
        if self.section_count != other.section_count
            || self.section_texts.len() != other.section_texts.len()
        {
            out.push(format!(
                "section count: {} has {}, {} has {}",
                self.backend,
                self.section_texts.len(),
                other.backend,
                other.section_texts.len()
            ));
        }
        if self.reference_count != other.reference_count {
            out.push(format!(
                "reference count: {} has {}, {} has {}",
                self.backend, self.reference_count, other.backend, other.reference_count
            ));
        }
        for (index, (ours, theirs)) in self
            .section_texts
            .iter()
            .zip(&other.section_texts)
            .enumerate()
        {
            if ours != theirs {
                let at = ours
                    .chars()
                    .zip(theirs.chars())
                    .take_while(|(a, b)| a == b)
                    .count();
                out.push(format!("section {} text diverges at character {at}", index + 1));
            }
        }
        out
    }

    pub fn is_equivalent(&self, other: &RendererReport) -> bool {
        self.differences(other).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(backend: &'static str, texts: &[&str]) -> RendererReport {
        let mut report = RendererReport::new(backend, texts.len());
        for (index, text) in texts.iter().enumerate() {
            for piece in text.split('|') {
                report.push_text(index, piece);
            }
        }
        report.finish()
    }

    #[test]
    fn whitespace_differences_do_not_matter() {
        let pdf = report("pdf", &["I. INTRODUCTION|Quantum  bits", "II. METHOD"]);
        let docx = report("docx", &["I. INTRODUCTION Quantum|bits", "II.   METHOD"]);
        assert!(pdf.is_equivalent(&docx));
    }

    #[test]
    fn reports_name_each_difference() {
        let mut pdf = report("pdf", &["I. INTRODUCTION", "II. METHOD"]);
        pdf.reference_count = 2;
        let docx = report("docx", &["I. INTRODUCTION", "II. METHODS"]);
        let diffs = pdf.differences(&docx);
        assert_eq!(diffs.len(), 2);
        assert!(diffs[0].starts_with("reference count"));
        assert_eq!(diffs[1], "section 2 text diverges at character 10");
    }

    #[test]
    fn section_count_mismatch_is_reported() {
        let pdf = report("pdf", &["a", "b"]);
        let docx = report("docx", &["a"]);
        assert!(pdf.differences(&docx)[0].starts_with("section count"));
    }
}
