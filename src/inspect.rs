//! Read-back of rendered PDFs, for verifying page counts and drawn text.

use lopdf::Document as LoDocument;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("PDF_PARSE_FAILED: {0}")]
    Parse(String),
    #[error("PDF_EMPTY_OR_NO_PAGES: pdf has no pages")]
    NoPages,
    #[error("PDF_IO_ERROR: {0}")]
    Io(#[from] std::io::Error),
}

impl InspectError {
    pub fn code(&self) -> &'static str {
        match self {
            InspectError::Parse(_) => "PDF_PARSE_FAILED",
            InspectError::NoPages => "PDF_EMPTY_OR_NO_PAGES",
            InspectError::Io(_) => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    /// Extracted text per page, in page order. Empty when a page's text
    /// could not be decoded.
    pub page_texts: Vec<String>,
}

impl PdfInspectReport {
    pub fn text(&self) -> String {
        self.page_texts.join("\n")
    }
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, InspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| InspectError::Parse(err.to_string()))?;
    let pages = pdf.get_pages();
    if pages.is_empty() {
        return Err(InspectError::NoPages);
    }
    let page_texts = pages
        .keys()
        .map(|number| match pdf.extract_text(&[*number]) {
            Ok(text) => text,
            Err(err) => {
                log::debug!("text extraction failed on page {number}: {err}");
                String::new()
            }
        })
        .collect();
    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        page_texts,
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfInspectReport, InspectError> {
    let data = std::fs::read(path)?;
    inspect_pdf_bytes(&data)
}
