use serde::Serialize;
use thiserror::Error;

/// Where in the paper a failure happened. Every field is optional because
/// validation failures happen before any page exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    pub section_index: Option<usize>,
    pub element_id: Option<String>,
    pub page_index: Option<usize>,
}

impl Location {
    pub fn section(index: usize) -> Self {
        Self {
            section_index: Some(index),
            ..Self::default()
        }
    }

    pub fn element(section_index: Option<usize>, id: impl Into<String>) -> Self {
        Self {
            section_index,
            element_id: Some(id.into()),
            page_index: None,
        }
    }

    pub fn with_page(mut self, page_index: usize) -> Self {
        self.page_index = Some(page_index);
        self
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(section) = self.section_index {
            parts.push(format!("section {}", section + 1));
        }
        if let Some(id) = &self.element_id {
            parts.push(format!("element '{id}'"));
        }
        if let Some(page) = self.page_index {
            parts.push(format!("page {}", page + 1));
        }
        if parts.is_empty() {
            write!(f, "document")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("document title is required")]
    MissingTitle,
    #[error("at least one author with a non-empty name is required")]
    MissingAuthor,
    #[error("invalid setting {field}: '{value}'")]
    InvalidSetting { field: &'static str, value: String },
    #[error("document JSON is malformed: {0}")]
    MalformedJson(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::MissingTitle => "VALIDATION_MISSING_TITLE",
            ValidationError::MissingAuthor => "VALIDATION_MISSING_AUTHOR",
            ValidationError::InvalidSetting { .. } => "VALIDATION_INVALID_SETTING",
            ValidationError::MalformedJson(_) => "VALIDATION_MALFORMED_JSON",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    #[error("unknown content block type '{block_type}' at {location}")]
    UnknownBlockType { block_type: String, location: Location },
    #[error("non-positive {dimension} ({value}) at {location}")]
    NonPositiveDimension {
        dimension: &'static str,
        value: f32,
        location: Location,
    },
    #[error("image data cannot be decoded at {location}: {reason}")]
    UndecodableImage { reason: String, location: Location },
    #[error("{block_type} block has no renderable data at {location}")]
    MissingBlockData {
        block_type: &'static str,
        location: Location,
    },
    #[error("layout exceeded the page ceiling of {ceiling} pages at {location}")]
    PageLimitExceeded { ceiling: usize, location: Location },
}

impl LayoutError {
    pub fn location(&self) -> &Location {
        match self {
            LayoutError::UnknownBlockType { location, .. }
            | LayoutError::NonPositiveDimension { location, .. }
            | LayoutError::UndecodableImage { location, .. }
            | LayoutError::MissingBlockData { location, .. }
            | LayoutError::PageLimitExceeded { location, .. } => location,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LayoutError::UnknownBlockType { .. } => "LAYOUT_UNKNOWN_BLOCK_TYPE",
            LayoutError::NonPositiveDimension { .. } => "LAYOUT_NON_POSITIVE_DIMENSION",
            LayoutError::UndecodableImage { .. } => "LAYOUT_UNDECODABLE_IMAGE",
            LayoutError::MissingBlockData { .. } => "LAYOUT_MISSING_BLOCK_DATA",
            LayoutError::PageLimitExceeded { .. } => "LAYOUT_PAGE_LIMIT_EXCEEDED",
        }
    }
}

/// Metric lookups that could not be satisfied. Layout never fails on these:
/// the measurer substitutes the default table and records a warning.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasurementError {
    #[error("no metrics for font family '{family}'")]
    UnknownFontFamily { family: String },
    #[error("invalid font size {size}")]
    InvalidFontSize { size: f32 },
    #[error("invalid font data for {source_name}")]
    InvalidFontData { source_name: String },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("layout failed: {0}")]
    Layout(#[from] LayoutError),
    #[error("{backend} backend failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::Validation(err) => err.code(),
            RenderError::Layout(err) => err.code(),
            RenderError::Backend { .. } => "BACKEND_FAILED",
            RenderError::InvalidConfiguration(_) => "INVALID_CONFIGURATION",
            RenderError::Io(_) => "IO_ERROR",
        }
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            RenderError::Layout(err) => Some(err.location()),
            _ => None,
        }
    }
}

/// Non-fatal findings surfaced alongside a successful render.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderWarning {
    pub code: &'static str,
    pub message: String,
}

impl RenderWarning {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&MeasurementError> for RenderWarning {
    fn from(err: &MeasurementError) -> Self {
        let code = match err {
            MeasurementError::UnknownFontFamily { .. } => "MEASURE_UNKNOWN_FONT_FAMILY",
            MeasurementError::InvalidFontSize { .. } => "MEASURE_INVALID_FONT_SIZE",
            MeasurementError::InvalidFontData { .. } => "MEASURE_INVALID_FONT_DATA",
        };
        RenderWarning::new(code, err.to_string())
    }
}
