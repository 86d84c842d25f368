use crate::frame::Frame;
use crate::style::StyleConfig;
use crate::types::{Pt, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSpec {
    pub rect: Rect,
}

/// Page geometry as an ordered list of frames; content fills them in order.
#[derive(Debug, Clone, PartialEq)]
pub struct PageTemplate {
    pub name: String,
    pub page_size: Size,
    frames: Vec<FrameSpec>,
}

impl PageTemplate {
    pub fn new(name: impl Into<String>, page_size: Size) -> Self {
        Self {
            name: name.into(),
            page_size,
            frames: Vec::new(),
        }
    }

    pub fn with_frame(mut self, rect: Rect) -> Self {
        self.frames.push(FrameSpec { rect });
        self
    }

    /// One frame spanning every column, for title and front matter.
    pub fn full_width(style: &StyleConfig) -> Self {
        Self::new("front-matter", style.page_size).with_frame(style.body_area())
    }

    /// The body columns of a regular page.
    pub fn columns(style: &StyleConfig) -> Self {
        Self::columns_below(style, style.margins.top).named("body")
    }

    /// Body columns that start at `top`, used under the front matter.
    pub fn columns_below(style: &StyleConfig, top: Pt) -> Self {
        let area = style.body_area();
        let top = top.max(area.y);
        let height = (area.bottom() - top).max(Pt::ZERO);
        let width = style.column_width();
        (0..style.columns.max(1)).fold(
            Self::new("first-body", style.page_size),
            |template, column| {
                template.with_frame(Rect {
                    x: style.column_x(column),
                    y: top,
                    width,
                    height,
                })
            },
        )
    }

    fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn frame_specs(&self) -> &[FrameSpec] {
        &self.frames
    }

    pub fn instantiate_frames(&self) -> Vec<Frame> {
        self.frames.iter().map(|spec| Frame::new(spec.rect)).collect()
    }
}
