use crate::types::{Pt, Size};

/// Drawing operations in top-left page coordinates. The PDF writer flips
/// them into PDF user space.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetFontName(String),
    SetFontSize(Pt),
    SetWordSpacing(Pt),
    SetLineWidth(Pt),
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    Stroke,
    /// `baseline` is the y of the text baseline, not the top of the line.
    DrawString {
        x: Pt,
        baseline: Pt,
        text: String,
    },
    DrawImage {
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
pub struct Drawing {
    pub page_size: Size,
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    font_name: String,
    font_size: Pt,
    word_spacing: Pt,
    line_width: Pt,
}

impl GraphicsState {
    fn initial() -> Self {
        Self {
            font_name: String::new(),
            font_size: Pt::ZERO,
            word_spacing: Pt::ZERO,
            line_width: Pt::from_i32(1),
        }
    }
}

pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    state: GraphicsState,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::default(),
            state: GraphicsState::initial(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn set_font_name(&mut self, name: &str) {
        if self.state.font_name == name {
            return;
        }
        self.state.font_name = name.to_string();
        self.current
            .commands
            .push(Command::SetFontName(name.to_string()));
    }

    pub fn set_font_size(&mut self, size: Pt) {
        if self.state.font_size == size {
            return;
        }
        self.state.font_size = size;
        self.current.commands.push(Command::SetFontSize(size));
    }

    pub fn set_word_spacing(&mut self, spacing: Pt) {
        if self.state.word_spacing == spacing {
            return;
        }
        self.state.word_spacing = spacing;
        self.current.commands.push(Command::SetWordSpacing(spacing));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.state.line_width == width {
            return;
        }
        self.state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::LineTo { x, y });
    }

    pub fn stroke(&mut self) {
        self.current.commands.push(Command::Stroke);
    }

    /// A single stroked segment.
    pub fn rule(&mut self, from: (Pt, Pt), to: (Pt, Pt)) {
        self.move_to(from.0, from.1);
        self.line_to(to.0, to.1);
        self.stroke();
    }

    pub fn draw_string(&mut self, x: Pt, baseline: Pt, text: impl Into<String>) {
        self.current.commands.push(Command::DrawString {
            x,
            baseline,
            text: text.into(),
        });
    }

    pub fn draw_image(
        &mut self,
        x: Pt,
        y: Pt,
        width: Pt,
        height: Pt,
        resource_id: impl Into<String>,
    ) {
        self.current.commands.push(Command::DrawImage {
            x,
            y,
            width,
            height,
            resource_id: resource_id.into(),
        });
    }

    /// Closes the current page. Graphics state does not carry over.
    pub fn show_page(&mut self) {
        let current = std::mem::take(&mut self.current);
        self.pages.push(current);
        self.state = GraphicsState::initial();
    }

    pub fn finish(mut self) -> Drawing {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        Drawing {
            page_size: self.page_size,
            pages: self.pages,
        }
    }
}
