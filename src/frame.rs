use crate::types::{Pt, Rect};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AddResult {
    Placed(Rect),
    Overflow,
}

/// One column on one page. Content stacks downward from the frame's top edge.
#[derive(Debug, Clone)]
pub struct Frame {
    rect: Rect,
    cursor_y: Pt,
}

impl Frame {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            cursor_y: Pt::ZERO,
        }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn remaining_height(&self) -> Pt {
        (self.rect.height - self.cursor_y).max(Pt::ZERO)
    }

    pub fn is_empty(&self) -> bool {
        self.cursor_y <= Pt::ZERO
    }

    /// Absolute y of the next placement.
    pub fn cursor_top(&self) -> Pt {
        self.rect.y + self.cursor_y
    }

    pub fn fits(&self, height: Pt) -> bool {
        height <= self.remaining_height()
    }

    /// Places a box of `width` x `height` at the cursor. A box taller than an
    /// empty frame is still placed so pagination keeps moving forward.
    pub fn add(&mut self, width: Pt, height: Pt) -> AddResult {
        if !self.fits(height) && !self.is_empty() {
            return AddResult::Overflow;
        }
        let rect = Rect {
            x: self.rect.x,
            y: self.cursor_top(),
            width,
            height,
        };
        self.cursor_y += height;
        AddResult::Placed(rect)
    }

    /// Vertical space after a placement; never moves past the bottom edge.
    pub fn advance(&mut self, gap: Pt) {
        self.cursor_y = (self.cursor_y + gap).min(self.rect.height);
    }

    /// Shrinks the frame from the bottom and returns the freed strip.
    pub fn reserve_bottom(&mut self, height: Pt) -> Rect {
        let height = height.min(self.rect.height);
        self.rect.height -= height;
        Rect {
            x: self.rect.x,
            y: self.rect.bottom(),
            width: self.rect.width,
            height,
        }
    }
}
