use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` into one specific text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    /// True for empty and inverted spans.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }

    /// The addressed substring, or `None` when the span is empty, runs past
    /// the end of `text`, or splits a UTF-8 character.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        if self.is_empty() {
            return None;
        }
        text.get(self.range())
    }
}
