//! Document and listening state owned by an editing session
//!
//! A [`DocumentState`] is an immutable snapshot: every transformation produces
//! a new one instead of mutating the previous state in place.

use std::fmt;

use crate::marker;

/// A left-to-right selection, in byte offsets into the buffer
///
/// `start == end` is a caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    /// Create a selection, swapping the bounds if they are reversed
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn caret(pos: usize) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    pub fn is_caret(&self) -> bool {
        self.start == self.end
    }

    /// Clamp both bounds into `text`, flooring to character boundaries
    pub fn clamp_to(self, text: &str) -> Self {
        Self::new(
            floor_char_boundary(text, self.start),
            floor_char_boundary(text, self.end),
        )
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_caret() {
            write!(f, "@{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

/// Largest character boundary in `text` that is `<= index`
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Buffer plus selection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentState {
    pub buffer: String,
    pub selection: Selection,
}

impl DocumentState {
    /// Create a document, clamping the selection into the buffer
    pub fn new(buffer: impl Into<String>, selection: Selection) -> Self {
        let buffer = buffer.into();
        let selection = selection.clamp_to(&buffer);
        Self { buffer, selection }
    }

    /// Document with the caret at the end of `buffer`
    pub fn with_caret_at_end(buffer: impl Into<String>) -> Self {
        let buffer = buffer.into();
        let end = buffer.len();
        Self {
            buffer,
            selection: Selection::caret(end),
        }
    }

    /// Seed a document from a stored snapshot
    ///
    /// A parked caret symbol in the stored text positions the caret; without
    /// one the caret goes to the end.
    pub fn from_snapshot(stored: &str) -> Self {
        marker::unpark(stored)
    }

    /// Marker-free copy of the buffer, suitable for history and storage
    pub fn snapshot(&self) -> String {
        marker::strip(&self.buffer)
    }

    /// Stored form that keeps the caret as a parked symbol
    pub fn parked(&self) -> String {
        marker::park(self)
    }

    /// Text covered by the selection
    pub fn selected_text(&self) -> &str {
        let sel = self.selection.clamp_to(&self.buffer);
        &self.buffer[sel.start..sel.end]
    }

    /// Zero-based index of the line holding the selection start
    pub fn cursor_line(&self) -> usize {
        let start = self.selection.clamp_to(&self.buffer).start;
        self.buffer[..start].matches('\n').count()
    }
}

/// Listening flags flipped by the `stop` and `discard` commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenState {
    /// Dictation input is accepted
    pub listening: bool,
    /// Interim results for the current segment are ignored until the next segment
    pub ignore_results: bool,
}

impl Default for ListenState {
    fn default() -> Self {
        Self {
            listening: true,
            ignore_results: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_swaps_reversed_bounds() {
        let sel = Selection::new(5, 2);
        assert_eq!(sel, Selection { start: 2, end: 5 });
        assert!(!sel.is_caret());
        assert!(Selection::caret(3).is_caret());
    }

    #[test]
    fn test_clamp_to_char_boundary() {
        // 'é' is two bytes, offset 2 falls inside it
        let text = "aé";
        assert_eq!(floor_char_boundary(text, 2), 1);
        assert_eq!(floor_char_boundary(text, 3), 3);
        assert_eq!(floor_char_boundary(text, 99), 3);

        let doc = DocumentState::new(text, Selection::new(2, 10));
        assert_eq!(doc.selection, Selection { start: 1, end: 3 });
    }

    #[test]
    fn test_cursor_line() {
        let doc = DocumentState::new("one\ntwo\nthree", Selection::caret(9));
        assert_eq!(doc.cursor_line(), 2);
        assert_eq!(DocumentState::default().cursor_line(), 0);
    }

    #[test]
    fn test_unclamped_selection_is_safe() {
        // fields are public, so a selection can bypass `new`
        let doc = DocumentState {
            buffer: "a\né".to_string(),
            selection: Selection { start: 3, end: 40 },
        };
        assert_eq!(doc.cursor_line(), 1);
        assert_eq!(doc.selected_text(), "é");

        let past_end = DocumentState {
            buffer: "abc".to_string(),
            selection: Selection { start: 9, end: 9 },
        };
        assert_eq!(past_end.cursor_line(), 0);
        assert_eq!(past_end.selected_text(), "");
    }

    #[test]
    fn test_selected_text() {
        let doc = DocumentState::new("hello world", Selection::new(6, 11));
        assert_eq!(doc.selected_text(), "world");
    }
}
