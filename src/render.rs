//! Terminal rendering of the document, the last change and a status line

use std::io::{self, stdout, Write};

use crossterm::queue;
use crossterm::style::{Color, ContentStyle, Print, Stylize};
use unicode_width::UnicodeWidthStr;

use crate::config::{HighlightColor, UiConfig};
use crate::diff::DiffSpan;
use crate::marker::CURSOR_SYMBOL;
use crate::session::{EditSession, Outcome};
use crate::state::DocumentState;

const DEFAULT_WIDTH: usize = 80;

pub struct Renderer {
    highlight: Option<Color>,
    show_caret: bool,
}

fn highlight_color(color: HighlightColor) -> Option<Color> {
    match color {
        HighlightColor::Yellow => Some(Color::Yellow),
        HighlightColor::Green => Some(Color::Green),
        HighlightColor::Cyan => Some(Color::Cyan),
        HighlightColor::Magenta => Some(Color::Magenta),
        HighlightColor::None => None,
    }
}

impl Renderer {
    pub fn new(ui: &UiConfig) -> Self {
        Self {
            highlight: highlight_color(ui.highlight),
            show_caret: ui.show_caret,
        }
    }

    /// Buffer with the caret drawn, the selection reversed and the changed span highlighted
    pub fn document(&self, doc: &DocumentState, spans: &[DiffSpan]) -> String {
        let buffer = doc.buffer.as_str();
        let sel = doc.selection.clamp_to(buffer);
        let span = spans
            .first()
            .filter(|s| !s.is_empty() && self.highlight.is_some());

        let mut cuts = vec![0, buffer.len(), sel.start, sel.end];
        if let Some(span) = span {
            cuts.extend([span.start.min(buffer.len()), span.end.min(buffer.len())]);
        }
        cuts.sort_unstable();
        cuts.dedup();

        let caret = (self.show_caret && sel.is_caret()).then_some(sel.start);
        let mut out = String::with_capacity(buffer.len() + 16);

        for pair in cuts.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if caret == Some(a) {
                out.push(CURSOR_SYMBOL);
            }

            let mut style = ContentStyle::new();
            if !sel.is_caret() && a >= sel.start && b <= sel.end {
                style = style.reverse();
            }
            if let (Some(span), Some(color)) = (span, self.highlight) {
                if a >= span.start && b <= span.end {
                    style = style.on(color).black();
                }
            }

            let piece = &buffer[a..b];
            if style == ContentStyle::new() {
                out.push_str(piece);
            } else {
                out.push_str(&style.apply(piece).to_string());
            }
        }

        if caret == Some(buffer.len()) {
            out.push(CURSOR_SYMBOL);
        }
        out
    }

    /// One-line summary of the session, cut to `width` columns
    pub fn status_line(&self, session: &EditSession, outcome: &Outcome, width: usize) -> String {
        let history = session.history();
        let position = history.index().map_or(0, |i| i + 1);
        let mut line = format!(
            "{} | {} | history {}/{}",
            outcome.status(),
            session.document().selection,
            position,
            history.len()
        );
        if !session.listen_state().listening {
            line.push_str(" | not listening");
        }
        truncate_to_width(&line, width)
    }

    /// Print the document and status line after an utterance
    pub fn draw(&self, session: &EditSession, outcome: &Outcome) -> io::Result<()> {
        let width = crossterm::terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(DEFAULT_WIDTH);

        let mut out = stdout();
        queue!(
            out,
            Print(self.document(session.document(), outcome.spans())),
            Print("\n"),
            Print(self.status_line(session, outcome, width).dark_grey()),
            Print("\n")
        )?;
        out.flush()
    }
}

/// Cut `text` so it fits in `width` terminal columns, marking the cut with an ellipsis
pub fn truncate_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = unicode_width::UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}
