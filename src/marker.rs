//! Cursor-marker protocol
//!
//! Selection state travels through plain-text rewrites as two sentinel
//! symbols: [`START`] before the selection and [`END`] after it. Adjacent
//! markers are a caret. Regex operations and the completion service see and
//! move the markers as ordinary text; [`delinearize`] turns them back into a
//! selection.

use crate::error::EngineError;
use crate::state::{DocumentState, Selection};

/// Selection start marker
pub const START: &str = "\u{1F170}\u{FE0F}";
/// Selection end marker
pub const END: &str = "\u{1F171}\u{FE0F}";
/// Caret symbol used when a buffer is stored without focus
pub const CURSOR_SYMBOL: char = '◉';

const START_BASE: char = '\u{1F170}';
const END_BASE: char = '\u{1F171}';

/// Insert both markers into a copy of the document buffer
pub fn linearize(doc: &DocumentState) -> String {
    let sel = doc.selection.clamp_to(&doc.buffer);
    let buffer = &doc.buffer;
    let mut tagged = String::with_capacity(buffer.len() + START.len() + END.len());
    tagged.push_str(&buffer[..sel.start]);
    tagged.push_str(START);
    tagged.push_str(&buffer[sel.start..sel.end]);
    tagged.push_str(END);
    tagged.push_str(&buffer[sel.end..]);
    tagged
}

/// Strip markers from tagged text and recover the selection
///
/// Returns `None` when neither marker is present; callers then pick a
/// fallback caret (see [`delinearize_or_line`]).
pub fn delinearize(tagged: &str) -> Option<DocumentState> {
    let scan = scan(tagged);
    if let Some(err) = protocol_violation(&scan) {
        log::warn!("{}", err);
    }
    selection_from(scan)
}

/// Like [`delinearize`], but without markers the caret lands at the start of
/// line `line` (clamped to the last line of the result)
pub fn delinearize_or_line(tagged: &str, line: usize) -> DocumentState {
    decode(tagged, line).doc
}

/// Result of decoding a rewritten buffer
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub doc: DocumentState,
    /// Set when the markers were not exactly one start followed by one end;
    /// `doc` then holds the recovered selection
    pub violation: Option<EngineError>,
}

/// Decode a rewritten buffer, reporting how the markers were recovered
pub fn decode(tagged: &str, line: usize) -> Decoded {
    let scan = scan(tagged);
    let violation = protocol_violation(&scan);
    if let Some(err) = &violation {
        log::warn!("{}", err);
    }

    let doc = match selection_from(scan) {
        Some(doc) => doc,
        None => {
            let clean = strip(tagged);
            let pos = line_start(&clean, line);
            DocumentState::new(clean, Selection::caret(pos))
        }
    };
    Decoded { doc, violation }
}

/// Marker-protocol problem in tagged text, if any
pub fn violation(tagged: &str) -> Option<EngineError> {
    protocol_violation(&scan(tagged))
}

fn protocol_violation(scan: &Scan) -> Option<EngineError> {
    let message = match (scan.start_count, scan.end_count) {
        (1, 1) => match (scan.start, scan.end) {
            (Some(start), Some(end)) if end < start => {
                "end marker precedes start marker".to_string()
            }
            _ => return None,
        },
        (0, 0) => "no markers in result".to_string(),
        (starts, ends) => format!("{} start / {} end markers in result", starts, ends),
    };
    Some(EngineError::MarkerProtocolViolation(message))
}

fn selection_from(scan: Scan) -> Option<DocumentState> {
    let selection = match (scan.start, scan.end) {
        (Some(start), Some(end)) => Selection::new(start, end),
        (Some(pos), None) | (None, Some(pos)) => Selection::caret(pos),
        (None, None) => return None,
    };
    Some(DocumentState::new(scan.clean, selection))
}

/// Byte offset of the start of line `line`, clamped to the last line
pub fn line_start(text: &str, line: usize) -> usize {
    let last = text.matches('\n').count();
    let target = line.min(last);
    text.split('\n').take(target).map(|l| l.len() + 1).sum()
}

/// Remove every marker and parked caret symbol
pub fn strip(text: &str) -> String {
    scan(text).clean
}

/// Canonicalise markers written with or without the emoji variation selector
pub fn normalize(text: &str) -> String {
    text.replace(START, "\u{1F170}")
        .replace(START_BASE, START)
        .replace(END, "\u{1F171}")
        .replace(END_BASE, END)
}

/// Stored form of a document: buffer with the caret parked as [`CURSOR_SYMBOL`]
pub fn park(doc: &DocumentState) -> String {
    let clean = strip(&doc.buffer);
    let pos = doc.selection.clamp_to(&clean).start;
    let mut out = String::with_capacity(clean.len() + CURSOR_SYMBOL.len_utf8());
    out.push_str(&clean[..pos]);
    out.push(CURSOR_SYMBOL);
    out.push_str(&clean[pos..]);
    out
}

/// Restore a parked document; without a parked caret the caret goes to the end
pub fn unpark(stored: &str) -> DocumentState {
    match stored.find(CURSOR_SYMBOL) {
        Some(idx) => {
            let before = strip(&stored[..idx]);
            let pos = before.len();
            DocumentState::new(strip(stored), Selection::caret(pos))
        }
        None => DocumentState::with_caret_at_end(strip(stored)),
    }
}

struct Scan {
    clean: String,
    start: Option<usize>,
    end: Option<usize>,
    start_count: usize,
    end_count: usize,
}

/// Single pass that strips markers and records the clean offsets of the
/// first start and end markers
fn scan(tagged: &str) -> Scan {
    let mut scan = Scan {
        clean: String::with_capacity(tagged.len()),
        start: None,
        end: None,
        start_count: 0,
        end_count: 0,
    };

    let mut chars = tagged.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            START_BASE | END_BASE => {
                if chars.peek() == Some(&'\u{FE0F}') {
                    chars.next();
                }
                let pos = scan.clean.len();
                if c == START_BASE {
                    scan.start_count += 1;
                    scan.start.get_or_insert(pos);
                } else {
                    scan.end_count += 1;
                    scan.end.get_or_insert(pos);
                }
            }
            CURSOR_SYMBOL => {}
            _ => scan.clean.push(c),
        }
    }
    scan
}
