//! Changed-span detection for highlighting
//!
//! A common-prefix / common-suffix diff: linear time, and good enough to show
//! what changed around the edit point. It does not find minimal edits for
//! transpositions.

/// Half-open byte range in the new buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffSpan {
    pub start: usize,
    pub end: usize,
}

impl DiffSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// A pure deletion leaves an empty span at the deletion point
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Spans of `new` that differ from `old`
///
/// Empty when the strings are equal, otherwise exactly one span. Offsets
/// always fall on character boundaries.
pub fn diff(old: &str, new: &str) -> Vec<DiffSpan> {
    if old == new {
        return Vec::new();
    }

    let prefix: usize = old
        .chars()
        .zip(new.chars())
        .take_while(|(a, b)| a == b)
        .map(|(c, _)| c.len_utf8())
        .sum();

    let limit = old.len().min(new.len()) - prefix;
    let mut suffix = 0;
    for (a, b) in old[prefix..].chars().rev().zip(new[prefix..].chars().rev()) {
        if a != b || suffix + a.len_utf8() > limit {
            break;
        }
        suffix += a.len_utf8();
    }

    vec![DiffSpan {
        start: prefix,
        end: new.len() - suffix,
    }]
}
