//! Applies a matched rule (or plain dictation) to a document
//!
//! Every function here is pure: it takes the current [`DocumentState`] and
//! returns a new one, or an error that leaves the caller's state untouched.
//! History and highlighting are the session's job.

use crate::error::EngineError;
use crate::marker::{self, Decoded};
use crate::rules::{Command, Rule, RuleKind};
use crate::state::{DocumentState, Selection};

/// Result of applying a rule
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    /// The document was rewritten
    Edit(DocumentState),
    /// A regex operation broke the marker protocol; the selection was recovered
    Recovered(DocumentState, EngineError),
    /// A command to be dispatched by the session
    Command(Command),
    /// Nothing to do (blank dictation)
    Unchanged,
}

/// Apply `rule` to `doc`; with no rule, insert `utterance` as dictation
pub fn apply(
    rule: Option<&Rule>,
    utterance: &str,
    doc: &DocumentState,
) -> Result<Transform, EngineError> {
    let Some(rule) = rule else {
        return Ok(match dictation_text(doc, utterance) {
            Some(text) => Transform::Edit(insert(doc, &text)),
            None => Transform::Unchanged,
        });
    };

    match &rule.kind {
        RuleKind::Command(cmd) => Ok(Transform::Command(*cmd)),
        RuleKind::Substitution(text) => Ok(Transform::Edit(insert(doc, text))),
        RuleKind::RegexOp { .. } => {
            let decoded = rewrite(rule, doc)?;
            Ok(match decoded.violation {
                None => Transform::Edit(decoded.doc),
                Some(err) => Transform::Recovered(decoded.doc, err),
            })
        }
    }
}

/// Replace the selection with `text` and leave a caret after it
pub fn insert(doc: &DocumentState, text: &str) -> DocumentState {
    let sel = doc.selection.clamp_to(&doc.buffer);
    let mut buffer = String::with_capacity(doc.buffer.len() + text.len());
    buffer.push_str(&doc.buffer[..sel.start]);
    buffer.push_str(text);
    buffer.push_str(&doc.buffer[sel.end..]);
    DocumentState::new(buffer, Selection::caret(sel.start + text.len()))
}

/// Run a regex operation over the marker-tagged buffer
///
/// One global substitution pass in multi-line mode. Markers in the result
/// become the new selection; if the rewrite lost both markers the caret goes
/// to the start of the line it was on.
pub fn regex_op(rule: &Rule, doc: &DocumentState) -> Result<DocumentState, EngineError> {
    rewrite(rule, doc).map(|decoded| decoded.doc)
}

/// [`regex_op`], keeping the marker-protocol report
pub fn rewrite(rule: &Rule, doc: &DocumentState) -> Result<Decoded, EngineError> {
    let op = rule.operation()?;
    let tagged = marker::linearize(doc);
    let rewritten = op.regex.replace_all(&tagged, op.replacement.as_str());

    log::debug!("regex op '{}': {:?} -> {:?}", rule.trigger, tagged, rewritten);

    Ok(marker::decode(&rewritten, doc.cursor_line()))
}

/// Prepare dictated text for insertion at the caret
///
/// Capitalises the first letter at the start of a sentence or of a line with
/// no letters yet, lower-cases it otherwise, and prefixes a space when the
/// character before the caret is neither a space nor a newline. Returns
/// `None` for blank input.
pub fn dictation_text(doc: &DocumentState, utterance: &str) -> Option<String> {
    let text = utterance.trim();
    if text.is_empty() {
        return None;
    }

    let pos = doc.selection.clamp_to(&doc.buffer).start;
    let before = &doc.buffer[..pos];
    let trimmed = before.trim_end_matches([' ', '\t']);
    let line = &trimmed[trimmed.rfind('\n').map_or(0, |i| i + 1)..];

    let sentence_start = match trimmed.chars().last() {
        None => true,
        Some(c) => matches!(c, '.' | '!' | '?' | '\n'),
    } || !line.chars().any(char::is_alphabetic);

    let needs_space = before.chars().last().is_some_and(|c| c != '\n' && c != ' ');

    let mut prepared = String::with_capacity(text.len() + 1);
    if needs_space {
        prepared.push(' ');
    }
    prepared.push_str(&set_first_letter_case(text, sentence_start));
    Some(prepared)
}

fn set_first_letter_case(text: &str, upper: bool) -> String {
    let Some((idx, c)) = text.char_indices().find(|(_, c)| c.is_alphabetic()) else {
        return text.to_string();
    };
    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..idx]);
    if upper {
        out.extend(c.to_uppercase());
    } else {
        out.extend(c.to_lowercase());
    }
    out.push_str(&text[idx + c.len_utf8()..]);
    out
}

/// Translate an ECMAScript-style replacement template into regex crate syntax
///
/// `\n` becomes a newline, `$n`/`$nn` become `${n}` when group `n` exists,
/// `$&` is the whole match, `$<name>` a named group and `$$` a literal `$`.
/// Any other `$` is literal.
pub fn translate_template(template: &str, groups: usize) -> String {
    let template = template.replace("\\n", "\n");
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push_str("$$");
            }
            Some('&') => {
                chars.next();
                out.push_str("${0}");
            }
            Some(d) if d.is_ascii_digit() => {
                chars.next();
                let first = d.to_digit(10).unwrap_or(0) as usize;
                let second = chars.peek().and_then(|c| c.to_digit(10)).map(|n| n as usize);

                match second {
                    Some(n) if first * 10 + n >= 1 && first * 10 + n <= groups => {
                        chars.next();
                        out.push_str(&format!("${{{}}}", first * 10 + n));
                    }
                    _ if first >= 1 && first <= groups => {
                        out.push_str(&format!("${{{}}}", first));
                    }
                    _ => {
                        out.push_str("$$");
                        out.push(d);
                    }
                }
            }
            Some('<') => {
                let rest: String = chars.clone().collect();
                match rest.find('>') {
                    Some(end) if end > 1 => {
                        out.push_str(&format!("${{{}}}", &rest[1..end]));
                        for _ in rest[..=end].chars() {
                            chars.next();
                        }
                    }
                    _ => out.push_str("$$"),
                }
            }
            _ => out.push_str("$$"),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{END, START};

    fn doc(buffer: &str, start: usize, end: usize) -> DocumentState {
        DocumentState::new(buffer, Selection::new(start, end))
    }

    fn op(pattern: &str, template: &str) -> Rule {
        Rule::new(
            "op",
            RuleKind::RegexOp {
                pattern: pattern.to_string(),
                template: template.to_string(),
            },
            1,
        )
    }

    #[test]
    fn test_dictation_appends_new_sentence() {
        let d = DocumentState::with_caret_at_end("Go to the store.");
        let result = apply(None, "buy milk", &d).unwrap();
        let expected = doc("Go to the store. Buy milk", 25, 25);
        assert_eq!(result, Transform::Edit(expected));
    }

    #[test]
    fn test_dictation_mid_sentence_lowercases() {
        let d = DocumentState::with_caret_at_end("I went to");
        assert_eq!(dictation_text(&d, "The Park"), Some(" the Park".to_string()));
    }

    #[test]
    fn test_dictation_empty_buffer_capitalizes_without_space() {
        let d = DocumentState::default();
        assert_eq!(dictation_text(&d, "hello"), Some("Hello".to_string()));
    }

    #[test]
    fn test_dictation_after_newline_and_trailing_space() {
        let d = DocumentState::with_caret_at_end("Title\n");
        assert_eq!(dictation_text(&d, "body"), Some("Body".to_string()));

        // trailing space before the caret: no extra space, still mid-sentence
        let d = DocumentState::with_caret_at_end("some words ");
        assert_eq!(dictation_text(&d, "More"), Some("more".to_string()));

        // trailing tab is trimmed for the sentence check but still needs a space
        let d = DocumentState::with_caret_at_end("Done.\t");
        assert_eq!(dictation_text(&d, "next"), Some(" Next".to_string()));
    }

    #[test]
    fn test_dictation_line_without_letters_capitalizes() {
        let d = DocumentState::with_caret_at_end("Intro\n- ");
        assert_eq!(dictation_text(&d, "first item"), Some("First item".to_string()));

        let d = DocumentState::with_caret_at_end("1)");
        assert_eq!(dictation_text(&d, "apples"), Some(" Apples".to_string()));
    }

    #[test]
    fn test_dictation_capitalizes_first_letter_not_first_char() {
        let d = DocumentState::default();
        assert_eq!(dictation_text(&d, "\"quoted\" text"), Some("\"Quoted\" text".to_string()));
    }

    #[test]
    fn test_blank_dictation_is_noop() {
        let d = DocumentState::with_caret_at_end("text");
        assert_eq!(apply(None, "   ", &d).unwrap(), Transform::Unchanged);
    }

    #[test]
    fn test_insert_replaces_selection() {
        let d = doc("hello world", 6, 11);
        assert_eq!(insert(&d, "there"), doc("hello there", 11, 11));

        let d = doc("ab", 1, 1);
        assert_eq!(insert(&d, "\n"), doc("a\nb", 2, 2));
    }

    #[test]
    fn test_substitution_rule() {
        let rule = Rule::new("comma", RuleKind::Substitution(",".into()), 1);
        let d = DocumentState::with_caret_at_end("Hi");
        assert_eq!(
            apply(Some(&rule), "comma", &d).unwrap(),
            Transform::Edit(doc("Hi,", 3, 3))
        );
    }

    #[test]
    fn test_command_rule_is_forwarded() {
        let rule = Rule::new("undo", RuleKind::Command(Command::Undo), 1);
        let d = DocumentState::default();
        assert_eq!(apply(Some(&rule), "undo", &d).unwrap(), Transform::Command(Command::Undo));
    }

    #[test]
    fn test_selection_delete() {
        let rule = op("🅰️[\\s\\S]*?🅱️", "🅰️🅱️");
        let d = doc("abc", 1, 2);
        assert_eq!(regex_op(&rule, &d).unwrap(), doc("ac", 1, 1));
    }

    #[test]
    fn test_delete_previous_word() {
        let rule = op("(\\S+\\s*)?🅰️[\\s\\S]*?🅱️", "🅰️🅱️");
        let d = DocumentState::with_caret_at_end("one two three");
        assert_eq!(regex_op(&rule, &d).unwrap(), doc("one two ", 8, 8));
    }

    #[test]
    fn test_clear_space_keeps_selection() {
        let rule = op("[ \\t]*🅰️([\\s\\S]*?)🅱️[ \\t]*", "🅰️$1🅱️");
        let d = doc("a   bc  d", 4, 6);
        assert_eq!(regex_op(&rule, &d).unwrap(), doc("abcd", 1, 3));
    }

    #[test]
    fn test_move_to_start_of_line() {
        let rule = op(
            "(^|[\\s\\S]*\\n)([^\\n]*)🅰️([\\s\\S]*?)🅱️([\\s\\S]*)",
            "$1🅰️🅱️$2$3$4",
        );
        let d = DocumentState::with_caret_at_end("first\nsecond");
        assert_eq!(regex_op(&rule, &d).unwrap(), doc("first\nsecond", 6, 6));
    }

    #[test]
    fn test_move_down_uses_newline_escape() {
        let rule = op(
            "(^|[\\s\\S]*\\n)([^\\n]*)🅰️([\\s\\S]*?)🅱️([^\\n]*)\\n([^\\n]*)([\\s\\S]*)",
            "$1$2$3$4\\n🅰️🅱️$5$6",
        );
        let d = doc("one\ntwo", 1, 1);
        assert_eq!(regex_op(&rule, &d).unwrap(), doc("one\ntwo", 4, 4));
    }

    #[test]
    fn test_clear_all() {
        let rule = op("[\\s\\S]*", "🅰️🅱️");
        let d = doc("lots of text", 3, 7);
        assert_eq!(regex_op(&rule, &d).unwrap(), doc("", 0, 0));
    }

    #[test]
    fn test_op_losing_markers_falls_back_to_line_start() {
        let rule = op("🅰️🅱️", "");
        let d = DocumentState::with_caret_at_end("one\ntwo");
        assert_eq!(regex_op(&rule, &d).unwrap(), doc("one\ntwo", 4, 4));
    }

    #[test]
    fn test_apply_reports_recovered_markers() {
        let rule = op("🅰️🅱️", "");
        let d = DocumentState::with_caret_at_end("one\ntwo");
        match apply(Some(&rule), "op", &d).unwrap() {
            Transform::Recovered(doc, err) => {
                assert_eq!(doc, DocumentState::new("one\ntwo", Selection::caret(4)));
                assert_eq!(err.kind(), crate::error::ErrorKind::MarkerProtocolViolation);
            }
            other => panic!("expected recovered edit, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_range_selection_does_not_panic() {
        let rule = op("(\\S+\\s*)?🅰️[\\s\\S]*?🅱️", "🅰️🅱️");
        let d = DocumentState {
            buffer: "abc".to_string(),
            selection: Selection { start: 9, end: 9 },
        };
        assert_eq!(regex_op(&rule, &d).unwrap(), doc("", 0, 0));
    }

    #[test]
    fn test_invalid_op_is_error() {
        let rule = op("(", "x");
        let d = DocumentState::with_caret_at_end("abc");
        let err = apply(Some(&rule), "op", &d).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperationRegex { .. }));
    }

    #[test]
    fn test_apply_is_deterministic() {
        let rule = op("(\\S+\\s*)?🅰️[\\s\\S]*?🅱️", "🅰️🅱️");
        let d = DocumentState::with_caret_at_end("alpha beta");
        let first = apply(Some(&rule), "delete", &d).unwrap();
        let second = apply(Some(&rule), "delete", &d).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_translate_template() {
        assert_eq!(translate_template("$1abc", 1), "${1}abc");
        assert_eq!(translate_template(&format!("$1{START}{END}$2"), 2), format!("${{1}}{START}{END}${{2}}"));
        assert_eq!(translate_template("$12", 12), "${12}");
        assert_eq!(translate_template("$12", 1), "${1}2");
        assert_eq!(translate_template("$3", 1), "$$3");
        assert_eq!(translate_template("$0", 1), "$$0");
        assert_eq!(translate_template("cost $$5", 0), "cost $$5");
        assert_eq!(translate_template("[$&]", 0), "[${0}]");
        assert_eq!(translate_template("$<word>!", 1), "${word}!");
        assert_eq!(translate_template("a\\nb", 0), "a\nb");
        assert_eq!(translate_template("$", 0), "$$");
    }
}
