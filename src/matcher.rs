//! Rule selection for an utterance
//!
//! Two phases, in order of precedence:
//! 1. Command tails: a `process`, `execute` or `discard` trigger at the end of
//!    a longer utterance fires without waiting for silence.
//! 2. Whole-utterance match: the first rule, in file order, whose trigger
//!    matches the entire trimmed utterance.
//!
//! Anything else is dictation. There is no scoring: first match wins.

use crate::rules::{Command, Rule, RuleSet};

/// A command trigger found at the end of an utterance
#[derive(Debug, Clone, Copy)]
pub struct TailMatch<'a> {
    pub rule: &'a Rule,
    /// Byte offset where the trigger (and the whitespace before it) begins
    pub start: usize,
}

/// First matching tail trigger for each tail command
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandTriggers<'a> {
    pub process: Option<TailMatch<'a>>,
    pub execute: Option<TailMatch<'a>>,
    pub discard: Option<TailMatch<'a>>,
}

impl CommandTriggers<'_> {
    pub fn any(&self) -> bool {
        self.process.is_some() || self.execute.is_some() || self.discard.is_some()
    }
}

/// Find command-tail triggers in a (possibly interim) utterance
pub fn match_command_triggers<'a>(utterance: &str, rules: &'a RuleSet) -> CommandTriggers<'a> {
    let mut found = CommandTriggers::default();

    for rule in rules.iter() {
        let Some(cmd) = rule.command().filter(Command::is_tail_command) else {
            continue;
        };
        let slot = match cmd {
            Command::Process => &mut found.process,
            Command::Execute => &mut found.execute,
            Command::Discard => &mut found.discard,
            _ => continue,
        };
        if slot.is_some() {
            continue;
        }
        if let Some(start) = rule.tail_match(utterance) {
            *slot = Some(TailMatch { rule, start });
        }
    }

    found
}

/// First rule whose trigger matches the whole trimmed utterance
pub fn match_whole<'a>(utterance: &str, rules: &'a RuleSet) -> Option<&'a Rule> {
    let rule = rules.iter().find(|rule| rule.matches_whole(utterance));
    if let Some(rule) = rule {
        log::debug!(
            "matched '{}' -> {} rule '{}' (line {})",
            utterance.trim(),
            rule.kind.label(),
            rule.trigger,
            rule.line
        );
    }
    rule
}

/// What the session should do with an utterance
#[derive(Debug, Clone)]
pub enum Route<'a> {
    /// Process the text before the trigger
    Process(String),
    /// Send the text before the trigger to the completion service
    Execute(String),
    /// Drop the pending transcript
    Discard,
    /// Apply a whole-utterance rule
    Rule(&'a Rule),
    /// No rule: keep as dictation text
    Dictation,
}

/// Route an utterance following the tail-before-whole precedence
pub fn route<'a>(utterance: &str, rules: &'a RuleSet) -> Route<'a> {
    let triggers = match_command_triggers(utterance, rules);

    if let Some(tail) = triggers.process {
        return Route::Process(utterance[..tail.start].to_string());
    }
    if let Some(tail) = triggers.execute {
        return Route::Execute(utterance[..tail.start].to_string());
    }
    if triggers.discard.is_some() {
        return Route::Discard;
    }

    match match_whole(utterance, rules) {
        Some(rule) => Route::Rule(rule),
        None => Route::Dictation,
    }
}

/// Text with trailing process/execute trigger words removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stripped {
    pub text: String,
    /// An execute trigger was among the removed words
    pub execute: bool,
}

/// Remove trailing `process`/`execute` trigger words from re-transcribed text
///
/// Transcription services tend to end with punctuation (`"... process."`),
/// so trailing `.,!?` is tolerated after the trigger.
pub fn strip_command_tail(text: &str, rules: &RuleSet) -> Stripped {
    let mut stripped = Stripped {
        text: text.to_string(),
        execute: false,
    };

    for rule in rules.iter() {
        let Some(cmd @ (Command::Process | Command::Execute)) = rule.command() else {
            continue;
        };
        if let Some(start) = rule.spoken_tail_match(&stripped.text) {
            if cmd == Command::Execute {
                stripped.execute = true;
            }
            stripped.text = stripped.text[..start].trim().to_string();
        }
    }

    stripped
}
