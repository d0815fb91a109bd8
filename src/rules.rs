//! Rule configuration model and parser
//!
//! The rule file is line oriented. A line starting with `<number>.` opens a
//! section; section 1 holds commands, section 2 substitutions and section 3
//! regex operations:
//!
//! ```text
//! 1. Commands
//! undo=#undo
//! 2. Substitutions
//! period|full stop=.
//! 3. Regex Operations
//! selection delete=🅰️[\s\S]*?🅱️:::🅰️🅱️
//! ```
//!
//! Parsing never fails. Malformed lines are skipped and recorded as
//! [`ParseWarning`]s. Triggers and operation patterns are compiled once per
//! [`RuleSet`], which is rebuilt wholesale on every reload.

use std::fmt;

use regex::{Regex, RegexBuilder};

use crate::error::EngineError;
use crate::marker;
use crate::transform::translate_template;

/// Built-in commands a rule in section 1 can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Flush the pending transcript through the speech collaborator
    Process,
    /// Send the pending transcript to the completion service as an instruction
    Execute,
    Undo,
    Redo,
    /// Stop listening
    Stop,
    /// Throw away the pending transcript
    Discard,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Process,
        Command::Execute,
        Command::Undo,
        Command::Redo,
        Command::Stop,
        Command::Discard,
    ];

    /// Parse a command name, with or without the leading `#`
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let name = name.strip_prefix('#').unwrap_or(name);
        Command::ALL
            .into_iter()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Process => "process",
            Command::Execute => "execute",
            Command::Undo => "undo",
            Command::Redo => "redo",
            Command::Stop => "stop",
            Command::Discard => "discard",
        }
    }

    /// Commands that may end a longer utterance and still fire
    pub fn is_tail_command(&self) -> bool {
        matches!(self, Command::Process | Command::Execute | Command::Discard)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.name())
    }
}

/// What a rule does once its trigger matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    Command(Command),
    /// Literal text inserted at the caret (`\n` already decoded)
    Substitution(String),
    /// Regex rewrite over the marker-tagged buffer
    RegexOp { pattern: String, template: String },
}

impl RuleKind {
    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::Command(_) => "command",
            RuleKind::Substitution(_) => "substitution",
            RuleKind::RegexOp { .. } => "regex",
        }
    }
}

#[derive(Debug, Clone)]
struct TriggerRegex {
    /// `^(trigger)$`
    whole: Regex,
    /// `(?:^|\s)(trigger)\s*$`
    tail: Regex,
    /// `(?:^|\s)(trigger)[\s.,!?]*$`, tolerant of transcriber punctuation
    spoken_tail: Regex,
}

/// A compiled regex operation ready for a single global substitution pass
#[derive(Debug, Clone)]
pub struct CompiledOp {
    pub regex: Regex,
    /// Replacement in the regex crate's `${n}` syntax
    pub replacement: String,
}

/// One parsed configuration line
#[derive(Debug, Clone)]
pub struct Rule {
    pub trigger: String,
    pub kind: RuleKind,
    /// 1-based source line
    pub line: usize,
    matcher: Result<TriggerRegex, String>,
    operation: Option<Result<CompiledOp, String>>,
}

impl Rule {
    pub fn new(trigger: impl Into<String>, kind: RuleKind, line: usize) -> Self {
        let trigger = trigger.into();
        let matcher = compile_trigger(&trigger);
        let operation = match &kind {
            RuleKind::RegexOp { pattern, template } => Some(compile_operation(pattern, template)),
            _ => None,
        };
        Self {
            trigger,
            kind,
            line,
            matcher,
            operation,
        }
    }

    /// Whether the trigger compiled and the rule takes part in matching
    pub fn is_matchable(&self) -> bool {
        self.matcher.is_ok()
    }

    pub fn trigger_error(&self) -> Option<EngineError> {
        self.matcher
            .as_ref()
            .err()
            .map(|message| EngineError::InvalidTriggerRegex {
                trigger: self.trigger.clone(),
                message: message.clone(),
            })
    }

    /// Case-insensitive whole-utterance match against the trimmed utterance
    pub fn matches_whole(&self, utterance: &str) -> bool {
        self.matcher
            .as_ref()
            .is_ok_and(|m| m.whole.is_match(utterance.trim()))
    }

    /// Byte offset where a trailing trigger (including its leading
    /// whitespace) starts in `utterance`
    pub fn tail_match(&self, utterance: &str) -> Option<usize> {
        let m = self.matcher.as_ref().ok()?;
        m.tail.find(utterance).map(|found| found.start())
    }

    /// Like [`Rule::tail_match`], but also skips trailing `.,!?` added by a
    /// transcriber
    pub fn spoken_tail_match(&self, utterance: &str) -> Option<usize> {
        let m = self.matcher.as_ref().ok()?;
        m.spoken_tail.find(utterance).map(|found| found.start())
    }

    /// Compiled regex operation, or the reason it cannot run
    pub fn operation(&self) -> Result<&CompiledOp, EngineError> {
        match &self.operation {
            Some(Ok(op)) => Ok(op),
            Some(Err(message)) => Err(EngineError::InvalidOperationRegex {
                trigger: self.trigger.clone(),
                message: message.clone(),
            }),
            None => Err(EngineError::InvalidOperationRegex {
                trigger: self.trigger.clone(),
                message: format!("{} rule has no regex operation", self.kind.label()),
            }),
        }
    }

    pub fn command(&self) -> Option<Command> {
        match self.kind {
            RuleKind::Command(cmd) => Some(cmd),
            _ => None,
        }
    }
}

fn compile_trigger(trigger: &str) -> Result<TriggerRegex, String> {
    let build = |pattern: String| {
        RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| e.to_string())
    };
    Ok(TriggerRegex {
        whole: build(format!(r"^({})$", trigger))?,
        tail: build(format!(r"(?:^|\s)({})\s*$", trigger))?,
        spoken_tail: build(format!(r"(?:^|\s)({})[\s.,!?]*$", trigger))?,
    })
}

fn compile_operation(pattern: &str, template: &str) -> Result<CompiledOp, String> {
    let regex = RegexBuilder::new(&marker::normalize(pattern))
        .multi_line(true)
        .build()
        .map_err(|e| e.to_string())?;
    let groups = regex.captures_len() - 1;
    let replacement = translate_template(&marker::normalize(template), groups);
    Ok(CompiledOp { regex, replacement })
}

/// Why a configuration line was skipped or degraded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Line has the wrong shape for its section
    Malformed,
    /// Section 1 names a command that does not exist
    UnknownCommand,
    /// Trigger does not compile; the rule is kept but never matches
    InvalidTriggerRegex,
    /// Regex operation does not compile; applying the rule reports an error
    InvalidOperationRegex,
}

/// Diagnostic produced while parsing a rule file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub line: usize,
    pub kind: WarningKind,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Ordered rules in file order, plus the warnings produced while parsing
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
    warnings: Vec<ParseWarning>,
}

impl RuleSet {
    /// Parse a rule file. Total: never fails, skips what it cannot use.
    pub fn parse(text: &str) -> Self {
        let mut set = RuleSet::default();
        let mut section = 1u32;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if let Some(number) = section_header(line) {
                section = number;
                continue;
            }

            if line.is_empty() || line.starts_with('#') || !line.contains('=') {
                continue;
            }

            match parse_line(line, section) {
                Ok((trigger, kind)) => {
                    let rule = Rule::new(trigger, kind, line_no);
                    set.check(&rule);
                    set.rules.push(rule);
                }
                Err((kind, message)) => set.warn(line_no, kind, message),
            }
        }

        log::debug!(
            "parsed {} rules with {} warnings",
            set.rules.len(),
            set.warnings.len()
        );
        set
    }

    fn check(&mut self, rule: &Rule) {
        if let Some(err) = rule.trigger_error() {
            self.warn(rule.line, WarningKind::InvalidTriggerRegex, err.to_string());
        }
        if matches!(rule.kind, RuleKind::RegexOp { .. }) {
            if let Err(err) = rule.operation() {
                self.warn(rule.line, WarningKind::InvalidOperationRegex, err.to_string());
            }
        }
    }

    fn warn(&mut self, line: usize, kind: WarningKind, message: String) {
        let warning = ParseWarning {
            line,
            kind,
            message,
        };
        log::warn!("rule config {}", warning);
        self.warnings.push(warning);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// `Some(n)` for a `<n>.` section header line
fn section_header(line: &str) -> Option<u32> {
    let digits_end = line.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 || !line[digits_end..].starts_with('.') {
        return None;
    }
    line[..digits_end].parse().ok()
}

type LineError = (WarningKind, String);

fn parse_line(line: &str, section: u32) -> Result<(String, RuleKind), LineError> {
    // the caller guarantees at least one '='
    let (trigger, rest) = line.split_once('=').unwrap_or((line, ""));
    let trigger = trigger.trim();
    if trigger.is_empty() {
        return Err((
            WarningKind::Malformed,
            format!("Missing trigger in section {} rule: {}", section, line),
        ));
    }

    let is_regex_section = section == 3 || (section != 1 && section != 2 && rest.contains(":::"));

    let kind = if is_regex_section {
        let Some((pattern, template)) = rest.split_once(":::") else {
            return Err((
                WarningKind::Malformed,
                format!("Invalid section {} rule (missing ':::'): {}", section, line),
            ));
        };
        RuleKind::RegexOp {
            pattern: pattern.to_string(),
            template: template.to_string(),
        }
    } else if section == 1 {
        match Command::from_name(rest) {
            Some(cmd) => RuleKind::Command(cmd),
            None => {
                return Err((
                    WarningKind::UnknownCommand,
                    format!("Unknown command '{}' for trigger '{}'", rest.trim(), trigger),
                ));
            }
        }
    } else {
        RuleKind::Substitution(rest.replace("\\n", "\n"))
    };

    Ok((trigger.to_string(), kind))
}
