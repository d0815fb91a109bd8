//! Editing session - threads document, history and rules through every call
//!
//! The session is the only owner of the current [`DocumentState`] and the
//! [`HistoryStack`]. Calls are expected to be serialised by the surrounding
//! controller: at most one transformation is in flight, and each call either
//! commits a complete new state or leaves everything as it was.

use crate::config::{Config, DEFAULT_SYSTEM_PROMPT};
use crate::diff::{diff, DiffSpan};
use crate::error::EngineError;
use crate::history::{HistoryStack, MAX_HISTORY};
use crate::marker;
use crate::matcher::{self, Route};
use crate::rules::{Command, Rule, RuleSet};
use crate::state::{DocumentState, ListenState};
use crate::transform::{self, Transform};

/// Completion service: rewrites a marker-tagged buffer following an instruction
///
/// The response is expected to carry the markers again; it is decoded with the
/// same single/both/neither recovery rules as regex operations.
pub trait Completion {
    fn complete(
        &self,
        system_prompt: &str,
        tagged: &str,
        instruction: &str,
    ) -> Result<String, EngineError>;
}

impl<F> Completion for F
where
    F: Fn(&str, &str, &str) -> Result<String, EngineError>,
{
    fn complete(
        &self,
        system_prompt: &str,
        tagged: &str,
        instruction: &str,
    ) -> Result<String, EngineError> {
        self(system_prompt, tagged, instruction)
    }
}

/// What happened to an utterance
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The document changed; spans are in the new buffer
    Edited {
        spans: Vec<DiffSpan>,
        /// Marker-protocol problem that was recovered while decoding the result
        recovered: Option<EngineError>,
    },
    Undone { spans: Vec<DiffSpan> },
    Redone { spans: Vec<DiffSpan> },
    NothingToUndo,
    NothingToRedo,
    /// Listening was switched off
    Stopped,
    /// The pending transcript was thrown away
    Discarded,
    /// Hand this text to the speech collaborator, or to [`EditSession::process_text`]
    Process(String),
    /// Hand this instruction to the completion service via [`EditSession::execute`]
    Execute(String),
    /// Text waiting for a `process` command
    Pending(String),
    /// Input arrived while results are ignored
    Ignored,
    /// Nothing to do
    Unchanged,
}

impl Outcome {
    /// Changed spans to highlight, if the document changed
    pub fn spans(&self) -> &[DiffSpan] {
        match self {
            Outcome::Edited { spans, .. }
            | Outcome::Undone { spans }
            | Outcome::Redone { spans } => {
                spans
            }
            _ => &[],
        }
    }

    /// Short status line for the UI
    pub fn status(&self) -> String {
        match self {
            Outcome::Edited {
                recovered: Some(err),
                ..
            } => err.to_string(),
            Outcome::Edited { .. } => "Ready".to_string(),
            Outcome::Undone { .. } => "Undo".to_string(),
            Outcome::Redone { .. } => "Redo".to_string(),
            Outcome::NothingToUndo => EngineError::HistoryEmpty("undo").to_string(),
            Outcome::NothingToRedo => EngineError::HistoryEmpty("redo").to_string(),
            Outcome::Stopped => "Stopped".to_string(),
            Outcome::Discarded => "Discarded".to_string(),
            Outcome::Process(_) => "Processing...".to_string(),
            Outcome::Execute(instruction) => format!("Executing: \"{}\"", instruction),
            Outcome::Pending(text) => format!("Pending: {}", text),
            Outcome::Ignored => "Ignored".to_string(),
            Outcome::Unchanged => "Ready".to_string(),
        }
    }
}

pub struct EditSession {
    rules: RuleSet,
    /// Bumped on every rule reload
    generation: u64,
    doc: DocumentState,
    history: HistoryStack,
    listen: ListenState,
    /// Final utterances not yet processed
    pending: String,
    auto_process: bool,
    system_prompt: String,
}

impl EditSession {
    /// Start a session on `doc`; the initial document is the first snapshot
    pub fn new(rules: RuleSet, doc: DocumentState) -> Self {
        let mut history = HistoryStack::new(MAX_HISTORY);
        history.push(&doc.snapshot());
        Self {
            rules,
            generation: 0,
            doc,
            history,
            listen: ListenState::default(),
            pending: String::new(),
            auto_process: true,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Build a session from configuration, seeding it from a stored snapshot
    pub fn from_config(config: &Config, stored: Option<&str>) -> Result<Self, EngineError> {
        let rules = RuleSet::parse(&config.rules_text()?);
        let doc = stored.map(DocumentState::from_snapshot).unwrap_or_default();
        Ok(Self::new(rules, doc)
            .with_history_capacity(config.history.capacity)
            .with_auto_process(config.interaction.auto_process)
            .with_system_prompt(&config.completion.system_prompt))
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        let mut history = HistoryStack::new(capacity);
        history.push(&self.doc.snapshot());
        self.history = history;
        self
    }

    pub fn with_auto_process(mut self, auto_process: bool) -> Self {
        self.auto_process = auto_process;
        self
    }

    pub fn with_system_prompt(mut self, prompt: &str) -> Self {
        self.system_prompt = prompt.to_string();
        self
    }

    pub fn document(&self) -> &DocumentState {
        &self.doc
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    pub fn listen_state(&self) -> ListenState {
        self.listen
    }

    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Marker-free buffer for storage
    pub fn snapshot(&self) -> String {
        self.doc.snapshot()
    }

    /// Replace the rule set wholesale
    pub fn reload_rules(&mut self, text: &str) -> &RuleSet {
        self.rules = RuleSet::parse(text);
        self.generation += 1;
        log::info!(
            "rules reloaded (generation {}): {} rules, {} warnings",
            self.generation,
            self.rules.len(),
            self.rules.warnings().len()
        );
        &self.rules
    }

    /// Adopt a document edited outside the engine (typing, cursor moves)
    ///
    /// With `record`, the new buffer becomes a history snapshot.
    pub fn replace_document(&mut self, doc: DocumentState, record: bool) {
        self.doc = DocumentState::new(doc.buffer, doc.selection);
        if record {
            self.history.push(&self.doc.snapshot());
        }
    }

    /// Start a new recognition segment: results are accepted again
    pub fn begin_segment(&mut self) {
        self.listen.ignore_results = false;
    }

    pub fn start_listening(&mut self) {
        self.listen.listening = true;
        self.listen.ignore_results = false;
    }

    /// Handle an interim or final utterance from the dictation source
    ///
    /// Command tails win over whole-utterance rules; text that matches
    /// nothing becomes pending, or with auto-processing is inserted right
    /// away once final.
    ///
    /// Rules and commands fire on interim results too. Once one has fired,
    /// every further result of the segment, final included, is ignored until
    /// [`begin_segment`](Self::begin_segment).
    pub fn handle_utterance(&mut self, text: &str, is_final: bool) -> Result<Outcome, EngineError> {
        if !self.listen.listening || self.listen.ignore_results {
            return Ok(Outcome::Ignored);
        }

        let transcript = self.transcript_with(text);

        let route = match matcher::route(&transcript, &self.rules) {
            Route::Process(before) => Step::Process(before),
            Route::Execute(before) => Step::Execute(before),
            Route::Discard => Step::Discard,
            Route::Rule(rule) => Step::Rule(rule.clone()),
            Route::Dictation => Step::Dictation,
        };

        match route {
            Step::Process(before) => {
                self.end_segment();
                log::debug!("process trigger, text: {:?}", before.trim());
                Ok(Outcome::Process(before.trim().to_string()))
            }
            Step::Execute(before) => {
                self.end_segment();
                log::debug!("execute trigger, instruction: {:?}", before.trim());
                Ok(Outcome::Execute(before.trim().to_string()))
            }
            Step::Discard => Ok(self.discard()),
            Step::Rule(rule) => {
                self.end_segment();
                self.apply(Some(&rule), transcript.trim())
            }
            Step::Dictation if is_final && self.auto_process => {
                self.pending.clear();
                self.process_text(&transcript)
            }
            Step::Dictation if is_final => {
                self.pending = transcript;
                Ok(Outcome::Pending(self.pending.clone()))
            }
            Step::Dictation => Ok(Outcome::Pending(transcript)),
        }
    }

    /// Run finished text through whole-utterance matching, or insert it as dictation
    pub fn process_text(&mut self, raw: &str) -> Result<Outcome, EngineError> {
        let text = raw.trim();
        if text.is_empty() {
            return Ok(Outcome::Unchanged);
        }
        log::debug!("processing: {:?}", text);

        let rule = matcher::match_whole(text, &self.rules).cloned();
        self.apply(rule.as_ref(), text)
    }

    /// Handle text re-transcribed by the speech collaborator
    ///
    /// Trailing process/execute trigger words are stripped; an execute trigger
    /// (or `execute` mode) turns the text into an instruction.
    pub fn handle_transcription(&mut self, text: &str, execute: bool) -> Result<Outcome, EngineError> {
        let stripped = matcher::strip_command_tail(text, &self.rules);
        if execute || stripped.execute {
            return Ok(Outcome::Execute(stripped.text));
        }
        self.process_text(&stripped.text)
    }

    /// Ask the completion service to rewrite the document
    ///
    /// On failure the document and history are untouched. A response without
    /// markers puts the caret at the start of the line it was on.
    pub fn execute(
        &mut self,
        completion: &dyn Completion,
        instruction: &str,
    ) -> Result<Outcome, EngineError> {
        let tagged = marker::linearize(&self.doc);
        let line = self.doc.cursor_line();

        log::debug!("execute {:?} on {} bytes", instruction, tagged.len());
        let response = completion.complete(&self.system_prompt, &tagged, instruction)?;

        let decoded = marker::decode(response.trim(), line);
        Ok(self.commit(decoded.doc, decoded.violation))
    }

    pub fn undo(&mut self) -> Outcome {
        match self.history.undo().map(str::to_string) {
            Some(snapshot) => Outcome::Undone {
                spans: self.restore(snapshot),
            },
            None => {
                log::info!("nothing to undo");
                Outcome::NothingToUndo
            }
        }
    }

    pub fn redo(&mut self) -> Outcome {
        match self.history.redo().map(str::to_string) {
            Some(snapshot) => Outcome::Redone {
                spans: self.restore(snapshot),
            },
            None => {
                log::info!("nothing to redo");
                Outcome::NothingToRedo
            }
        }
    }

    pub fn stop(&mut self) -> Outcome {
        self.listen.listening = false;
        Outcome::Stopped
    }

    pub fn discard(&mut self) -> Outcome {
        log::debug!("discarding pending text: {:?}", self.pending);
        self.end_segment();
        Outcome::Discarded
    }

    fn apply(&mut self, rule: Option<&Rule>, text: &str) -> Result<Outcome, EngineError> {
        match transform::apply(rule, text, &self.doc)? {
            Transform::Edit(doc) => Ok(self.commit(doc, None)),
            Transform::Recovered(doc, err) => Ok(self.commit(doc, Some(err))),
            Transform::Command(cmd) => Ok(self.dispatch(cmd)),
            Transform::Unchanged => Ok(Outcome::Unchanged),
        }
    }

    fn dispatch(&mut self, cmd: Command) -> Outcome {
        log::debug!("dispatch {}", cmd);
        match cmd {
            Command::Undo => self.undo(),
            Command::Redo => self.redo(),
            Command::Stop => self.stop(),
            Command::Discard => self.discard(),
            Command::Process | Command::Execute => {
                self.history.push(&self.doc.snapshot());
                let text = std::mem::take(&mut self.pending);
                if cmd == Command::Process {
                    Outcome::Process(text)
                } else {
                    Outcome::Execute(text)
                }
            }
        }
    }

    /// Snapshot, swap in the new document, snapshot again, diff
    fn commit(&mut self, doc: DocumentState, recovered: Option<EngineError>) -> Outcome {
        self.history.push(&self.doc.snapshot());
        let previous = std::mem::replace(&mut self.doc, doc);
        self.history.push(&self.doc.snapshot());
        Outcome::Edited {
            spans: diff(&previous.buffer, &self.doc.buffer),
            recovered,
        }
    }

    fn restore(&mut self, snapshot: String) -> Vec<DiffSpan> {
        let previous = std::mem::replace(&mut self.doc, DocumentState::with_caret_at_end(snapshot));
        diff(&previous.buffer, &self.doc.buffer)
    }

    fn end_segment(&mut self) {
        self.pending.clear();
        self.listen.ignore_results = true;
    }

    fn transcript_with(&self, text: &str) -> String {
        let text = text.trim();
        if self.pending.is_empty() {
            text.to_string()
        } else if text.is_empty() {
            self.pending.clone()
        } else {
            format!("{} {}", self.pending, text)
        }
    }
}

enum Step {
    Process(String),
    Execute(String),
    Discard,
    Rule(Rule),
    Dictation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_RULES;
    use crate::state::Selection;

    fn session(buffer: &str) -> EditSession {
        EditSession::new(
            RuleSet::parse(DEFAULT_RULES),
            DocumentState::with_caret_at_end(buffer),
        )
    }

    #[test]
    fn test_dictation_inserts_and_records_history() {
        let mut s = session("Go to the store.");
        let outcome = s.handle_utterance("buy milk", true).unwrap();
        assert_eq!(s.document().buffer, "Go to the store. Buy milk");
        assert_eq!(s.document().selection, Selection::caret(25));
        assert_eq!(outcome.spans(), &[DiffSpan { start: 16, end: 25 }]);
        assert_eq!(s.history().len(), 2);
    }

    #[test]
    fn test_substitution_then_undo_redo() {
        let mut s = session("Hello");
        s.handle_utterance("comma", true).unwrap();
        assert_eq!(s.document().buffer, "Hello,");

        s.begin_segment();
        assert!(matches!(s.handle_utterance("undo", true).unwrap(), Outcome::Undone { .. }));
        assert_eq!(s.document().buffer, "Hello");
        assert_eq!(s.document().selection, Selection::caret(5));

        s.begin_segment();
        assert!(matches!(s.handle_utterance("redo", true).unwrap(), Outcome::Redone { .. }));
        assert_eq!(s.document().buffer, "Hello,");
        assert_eq!(s.redo(), Outcome::NothingToRedo);
    }

    #[test]
    fn test_undo_on_fresh_session() {
        let mut s = session("text");
        assert_eq!(s.undo(), Outcome::NothingToUndo);
        assert_eq!(s.document().buffer, "text");
    }

    #[test]
    fn test_process_tail_truncates() {
        let mut s = session("");
        let outcome = s.handle_utterance("please undo that process", true).unwrap();
        assert_eq!(outcome, Outcome::Process("please undo that".to_string()));
        assert_eq!(s.document().buffer, "", "process is forwarded, not applied");

        s.process_text("please undo that").unwrap();
        assert_eq!(s.document().buffer, "Please undo that");
    }

    #[test]
    fn test_pending_until_process() {
        let mut s = session("").with_auto_process(false);
        assert_eq!(
            s.handle_utterance("first part", true).unwrap(),
            Outcome::Pending("first part".to_string())
        );
        assert_eq!(
            s.handle_utterance("second part process", true).unwrap(),
            Outcome::Process("first part second part".to_string())
        );
        assert!(s.pending().is_empty());
    }

    #[test]
    fn test_discard_clears_pending_and_ignores_interim() {
        let mut s = session("").with_auto_process(false);
        s.handle_utterance("some words", true).unwrap();
        assert_eq!(s.handle_utterance("discard", true).unwrap(), Outcome::Discarded);
        assert!(s.pending().is_empty());
        assert!(s.listen_state().ignore_results);
        assert_eq!(s.handle_utterance("more", false).unwrap(), Outcome::Ignored);

        s.begin_segment();
        assert_eq!(
            s.handle_utterance("more", false).unwrap(),
            Outcome::Pending("more".to_string())
        );
    }

    #[test]
    fn test_interim_rule_is_not_applied_again_by_final() {
        let mut s = session("Hello");
        assert!(matches!(s.handle_utterance("comma", false).unwrap(), Outcome::Edited { .. }));
        assert_eq!(s.document().buffer, "Hello,");

        assert_eq!(s.handle_utterance("comma", true).unwrap(), Outcome::Ignored);
        assert_eq!(s.document().buffer, "Hello,");

        s.begin_segment();
        s.handle_utterance("comma", true).unwrap();
        assert_eq!(s.document().buffer, "Hello,,");
    }

    #[test]
    fn test_interim_undo_runs_once() {
        let mut s = session("");
        s.handle_utterance("one", true).unwrap();
        s.handle_utterance("two", true).unwrap();
        assert_eq!(s.document().buffer, "One two");

        assert!(matches!(s.handle_utterance("undo", false).unwrap(), Outcome::Undone { .. }));
        assert_eq!(s.handle_utterance("undo", true).unwrap(), Outcome::Ignored);
        assert_eq!(s.document().buffer, "One");
    }

    #[test]
    fn test_interim_process_tail_fires_once() {
        let mut s = session("");
        assert_eq!(
            s.handle_utterance("buy milk process", false).unwrap(),
            Outcome::Process("buy milk".to_string())
        );
        assert_eq!(s.handle_utterance("buy milk process", true).unwrap(), Outcome::Ignored);
    }

    #[test]
    fn test_final_rule_ignores_rest_of_segment() {
        let mut s = session("Hello");
        s.handle_utterance("comma", true).unwrap();
        assert_eq!(s.handle_utterance("world", true).unwrap(), Outcome::Ignored);
        assert_eq!(s.document().buffer, "Hello,");
    }

    #[test]
    fn test_replace_document_clamps_selection() {
        let mut s = session("");
        s.replace_document(
            DocumentState {
                buffer: "abc".to_string(),
                selection: Selection { start: 9, end: 9 },
            },
            false,
        );
        assert_eq!(s.document().selection, Selection::caret(3));
        s.handle_utterance("delete", true).unwrap();
        assert_eq!(s.document(), &DocumentState::default());
    }

    #[test]
    fn test_stop_blocks_input() {
        let mut s = session("");
        assert_eq!(s.handle_utterance("stop", true).unwrap(), Outcome::Stopped);
        assert_eq!(s.handle_utterance("hello", true).unwrap(), Outcome::Ignored);
        s.start_listening();
        s.handle_utterance("hello", true).unwrap();
        assert_eq!(s.document().buffer, "Hello");
    }

    #[test]
    fn test_regex_op_selection_delete() {
        let mut s = session("abc");
        s.replace_document(DocumentState::new("abc", Selection::new(1, 2)), false);
        s.handle_utterance("selection delete", true).unwrap();
        assert_eq!(s.document(), &DocumentState::new("ac", Selection::caret(1)));
    }

    #[test]
    fn test_failed_regex_op_leaves_state() {
        let mut s = session("keep me");
        s.reload_rules("3.\nbreak it=(:::x");
        assert_eq!(s.generation(), 1);
        let before_len = s.history().len();

        let err = s.handle_utterance("break it", true).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperationRegex { .. }));
        assert_eq!(s.document().buffer, "keep me");
        assert_eq!(s.history().len(), before_len);
    }

    #[test]
    fn test_execute_with_completion() {
        let mut s = session("hello world");
        let completion = |_prompt: &str, tagged: &str, instruction: &str| -> Result<String, EngineError> {
            assert_eq!(instruction, "shout");
            Ok(tagged.to_uppercase())
        };
        let outcome = s.execute(&completion, "shout").unwrap();
        assert_eq!(s.document().buffer, "HELLO WORLD");
        assert_eq!(s.document().selection, Selection::caret(11));
        assert_eq!(outcome.spans(), &[DiffSpan { start: 0, end: 11 }]);
    }

    #[test]
    fn test_execute_without_markers_uses_line_fallback() {
        let mut s = session("one\ntwo");
        let completion =
            |_: &str, _: &str, _: &str| -> Result<String, EngineError> { Ok("  ONE\nTWO\n".to_string()) };
        let outcome = s.execute(&completion, "upper").unwrap();
        assert_eq!(outcome.status(), "Marker protocol: no markers in result");
        assert_eq!(s.document().buffer, "ONE\nTWO");
        assert_eq!(s.document().selection, Selection::caret(4));
    }

    #[test]
    fn test_execute_failure_changes_nothing() {
        let mut s = session("stay");
        let completion = |_: &str, _: &str, _: &str| -> Result<String, EngineError> {
            Err(EngineError::Completion("offline".to_string()))
        };
        let err = s.execute(&completion, "anything").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Completion);
        assert_eq!(s.document().buffer, "stay");
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn test_handle_transcription_strips_triggers() {
        let mut s = session("");
        assert_eq!(
            s.handle_transcription("Fix the grammar. Execute.", false).unwrap(),
            Outcome::Execute("Fix the grammar.".to_string())
        );
        s.handle_transcription("write this down, process.", false).unwrap();
        assert_eq!(s.document().buffer, "Write this down,");
    }

    #[test]
    fn test_history_capacity_from_builder() {
        let mut s = session("").with_history_capacity(3);
        for word in ["a", "b", "c", "d"] {
            s.handle_utterance(word, true).unwrap();
        }
        assert_eq!(s.history().len(), 3);
        assert_eq!(s.history().current(), Some("A b c d"));
    }
}
