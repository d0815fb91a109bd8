//! Marker-based text command engine for a voice-driven editor
//!
//! An utterance is matched against a [`RuleSet`] and turned into a new
//! [`DocumentState`] by the [`EditSession`], which also keeps the undo history
//! and reports the changed span for highlighting.

pub mod config;
pub mod diff;
pub mod error;
pub mod history;
pub mod marker;
pub mod matcher;
pub mod render;
pub mod rules;
pub mod session;
pub mod state;
pub mod transform;

pub use config::Config;
pub use diff::{diff, DiffSpan};
pub use error::{EngineError, ErrorKind};
pub use history::HistoryStack;
pub use rules::{Command, Rule, RuleKind, RuleSet};
pub use session::{Completion, EditSession, Outcome};
pub use state::{DocumentState, ListenState, Selection};
