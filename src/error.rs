//! Error taxonomy for the command engine
//!
//! Parsing and matching problems are recovered locally and never surface here
//! as hard failures; they are recorded as [`crate::rules::ParseWarning`]s.
//! Only an invalid regex operation aborts a transformation.

use std::fmt;

/// Coarse classification of an [`EngineError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidTriggerRegex,
    InvalidOperationRegex,
    MarkerProtocolViolation,
    HistoryEmpty,
    Completion,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidTriggerRegex => "invalid-trigger-regex",
            ErrorKind::InvalidOperationRegex => "invalid-operation-regex",
            ErrorKind::MarkerProtocolViolation => "marker-protocol-violation",
            ErrorKind::HistoryEmpty => "history-empty",
            ErrorKind::Completion => "completion",
            ErrorKind::Config => "config",
        };
        f.write_str(name)
    }
}

/// Error type for engine operations
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A rule trigger does not compile; the rule is excluded from matching
    InvalidTriggerRegex { trigger: String, message: String },
    /// A regex operation failed to compile; the transformation was aborted
    InvalidOperationRegex { trigger: String, message: String },
    /// Markers were missing or out of order after a transformation
    MarkerProtocolViolation(String),
    /// Undo or redo at a history boundary
    HistoryEmpty(&'static str),
    /// The completion collaborator failed
    Completion(String),
    /// Configuration could not be loaded
    Config(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidTriggerRegex { .. } => ErrorKind::InvalidTriggerRegex,
            EngineError::InvalidOperationRegex { .. } => ErrorKind::InvalidOperationRegex,
            EngineError::MarkerProtocolViolation(_) => ErrorKind::MarkerProtocolViolation,
            EngineError::HistoryEmpty(_) => ErrorKind::HistoryEmpty,
            EngineError::Completion(_) => ErrorKind::Completion,
            EngineError::Config(_) => ErrorKind::Config,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::InvalidTriggerRegex { trigger, message } => {
                write!(f, "Invalid trigger '{}': {}", trigger, message)
            }
            EngineError::InvalidOperationRegex { trigger, message } => {
                write!(f, "Regex operation '{}' failed: {}", trigger, message)
            }
            EngineError::MarkerProtocolViolation(msg) => write!(f, "Marker protocol: {}", msg),
            EngineError::HistoryEmpty(what) => write!(f, "Nothing to {}", what),
            EngineError::Completion(msg) => write!(f, "Completion error: {}", msg),
            EngineError::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<EngineError> for String {
    fn from(err: EngineError) -> String {
        err.to_string()
    }
}
