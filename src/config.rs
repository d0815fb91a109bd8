use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::history::MAX_HISTORY;

/// Rule file used when no `rules_path` is configured
pub const DEFAULT_RULES: &str = r#"1. Commands (start with #)
process=#process
execute=#execute
undo=#undo
redo=#redo
stop=#stop
discard=#discard

2. Substitutions
period|full stop=.
colon=:
semicolon=;
exclamation mark=!
question mark=?
comma=,
new line|enter|new paragraph=\n
(smile|smiling|smiley) emoji=🙂
heart emoji=❤️
laughing emoji=😂
crying emoji=😭
(like|thumbs up) emoji=👍
dislike emoji=👎
angry emoji=😠
sad emoji=😢
happy emoji=😊
url=https://
(open|left) (parenthesis|parents)=(
(close|right) (parenthesis|parents)=)
double quote="
single quote='

3. Regex Operations (trigger=match_regex:::replacement)
# Use 🅰️ for Cursor Start and 🅱️ for Cursor End
space=🅰️[\s\S]*?🅱️::: 🅰️🅱️
# Deletes the word immediately before the cursor/selection
delete|backspace=(\S+\s*)?🅰️[\s\S]*?🅱️:::🅰️🅱️
# Deletes the sentence segment immediately before the cursor
sentence delete=[^.!?]+[.!?]*\s*🅰️[\s\S]*?🅱️:::🅰️🅱️
# Deletes selection
selection delete=🅰️[\s\S]*?🅱️:::🅰️🅱️
# Clears the entire document
clear all=[\s\S]*:::🅰️🅱️
# Clear spaces before cursor
clear space=[ \t]*🅰️([\s\S]*?)🅱️[ \t]*:::🅰️$1🅱️

# Move Up (to start of previous line)
move up=(^|[\s\S]*\n)([^\n]*)\n([^\n]*)🅰️([\s\S]*?)🅱️([^\n]*)([\s\S]*):::$1🅰️🅱️$2\n$3$4$5$6
# Move Down (to start of next line)
move down=(^|[\s\S]*\n)([^\n]*)🅰️([\s\S]*?)🅱️([^\n]*)\n([^\n]*)([\s\S]*):::$1$2$3$4\n🅰️🅱️$5$6
# Move to Start of Line
move to start( of line)?=(^|[\s\S]*\n)([^\n]*)🅰️([\s\S]*?)🅱️([\s\S]*):::$1🅰️🅱️$2$3$4
# Move to End of Line
move to end( of line)?=(^|[\s\S]*\n)([^\n]*)🅰️([\s\S]*?)🅱️([^\n]*)([\s\S]*):::$1$2$3$4🅰️🅱️$5
# Move to Top (Start of Text)
move to top=^([\s\S]*)🅰️([\s\S]*?)🅱️([\s\S]*)$:::🅰️🅱️$1$2$3
# Move to Bottom (End of Text)
move to bottom=^([\s\S]*)🅰️([\s\S]*?)🅱️([\s\S]*)$:::$1$2$3🅰️🅱️
"#;

/// Instruction prefix handed to the completion service
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful text editing assistant.
The user will provide text containing two cursor markers:
🅰️ (start of selection/cursor) and 🅱️ (end of selection/cursor).
If 🅰️ and 🅱️ are adjacent, it represents a caret position. If they surround text, it represents a selection.
Your task is to follow the user's instruction to modify the text.
Return ONLY the fully updated text content. Do not include any explanations or markdown formatting unless requested.
By default, any new text should be inserted at a cursor position, replacing the selected text if any is selected.
Your output should include the cursor position and selection, i.e. the special characters 🅰️ and 🅱️. In case you just inserted text,
by default the cursor should be at the end of the newly inserted text with nothing selected.

USER_INSTRUCTION:
";

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Rule file in the numbered-section format; built-in rules when unset
    #[serde(default)]
    pub rules_path: Option<String>,
    /// Document loaded at start and saved on exit
    #[serde(default)]
    pub document_path: Option<String>,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

// ============================================================================
// History Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryConfig {
    /// Number of snapshots kept for undo/redo
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

fn default_history_capacity() -> usize {
    MAX_HISTORY
}

// ============================================================================
// Interaction Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct InteractionConfig {
    /// Insert unmatched utterances right away instead of waiting for `process`
    #[serde(default = "default_auto_process")]
    pub auto_process: bool,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            auto_process: default_auto_process(),
        }
    }
}

fn default_auto_process() -> bool {
    true
}

// ============================================================================
// Completion Config
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CompletionConfig {
    /// Prompt prepended to every instruction
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.into()
}

// ============================================================================
// UI Config
// ============================================================================

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Yellow,
    Green,
    Cyan,
    Magenta,
    /// No highlighting
    None,
}

#[derive(Debug, Deserialize)]
pub struct UiConfig {
    /// Colour used for the span changed by the last edit
    #[serde(default)]
    pub highlight: HighlightColor,
    /// Draw the caret symbol inside the rendered buffer
    #[serde(default = "default_show_caret")]
    pub show_caret: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            highlight: HighlightColor::default(),
            show_caret: default_show_caret(),
        }
    }
}

fn default_show_caret() -> bool {
    true
}

/// Expand ${VAR} to environment variable values
fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_else(|_| {
                log::warn!("Environment variable '{}' not found", var_name);
                String::new()
            });
            result.replace_range(start..start + end + 1, &value);
        } else {
            break;
        }
    }

    result
}

impl Config {
    /// Load `config.toml` from the working directory, falling back to defaults
    pub fn load() -> Self {
        let path = Path::new("config.toml");
        if !path.exists() {
            return Config::default();
        }
        Self::load_from(path).unwrap_or_else(|e| {
            log::warn!("{}, using defaults", e);
            Config::default()
        })
    }

    /// Load a specific config file
    pub fn load_from(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config: Config = toml::from_str(&text)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        config.resolve_paths();
        Ok(config)
    }

    /// Expand `${VAR}` in configured paths
    pub fn resolve_paths(&mut self) {
        if let Some(path) = &mut self.rules_path {
            *path = expand_env_vars(path);
        }
        if let Some(path) = &mut self.document_path {
            *path = expand_env_vars(path);
        }
    }

    pub fn rules_path(&self) -> Option<PathBuf> {
        self.rules_path.as_ref().map(PathBuf::from)
    }

    /// Rule file text: the configured file, or the built-in rules
    pub fn rules_text(&self) -> Result<String, EngineError> {
        match self.rules_path() {
            Some(path) => fs::read_to_string(&path)
                .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e))),
            None => Ok(DEFAULT_RULES.to_string()),
        }
    }
}
