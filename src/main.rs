use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use voxedit::render::Renderer;
use voxedit::{Config, DocumentState, EditSession, Outcome, RuleSet};

#[derive(Parser)]
#[command(name = "voxedit", version, about = "Command-driven dictation editor")]
struct Cli {
    /// Config file (default: ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Rule file, overrides `rules_path`
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Document to edit; loaded at start and saved on exit
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Interactive console: every line is a finished utterance
    Repl,
    /// Parse the rule file and list rules and warnings
    Check,
    /// Apply utterances to a text and print the result
    Apply {
        /// Starting text, caret at the end
        #[arg(long, default_value = "")]
        text: String,
        utterances: Vec<String>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = load_config(&cli)?;

    match cli.command.unwrap_or(Mode::Repl) {
        Mode::Repl => run_repl(&config),
        Mode::Check => run_check(&config),
        Mode::Apply { text, utterances } => run_apply(&config, &text, &utterances),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if let Some(rules) = &cli.rules {
        config.rules_path = Some(rules.display().to_string());
    }
    if let Some(file) = &cli.file {
        config.document_path = Some(file.display().to_string());
    }
    Ok(config)
}

fn run_check(config: &Config) -> Result<ExitCode> {
    let rules = RuleSet::parse(&config.rules_text()?);

    for rule in rules.iter() {
        let marker = if rule.is_matchable() { ' ' } else { '!' };
        println!(
            "{:>4}{} {:<12} {}",
            rule.line,
            marker,
            rule.kind.label(),
            rule.trigger
        );
    }

    if rules.warnings().is_empty() {
        println!("{} rules, no warnings", rules.len());
        return Ok(ExitCode::SUCCESS);
    }

    for warning in rules.warnings() {
        eprintln!("warning: {}", warning);
    }
    eprintln!("{} rules, {} warnings", rules.len(), rules.warnings().len());
    Ok(ExitCode::FAILURE)
}

fn run_apply(config: &Config, text: &str, utterances: &[String]) -> Result<ExitCode> {
    let mut session = EditSession::from_config(config, None)?;
    session.replace_document(DocumentState::with_caret_at_end(text), true);

    for utterance in utterances {
        let outcome = session.handle_utterance(utterance, true)?;
        follow_up(&mut session, outcome)?;
        session.begin_segment();
    }

    println!("{}", session.snapshot());
    Ok(ExitCode::SUCCESS)
}

fn run_repl(config: &Config) -> Result<ExitCode> {
    let document_path = config.document_path.as_ref().map(PathBuf::from);
    let stored = match &document_path {
        Some(path) if path.exists() => Some(
            fs::read_to_string(path)
                .with_context(|| format!("reading document {}", path.display()))?,
        ),
        _ => None,
    };

    let mut session = EditSession::from_config(config, stored.as_deref())?;
    for warning in session.rules().warnings() {
        log::warn!("rules {}", warning);
    }
    let renderer = Renderer::new(&config.ui);

    println!("voxedit: type utterances, :help for console commands");
    renderer.draw(&session, &Outcome::Unchanged)?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;

        let result = match line.trim() {
            ":quit" | ":q" => break,
            ":help" => {
                print_help();
                continue;
            }
            ":listen" => {
                session.start_listening();
                Ok(Outcome::Unchanged)
            }
            ":segment" => {
                session.begin_segment();
                Ok(Outcome::Unchanged)
            }
            ":reload" => reload_rules(&mut session, config).map(|_| Outcome::Unchanged),
            other => match other.strip_prefix(":interim ") {
                Some(text) => session
                    .handle_utterance(text, false)
                    .and_then(|outcome| follow_up(&mut session, outcome)),
                None => {
                    let result = session
                        .handle_utterance(other, true)
                        .and_then(|outcome| follow_up(&mut session, outcome));
                    // a typed line is a finished segment
                    session.begin_segment();
                    result
                }
            },
        };

        match result {
            Ok(outcome) => renderer.draw(&session, &outcome)?,
            Err(e) => eprintln!("{}", e),
        }
        io::stdout().flush().ok();
    }

    if let Some(path) = &document_path {
        save_document(path, &session)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Run the text a `process` trigger handed back; there is no completion backend here
fn follow_up(session: &mut EditSession, outcome: Outcome) -> Result<Outcome, voxedit::EngineError> {
    match outcome {
        Outcome::Process(text) => session.process_text(&text),
        Outcome::Execute(instruction) => {
            log::warn!("no completion service configured, dropping: {:?}", instruction);
            Ok(Outcome::Execute(instruction))
        }
        other => Ok(other),
    }
}

fn reload_rules(session: &mut EditSession, config: &Config) -> Result<(), voxedit::EngineError> {
    let text = config.rules_text()?;
    let rules = session.reload_rules(&text);
    for warning in rules.warnings() {
        log::warn!("rules {}", warning);
    }
    Ok(())
}

fn save_document(path: &Path, session: &EditSession) -> Result<()> {
    fs::write(path, session.document().parked())
        .with_context(|| format!("saving document {}", path.display()))?;
    log::info!("saved {}", path.display());
    Ok(())
}

fn print_help() {
    println!("  <text>           finished utterance");
    println!("  :interim <text>  interim (partial) utterance");
    println!("  :segment         start a new recognition segment");
    println!("  :listen          resume listening after stop");
    println!("  :reload          reload the rule file");
    println!("  :quit            save and exit");
}
