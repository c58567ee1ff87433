//! CLI argument definitions
//!
//! All Clap derive structs for `raffler` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::config::schema::StoreKind;
use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Durable giveaway and tournament scheduler.
#[derive(Parser, Debug)]
#[command(name = "raffler", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "RAFFLER_COLOR")]
    pub color: ColorChoice,

    /// Log line format.
    #[arg(long, default_value = "human", global = true, env = "RAFFLER_LOG_FORMAT")]
    pub log_format: LogFormat,
}

// ============================================================================
// Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recover persisted entities and run the scheduler until interrupted.
    Run(RunArgs),

    /// Validate configuration files without starting anything.
    Validate(ValidateArgs),

    /// List entities persisted in a data directory.
    List(ListArgs),

    /// Run a one-off weighted draw.
    Draw(DrawArgs),

    /// Generate shell completion scripts.
    Completions(CompletionsArgs),

    /// Display version information.
    Version(VersionArgs),
}

/// Arguments for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "RAFFLER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the store backend.
    #[arg(long)]
    pub store: Option<StoreKind>,

    /// Override the file store's data directory.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Append lifecycle events (JSONL) to this file.
    #[arg(long, env = "RAFFLER_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on 127.0.0.1:<PORT>.
    #[arg(long, env = "RAFFLER_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Read JSONL commands (create, join, leave, cancel) from stdin and
    /// write one JSON reply per line to stdout.
    #[arg(long)]
    pub stdin: bool,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for `list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Data directory of a file store.
    #[arg(long, default_value = "./data", env = "RAFFLER_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

/// Arguments for `draw`.
#[derive(Args, Debug)]
pub struct DrawArgs {
    /// Entrant as `name` or `name=weight`; repeat for each entrant.
    #[arg(short, long = "entrant", required = true, value_parser = parse_entrant)]
    pub entrants: Vec<(String, u32)>,

    /// Number of winners to draw.
    #[arg(short, long, default_value_t = 1)]
    pub winners: usize,

    /// Seed for a reproducible draw.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

fn parse_entrant(raw: &str) -> Result<(String, u32), String> {
    let (name, weight) = match raw.split_once('=') {
        Some((name, weight)) => {
            let weight = weight
                .trim()
                .parse()
                .map_err(|_| format!("invalid weight in '{raw}'"))?;
            (name.trim(), weight)
        }
        None => (raw.trim(), 1),
    };
    if name.is_empty() {
        return Err(format!("missing entrant name in '{raw}'"));
    }
    Ok((name.to_string(), weight))
}

/// Arguments for shell completion generation.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell for completion script.
    pub shell: Shell,
}

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

/// Shell type for completion generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell.
    Bash,
    /// Zsh shell.
    Zsh,
    /// Fish shell.
    Fish,
    /// `PowerShell`.
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell.
    Elvish,
}

// ============================================================================
// Tests
// ============================================================================
