//! Command-line interface for ocrelay
//!
//! Provides argument parsing using clap derive macros.

use crate::ocr::EngineKind;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;
use std::time::Duration;

/// Relay Telegram channel posts, reading text out of screenshots
#[derive(Parser, Debug)]
#[command(
    name = "ocrelay",
    version,
    about = "Relay Telegram channel posts, reading text out of screenshots"
)]
pub struct Cli {
    /// Subcommand to execute (default: run)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose logging (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// OCR backend override
    #[arg(long, global = true, value_enum, value_name = "BACKEND")]
    pub backend: Option<Backend>,

    /// Per-attempt OCR timeout override. Examples: 10s, 1m, 1500ms
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration)]
    pub ocr_timeout: Option<Duration>,
}

/// OCR backend as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Local,
    Remote,
}

impl From<Backend> for EngineKind {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Local => EngineKind::Local,
            Backend::Remote => EngineKind::Remote,
        }
    }
}

/// Parse a duration string.
///
/// Supports bare numbers (seconds) and anything `humantime` accepts:
/// single-unit (`30s`, `500ms`) and compound (`1m30s`).
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Relay posts from the configured channel until interrupted
    Run {
        /// Print decisions to stdout instead of sending them to the sink chat
        #[arg(long)]
        stdout: bool,
    },

    /// Transform, recognize and normalize one local image
    Scan {
        /// Image file to process
        image: PathBuf,

        /// Write the processed (cropped, filtered) image here
        #[arg(long, value_name = "PATH")]
        save_processed: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration and probe the OCR backend and bot credentials
    Check,

    /// View and create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration management actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Print the effective configuration (file + environment) as TOML
    Show,
    /// Write the default configuration to the config path
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
