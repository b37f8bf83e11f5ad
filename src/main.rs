use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use ocrelay::app::{build_engine, run_relay, scan_image};
use ocrelay::cli::{Cli, Commands, ConfigAction};
use ocrelay::config::Config;
use ocrelay::diagnostics::{print_checks, run_checks};
use ocrelay::source::EnvCredentials;
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    match cli.command {
        None => {
            let config = load_config(&cli)?;
            relay(&config, false).await?;
        }
        Some(Commands::Run { stdout }) => {
            let config = load_config(&cli)?;
            relay(&config, stdout).await?;
        }
        Some(Commands::Scan {
            ref image,
            ref save_processed,
            json,
        }) => {
            let config = load_config(&cli)?;
            scan(&config, image, save_processed.as_deref(), json).await?;
        }
        Some(Commands::Check) => {
            let config = load_config(&cli)?;
            let checks = run_checks(&config, &EnvCredentials::default()).await;
            if !print_checks(&checks) {
                std::process::exit(1);
            }
        }
        Some(Commands::Config { ref action }) => {
            handle_config_command(action, &cli)?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "ocrelay", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Initialise tracing on stderr.
///
/// `RUST_LOG` wins over `-v`; stdout stays free for `scan` and the stdout sink.
fn init_tracing(verbose: u8, json_logs: bool) {
    let level = match verbose {
        0 => "ocrelay=info",
        1 => "ocrelay=debug",
        _ => "ocrelay=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn config_path(cli: &Cli) -> PathBuf {
    cli.config.clone().unwrap_or_else(Config::default_path)
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/ocrelay/config.toml)
/// 3. Built-in defaults
///
/// Environment overrides, then CLI overrides, are applied on top.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match cli.config {
        Some(ref path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    config = config.with_env_overrides();

    if let Some(backend) = cli.backend {
        config.ocr.backend = backend.into();
    }
    if let Some(timeout) = cli.ocr_timeout {
        config.ocr.timeout_secs = timeout.as_secs().max(1);
    }
    Ok(config)
}

async fn relay(config: &Config, force_stdout: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            on_signal.cancel();
        }
    });

    let summary = run_relay(config, &EnvCredentials::default(), force_stdout, cancel).await?;
    eprintln!("{}", format!("✓ {summary}").green());
    Ok(())
}

async fn scan(config: &Config, image: &Path, save_processed: Option<&Path>, json: bool) -> Result<()> {
    let engine = build_engine(config).await?;
    let report = scan_image(config, engine.as_ref(), image, save_processed).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("  {}      {} {}x{}", "Image:".dimmed(), report.mime_type, report.width, report.height);
    if let (Some(w), Some(h)) = (report.processed_width, report.processed_height) {
        println!("  {}  {}x{}", "Processed:".dimmed(), w, h);
    }
    println!("  {}     {}", "Engine:".dimmed(), report.engine);
    if let Some(ref raw) = report.raw_text {
        println!("  {}   {:?}", "Raw text:".dimmed(), raw);
    }
    if let Some(ref text) = report.normalized_text {
        println!("  {} {:?}", "Normalized:".dimmed(), text);
    }
    println!("  {}   {}", "Decision:".dimmed(), report.decision.green());
    if let Some(ref error) = report.error {
        println!("  {}      {}", "Error:".dimmed(), error.yellow());
    }
    Ok(())
}

fn handle_config_command(action: &ConfigAction, cli: &Cli) -> Result<()> {
    let path = config_path(cli);
    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(cli)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                eprintln!(
                    "{}",
                    format!("{} already exists (use --force to overwrite)", path.display()).red()
                );
                std::process::exit(1);
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, Config::default().to_toml()?)?;
            println!("{}", format!("Wrote {}", path.display()).green());
        }
    }
    Ok(())
}
