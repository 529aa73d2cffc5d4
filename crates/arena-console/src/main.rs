//! # arena
//!
//! Console binary: loads settings, installs logging, runs any `--exec`
//! commands, then reads commands from stdin until `exit` or end of input.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use arena_console::{Console, Flow, GREETING, Printer, logging};
use arena_settings::{ConsoleSettings, load_settings, load_settings_from_path, settings_path};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive console for the arena game server.
#[derive(Parser, Debug)]
#[command(name = "arena", about = "Interactive console for the arena game server")]
struct Cli {
    /// Game server base URL (overrides settings).
    #[arg(long)]
    server_url: Option<String>,

    /// Settings file (defaults to `~/.arena/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// Reply timeout for server exchanges, in milliseconds.
    #[arg(long)]
    exchange_timeout_ms: Option<u64>,

    /// Command to run before the interactive loop (repeatable).
    #[arg(long = "exec", value_name = "COMMAND")]
    exec: Vec<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<ConsoleSettings> {
        let mut settings = match &self.settings {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => load_settings().with_context(|| {
                format!("Failed to load settings from {}", settings_path().display())
            })?,
        };

        if let Some(url) = &self.server_url {
            settings.server.base_url.clone_from(url);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(ms) = self.exchange_timeout_ms {
            settings.channel.exchange_timeout_ms = ms;
        }
        settings.validate();
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    logging::init_subscriber(&settings.logging.level);
    tracing::info!(server = %settings.server.base_url, "starting console");

    let out = Printer::stdout();
    let mut console = Console::new(settings, out.clone());
    out.line(GREETING);

    let mut flow = Flow::Continue;
    for command in &cli.exec {
        flow = console.execute(command).await;
        if flow != Flow::Continue {
            break;
        }
    }

    if flow == Flow::Continue {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            out.prompt("> ");
            let line = tokio::select! {
                line = lines.next_line() => line.context("Failed to read stdin")?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else { break };
            flow = console.execute(&line).await;
            if flow != Flow::Continue {
                break;
            }
        }
    }

    if flow == Flow::Kill {
        // Channel already aborted.
        std::process::exit(0);
    }
    console.shutdown().await;
    Ok(())
}
