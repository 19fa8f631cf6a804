//! Copiloto - Main Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use copiloto::{init_logging, Replayer};
use session::EngineConfig;
use std::path::PathBuf;
use storage::Repository;
use tokio::io::{AsyncRead, BufReader};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "copiloto", version, about = "Identity and fatigue engine replay runner")]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "COPILOTO_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-lines replay stream; stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Repository snapshot, loaded at start if present and written at exit
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging)?;

    info!("=== Copiloto v{} ===", env!("CARGO_PKG_VERSION"));

    let repository = match &args.snapshot {
        Some(path) if path.exists() => Repository::load_snapshot(path)?,
        _ => Repository::new(),
    };
    let mut replayer = Replayer::new(config, repository)?;

    let reader: Box<dyn AsyncRead + Unpin> = match &args.input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    let mut stdout = std::io::stdout();
    let processed = replayer.run(BufReader::new(reader), &mut stdout).await?;
    info!("Replayed {} records", processed);

    if let Some(path) = &args.snapshot {
        replayer.into_repository().save_snapshot(path)?;
    }
    Ok(())
}
