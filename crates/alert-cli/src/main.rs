mod cmd;
mod output;

use alert_core::config::STORE_ADDRESS_ENV;
use alert_core::AlertConfig;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "alert-worker",
    about = "Leader-only alert dispatch to TTS and email actuators",
    version,
    propagate_version = true
)]
struct Cli {
    /// YAML config file (default: built-in defaults)
    #[arg(long, short = 'c', global = true, env = "ALERT_CONFIG")]
    config: Option<PathBuf>,

    /// Backing store address (overrides the config file)
    #[arg(long, global = true, env = STORE_ADDRESS_ENV)]
    store_addr: Option<String>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resolved configuration
    Config,

    /// Decode one notification file (YAML or JSON) into an alert record
    Decode { file: PathBuf },

    /// Run a scripted scenario against an in-process store and report the writes
    Replay { scenario: PathBuf },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = resolve_config(&cli).and_then(|config| match &cli.command {
        Commands::Config => cmd::config::run(&config, cli.json),
        Commands::Decode { file } => cmd::decode::run(&config, file, cli.json),
        Commands::Replay { scenario } => cmd::replay::run(&config, scenario, cli.json),
    });

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn resolve_config(cli: &Cli) -> anyhow::Result<AlertConfig> {
    let config = AlertConfig::load_or_default(cli.config.as_deref()).with_context(|| {
        match &cli.config {
            Some(p) => format!("failed to load config {}", p.display()),
            None => "failed to build default config".to_string(),
        }
    })?;
    Ok(config.with_store_address(cli.store_addr.as_deref()))
}
