//! filebridge - Main CLI Entry Point

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use filebridge::{
    cli::{Args, Commands, Config},
    streaming::CompletionClient,
    telemetry::init_tracing,
    FileBridge,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_args(&args)
        .context("Invalid configuration")?;

    match args.command {
        Some(Commands::Config) => show_config(&config),
        Some(Commands::Check) => run_check(&config).await,
        None => run_bridge(config).await,
    }
}

/// Watch the request file until interrupted
async fn run_bridge(config: Config) -> Result<()> {
    init_tracing(&config.logging.level)?;

    let client = CompletionClient::with_settings(config.client_settings())
        .context("Failed to create HTTP client")?;

    let bridge = FileBridge::new(config.mailbox(), Arc::new(client))
        .with_settings(config.bridge_settings());

    bridge.serve().await?;
    Ok(())
}

/// Probe the completion server
async fn run_check(config: &Config) -> Result<()> {
    let client = CompletionClient::with_settings(config.client_settings())
        .context("Failed to create HTTP client")?;

    println!("Endpoint: {}", config.service.endpoint);

    if !client.health_check().await? {
        println!("{} {} is not answering", "✗".red(), client.models_url());
        bail!("Completion server not reachable");
    }
    println!("{} Server is reachable", "✓".green());

    match client.list_models().await {
        Ok(models) if models.is_empty() => {
            println!("{} No models reported", "!".yellow());
        }
        Ok(models) => {
            println!("Models:");
            for model in models {
                println!("  • {}", model);
            }
        }
        Err(e) => println!("{} Could not list models: {}", "!".yellow(), e),
    }

    Ok(())
}

/// Print the effective configuration as TOML
fn show_config(config: &Config) -> Result<()> {
    if let Some(path) = Config::default_path() {
        println!("# default location: {}", path.display());
    }
    println!("{}", config.to_toml()?);
    Ok(())
}
