//! PRESIGN CLI
//!
//! Resolves signed URLs for a resource manifest, or keeps them fresh in an
//! interactive session.

mod config;
mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use presign_cache::{project, CacheFacade, CacheScope, ManualVisibility};
use presign_core::error::PresignError;
use presign_core::types::{CachePhase, CacheStatus};
use presign_resolver::HttpBatchResolver;

use crate::config::{AppConfig, ConfigArgs};
use crate::manifest::load_manifest;

/// PRESIGN - batched, expiry-aware signed-URL cache
#[derive(Parser)]
#[command(name = "presign")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve every resource in a manifest once and print the URLs
    Resolve {
        /// Manifest file (JSON array of {key, path})
        #[arg(short, long)]
        manifest: PathBuf,
    },

    /// Keep a manifest's URLs fresh; reads commands from stdin
    Watch {
        /// Manifest file (JSON array of {key, path})
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    let cli = Cli::parse();
    let config = config.apply(&cli.config);

    // Initialize logging
    let filter = if cli.verbose {
        "presign=debug,info"
    } else {
        "presign=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Resolve { manifest } => cmd_resolve(&config, &manifest).await,
        Commands::Watch { manifest } => cmd_watch(&config, &manifest).await,
    }
}

/// Resolve a manifest once
async fn cmd_resolve(config: &AppConfig, manifest: &Path) -> Result<()> {
    let resources = load_manifest(manifest)?;
    debug!(manifest = %manifest.display(), resources = resources.len(), "Manifest loaded");
    let projection = project(&resources);
    println!(
        "{} {} key(s), {} distinct path(s)",
        "🔏 Resolving:".cyan().bold(),
        projection.len(),
        projection.paths().len()
    );

    let resolver = HttpBatchResolver::with_config(config.resolver_config()?)
        .context("Failed to create resolver")?;
    let cache_config = config.cache.clone().no_auto_refresh();
    let scope = CacheScope::open(cache_config, Arc::new(resolver), None)
        .await
        .context("Failed to open cache")?;
    info!(keys = projection.len(), "Cache scope opened");
    scope.set_resources(&resources).await;

    let facade = scope.facade();
    if let Some(err) = facade.error() {
        return Err(PresignError::from(err)).context("Resolution failed");
    }

    println!();
    for key in projection.keys() {
        let label = format!("{}:", key);
        match facade.get_url_for(key.as_str()) {
            Some(url) => println!("   {} {}", label.as_str().green(), url),
            None => println!("   {} {}", label.as_str().yellow(), "(no URL returned)".dimmed()),
        }
    }
    println!(
        "\n{} {}/{} resolved",
        "✅".green(),
        facade.loaded_count(),
        projection.len()
    );

    Ok(())
}

/// Interactive session over a live scope
async fn cmd_watch(config: &AppConfig, manifest: &Path) -> Result<()> {
    let resources = load_manifest(manifest)?;
    debug!(manifest = %manifest.display(), resources = resources.len(), "Manifest loaded");
    let resolver = HttpBatchResolver::with_config(config.resolver_config()?)
        .context("Failed to create resolver")?;
    let visibility = ManualVisibility::new(true);

    let scope = CacheScope::open(config.cache.clone(), Arc::new(resolver), Some(&visibility))
        .await
        .context("Failed to open cache")?;
    info!(auto_refresh = config.cache.auto_refresh_enabled, "Cache scope opened");
    let facade = scope.facade();
    let mut changes = facade.subscribe();

    println!("{}", "👀 Watching manifest".cyan().bold());
    println!(
        "   {}",
        "Commands: show, hide, refresh, reload, status, get <key>, quit".dimmed()
    );

    scope.set_resources(&resources).await;
    print_status(&facade.status());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match WatchCommand::parse(&line) {
                    Some(WatchCommand::Quit) => break,
                    Some(WatchCommand::Reload) => {
                        let resources = load_manifest(manifest)?;
                        info!(resources = resources.len(), "Manifest reloaded");
                        scope.set_resources(&resources).await;
                    }
                    Some(command) => run_command(command, &facade, &visibility).await,
                    None => println!("   {} {}", "Unknown command:".red(), line.trim()),
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = changes.borrow_and_update().clone();
                print_status(&status);
            }
        }
    }

    scope.close();
    info!("Cache scope closed");
    println!("{}", "👋 Stopped".dimmed());
    Ok(())
}

async fn run_command(command: WatchCommand, facade: &CacheFacade, visibility: &ManualVisibility) {
    match command {
        WatchCommand::Show => visibility.show(),
        WatchCommand::Hide => visibility.hide(),
        WatchCommand::Refresh => facade.refresh().await,
        WatchCommand::Status => print_status(&facade.status()),
        WatchCommand::Get(key) => {
            let label = format!("{}:", key);
            match facade.get_url_for(&key) {
                Some(url) if facade.is_usable(&key) => {
                    println!("   {} {}", label.as_str().green(), url)
                }
                Some(url) => {
                    println!("   {} {} {}", label.as_str().yellow(), url, "(expired)".red())
                }
                None => println!("   {} {}", label.as_str().yellow(), "(no URL)".dimmed()),
            }
        }
        WatchCommand::Reload | WatchCommand::Quit => {}
    }
}

fn print_status(status: &CacheStatus) {
    let phase = match status.phase {
        CachePhase::Empty => "empty".dimmed(),
        CachePhase::Resolving => "resolving".cyan(),
        CachePhase::Ready => "ready".green(),
        CachePhase::Stale => "stale".yellow(),
    };
    println!("   {} {} ({} URL(s))", "Status:".bold(), phase, status.count);
    if let Some(err) = &status.error {
        println!("   {} {}", "Last error:".red(), err);
    }
}

#[derive(Debug, PartialEq, Eq)]
enum WatchCommand {
    Show,
    Hide,
    Refresh,
    Reload,
    Status,
    Get(String),
    Quit,
}

impl WatchCommand {
    fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = match (words.next()?, words.next()) {
            ("show", None) => Self::Show,
            ("hide", None) => Self::Hide,
            ("refresh", None) => Self::Refresh,
            ("reload", None) => Self::Reload,
            ("status", None) => Self::Status,
            ("get", Some(key)) => Self::Get(key.to_string()),
            ("quit" | "exit", None) => Self::Quit,
            _ => return None,
        };
        if words.next().is_some() {
            return None;
        }
        Some(command)
    }
}
