use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use linkpool::link::LinkMetadata;
use linkpool::preview::LinkPreviewer;
use log::{LevelFilter, info};
use std::fs;
use std::path::PathBuf;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("linkpool")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("linkpool.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // Open filter until the configured level is known; RUST_LOG still wins
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace"))
        .target(env_logger::Target::Pipe(target))
        .init();
    if std::env::var_os("RUST_LOG").is_none() {
        log::set_max_level(LevelFilter::Info);
    }

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn apply_log_level(config: &Config) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    match config.log_level.as_deref().map(parse_log_level) {
        Some(Ok(filter)) => {
            log::set_max_level(filter);
            info!("Log level set to {}", filter);
        }
        Some(Err(level)) => log::warn!("Ignoring unknown log level {:?}", level),
        None => {}
    }
}

fn parse_log_level(level: &str) -> std::result::Result<LevelFilter, String> {
    level.trim().parse::<LevelFilter>().map_err(|_| level.to_string())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Fetch {
            urls,
            concurrency,
            json,
        } => handle_fetch_command(urls, *concurrency, *json, cli.is_verbose(), config).await,
    }
}

async fn handle_fetch_command(
    urls: &[String],
    concurrency: Option<usize>,
    json: bool,
    verbose: bool,
    config: &Config,
) -> Result<()> {
    let mut pool = config.pool.clone();
    if let Some(n) = concurrency {
        pool.max_concurrency = n;
    }
    info!("Fetching {} url(s) with concurrency {}", urls.len(), pool.max_concurrency);

    let previewer =
        LinkPreviewer::new(pool, config.http.clone(), &config.cache).context("Failed to build link previewer")?;

    let results = futures::future::join_all(urls.iter().map(|url| previewer.preview(url))).await;

    let mut resolved: Vec<(&String, Option<LinkMetadata>)> = Vec::with_capacity(urls.len());
    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok(metadata) => resolved.push((url, metadata)),
            Err(e) => {
                log::warn!("Skipping {}: {}", url, e);
                eprintln!("{} {}: {}", "Skipped:".red(), url, e);
            }
        }
    }

    if json {
        let entries: Vec<_> = resolved
            .iter()
            .map(|(url, metadata)| serde_json::json!({ "url": url, "metadata": metadata }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (url, metadata) in &resolved {
            print_metadata(url, metadata.as_ref());
        }
    }

    if verbose {
        let snapshot = previewer.snapshot().await?;
        println!("{} {}", "Pool stats:".cyan(), serde_json::to_string(&snapshot.stats)?);
    }

    previewer.shutdown().await?;
    Ok(())
}

fn print_metadata(url: &str, metadata: Option<&LinkMetadata>) {
    match metadata {
        Some(m) => {
            println!("{} {}", "OK".green(), url);
            if m.final_url != m.url {
                println!("  redirected to: {}", m.final_url);
            }
            println!("  status: {}", m.status);
            println!("  content-type: {}", m.content_type.as_deref().unwrap_or("-"));
            if let Some(len) = m.content_length {
                println!("  content-length: {}", len);
            }
        }
        None => println!("{} {} (no preview available)", "--".yellow(), url),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    apply_log_level(&config);

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
