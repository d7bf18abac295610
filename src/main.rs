//! mediafeed - Fetch recent media posts for a user
//!
//! Runs one aggregation request against the primary provider, falling back to
//! the secondary provider, and prints the result as text or JSON.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use mediafeed::backup::{BackupDispatcher, LogArchiver, DEFAULT_QUEUE_CAPACITY};
use mediafeed::cli::{Cli, OutputFormat};
use mediafeed::config::Config;
use mediafeed::engine::{AggregationEngine, FetchReport};
use mediafeed::fallback::CancelFlag;

/// Longest post text shown in text output
const TEXT_PREVIEW_CHARS: usize = 80;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mediafeed=info"));

    // stdout carries the results, so logs go to stderr
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_text(username: &str, report: &FetchReport) {
    let data = &report.data;
    println!(
        "@{}: {} posts, {} media (from {})",
        username.trim().trim_start_matches('@'),
        data.len(),
        data.media_count(),
        report.served_from
    );

    for post in data.iter() {
        let text: String = post.text().chars().take(TEXT_PREVIEW_CHARS).collect();
        let text = text.replace('\n', " ");
        println!();
        println!("{}  {}", post.id(), post.created_at().unwrap_or("-"));
        if !text.is_empty() {
            println!("  {}", text);
        }
        for media in post.media() {
            println!("  [{}] {}", media.kind, media.display_url().unwrap_or("-"));
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let format = cli.output_format()?;
    let config = Config::from_env()?;

    let mut engine = AggregationEngine::from_config(&config)?;
    if !cli.no_backup {
        engine = engine.with_backup(BackupDispatcher::spawn(
            Arc::new(LogArchiver),
            DEFAULT_QUEUE_CAPACITY,
        ));
    }

    let cancel = CancelFlag::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - finishing current provider call");
                cancel.cancel();
            }
        }
    });

    let result = engine
        .fetch_media_detailed(&cli.username, cli.max_results, &cancel)
        .await;
    engine.shutdown().await;
    let report = result?;

    match format {
        OutputFormat::Text => print_text(&cli.username, &report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report.data.as_ref())?),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("Command failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
