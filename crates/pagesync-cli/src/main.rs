//! pagesync - mirror published pages into an object-storage content cache
//!
//! One invocation runs one full sync pass: load the cached bundle manifest,
//! list the currently published pages, re-fetch the stale ones, and upload
//! the rebuilt bundles. Designed to run as a CI build step.

use anyhow::{Context, Result};
use clap::Parser;
use pagesync_core::{
    AdmissionQueue, API_RATE_PERMITS, API_RATE_WINDOW, CacheStore, Config, NotionClient, S3Store,
    Syncer,
};
use tracing::{Level, warn};
use tracing_subscriber::FmtSubscriber;

mod cli;
mod progress;

use cli::Cli;
use progress::TerminalProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let mut config = Config::from_env().context("incomplete configuration")?;
    if let Some(dir) = &cli.tmp_dir {
        config.tmp_dir.clone_from(dir);
    }

    let report = run_sync(&cli, &config).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}

fn initialize_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

async fn run_sync(cli: &Cli, config: &Config) -> Result<pagesync_core::SyncReport> {
    let api = NotionClient::new(&config.api_secret)?;
    let store = S3Store::new(
        &config.storage_endpoint,
        &config.bucket,
        &config.storage_access_key,
        &config.storage_secret_key,
    )?;
    let queue = AdmissionQueue::new(API_RATE_PERMITS, API_RATE_WINDOW);
    let cache = CacheStore::new(&store, &config.tmp_dir)
        .with_context(|| format!("cannot prepare cache dir {}", config.tmp_dir.display()))?;

    let progress = TerminalProgress::new(cli.quiet || cli.json);
    let report = Syncer::new(&api, cache, &queue, &config.database_id)
        .run(&progress)
        .await?;

    if report.skipped > 0 {
        warn!(
            skipped = report.skipped,
            "some pages could not be fetched and will be retried next run"
        );
    }

    Ok(report)
}
