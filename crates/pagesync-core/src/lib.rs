//! # pagesync-core
//!
//! Core functionality for pagesync - a one-shot synchronizer that mirrors
//! published Notion pages into an S3-compatible object-storage cache, so a
//! static site build can read pre-fetched JSON instead of hitting the live
//! API.
//!
//! ## Architecture
//!
//! One run executes a fixed pipeline:
//!
//! 1. load previously cached page bundles from object storage,
//! 2. list published pages from the document database,
//! 3. diff the two sets by page id and last-edited timestamp,
//! 4. recursively fetch the block tree of each stale page, and
//! 5. write each rebuilt bundle to local disk and object storage.
//!
//! The document API and object store are reached through the [`DocumentApi`]
//! and [`ObjectStore`] traits so tests can substitute in-memory fakes. All
//! API calls share one [`AdmissionQueue`] (a fixed-window rate limiter) and a
//! fixed-budget retry wrapper with no backoff.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pagesync_core::{
//!     AdmissionQueue, CacheStore, Config, NoProgress, NotionClient, S3Store, Syncer,
//!     API_RATE_PERMITS, API_RATE_WINDOW,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let api = NotionClient::new(&config.api_secret)?;
//! let store = S3Store::new(
//!     &config.storage_endpoint,
//!     &config.bucket,
//!     &config.storage_access_key,
//!     &config.storage_secret_key,
//! )?;
//! let queue = AdmissionQueue::new(API_RATE_PERMITS, API_RATE_WINDOW);
//! let cache = CacheStore::new(&store, &config.tmp_dir)?;
//!
//! let report = Syncer::new(&api, cache, &queue, &config.database_id)
//!     .run(&NoProgress)
//!     .await?;
//! println!("synced {} of {} stale pages", report.synced, report.stale);
//! # Ok(())
//! # }
//! ```

/// Write-through bundle cache over local disk and object storage
pub mod cache;
/// Environment-sourced configuration
pub mod config;
/// Staleness filter comparing live pages to cached bundles
pub mod diff;
/// Error types and result alias
pub mod error;
/// Recursive block tree retrieval
pub mod fetch;
/// Document API client and trait
pub mod notion;
/// Fixed-window admission queue for API rate limiting
pub mod queue;
/// Fixed-budget retry wrapper
pub mod retry;
/// Object storage client and trait
pub mod store;
/// The sync pipeline orchestrator
pub mod sync;
/// Core data types
pub mod types;

// Re-export commonly used types
pub use cache::CacheStore;
pub use config::{API_RATE_PERMITS, API_RATE_WINDOW, Config, RETRY_BUDGET};
pub use diff::stale_pages;
pub use error::{Error, Result};
pub use fetch::BlockFetcher;
pub use notion::{ChildrenPage, DocumentApi, NotionClient, QueryPage};
pub use queue::AdmissionQueue;
pub use retry::retry;
pub use store::{ListPage, ObjectStore, S3Store};
pub use sync::{NoProgress, Progress, SyncReport, Syncer};
pub use types::*;
