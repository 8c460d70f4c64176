//! Environment-sourced configuration for a sync run.
//!
//! The tool is configured entirely through environment variables, the way a
//! CI build step would pass credentials. [`Config::from_env`] validates all
//! required variables up front so a missing credential fails the run with a
//! named variable instead of an opaque client error mid-pipeline.
//!
//! Required variables:
//!
//! - `NOTION_API_SECRET` — document API credential
//! - `DATABASE_ID` — database to list published pages from
//! - `S3_ENDPOINT` — object storage endpoint (S3-compatible, e.g. R2)
//! - `S3_ACCESS_KEY_ID` / `S3_SECRET_ACCESS_KEY` — storage credentials
//! - `CACHE_BUCKET` — bucket holding the page bundles
//!
//! Optional:
//!
//! - `PAGESYNC_TMP_DIR` — local write-through cache directory (default `tmp`)

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Document API request limit: permits per admission window.
///
/// Matches the API's published limit of an average of three requests per
/// second.
pub const API_RATE_PERMITS: usize = 3;

/// Length of one admission window.
pub const API_RATE_WINDOW: Duration = Duration::from_secs(1);

/// Remaining-attempts budget handed to the retry wrapper for API calls.
pub const RETRY_BUDGET: u32 = 3;

/// Configuration for one sync run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Document API credential.
    pub api_secret: String,
    /// Database to query for published pages.
    pub database_id: String,
    /// Object storage endpoint URL.
    pub storage_endpoint: String,
    /// Object storage access key id.
    pub storage_access_key: String,
    /// Object storage secret access key.
    pub storage_secret_key: String,
    /// Bucket name for cached bundles.
    pub bucket: String,
    /// Local write-through cache directory.
    pub tmp_dir: PathBuf,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_secret: required("NOTION_API_SECRET")?,
            database_id: required("DATABASE_ID")?,
            storage_endpoint: required("S3_ENDPOINT")?,
            storage_access_key: required("S3_ACCESS_KEY_ID")?,
            storage_secret_key: required("S3_SECRET_ACCESS_KEY")?,
            bucket: required("CACHE_BUCKET")?,
            tmp_dir: std::env::var("PAGESYNC_TMP_DIR")
                .map_or_else(|_| PathBuf::from("tmp"), PathBuf::from),
        })
    }
}

fn required(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!("{name} is not set"))),
    }
}
