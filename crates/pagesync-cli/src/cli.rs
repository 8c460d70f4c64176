//! Argument parsing for the `pagesync` binary.
//!
//! The tool runs one sync pass per invocation, so there are no subcommands.
//! Credentials come from the environment (see `pagesync_core::Config`); the
//! flags here only adjust logging and the local scratch directory.

use clap::Parser;
use std::path::PathBuf;

/// Sync published pages from a document database into an object-storage
/// content cache.
#[derive(Parser, Clone, Debug)]
#[command(name = "pagesync")]
#[command(version)]
#[command(about = "Mirror published pages into an S3-compatible content cache", long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Enable verbose logging output
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Suppress progress bars and informational messages (only show warnings)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Show debug-level logs, including per-request detail
    #[arg(long)]
    pub debug: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Local write-through cache directory. Also via `PAGESYNC_TMP_DIR`.
    #[arg(long = "tmp-dir", value_name = "DIR")]
    pub tmp_dir: Option<PathBuf>,
}
