use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "oxiload",
    version,
    about = "Load images through an in-memory decoded image cache",
    long_about = None
)]
pub struct CliArgs {
    /// Image URLs to load.
    #[arg(value_name = "URL", required = true)]
    pub urls: Vec<String>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Maximum number of cached images (0 = unbounded).
    #[arg(long)]
    pub max_count: Option<usize>,

    /// Maximum summed size of cached images in bytes (0 = unbounded).
    #[arg(long)]
    pub max_cost: Option<usize>,

    /// Request timeout in seconds.
    #[arg(long, env = "OXILOAD_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Load every URL a second time to exercise the cache.
    #[arg(long)]
    pub twice: bool,
}
