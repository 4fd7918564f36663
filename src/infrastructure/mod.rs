//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image caching and fetching.
pub mod image;

pub use config::{AppConfig, CliArgs, LogLevel, StorageManager};
pub use image::{CacheStats, FetcherConfig, HttpImageFetcher, MemoryImageCache};
