//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction bounded by count and cost
//! - HTTP(S) fetching with streamed progress

pub mod http_fetcher;
pub mod memory_cache;

pub use http_fetcher::{FetcherConfig, HttpImageFetcher};
pub use memory_cache::{CacheStats, MemoryImageCache};
