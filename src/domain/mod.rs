//! Domain layer with core entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CachedImage, ImageKey, ImageSource, LoadState, LoadedImage};
pub use errors::{FetchError, LoadError, LoadErrorKind};
pub use ports::{ImageCachePort, ImageFetcherPort, ProgressSink};
