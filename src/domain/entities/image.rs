//! Domain types for image loading.

use std::sync::Arc;

use reqwest::Url;

use crate::domain::errors::{LoadError, LoadErrorKind};

/// Decoded image shared between the cache and every loader that displays it.
pub type CachedImage = Arc<image::DynamicImage>;

/// Cache key for an image: the normalized form of its URL.
///
/// Two spellings of the same resource (`HTTPS://Example.com/a.png` and
/// `https://example.com/a.png`) map to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageKey(String);

impl ImageKey {
    /// Parses and normalizes a URL into a cache key.
    ///
    /// # Errors
    /// Returns [`LoadError::BadUrl`] if the input is empty, cannot be parsed,
    /// or does not use the `http`/`https` scheme.
    pub fn parse(raw: &str) -> Result<Self, LoadError> {
        Self::parse_url(raw).map(|url| Self(url.into()))
    }

    /// Parses the raw input into a [`Url`] suitable for an HTTP GET.
    ///
    /// # Errors
    /// Same conditions as [`ImageKey::parse`].
    pub fn parse_url(raw: &str) -> Result<Url, LoadError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LoadError::bad_url(raw));
        }

        let url = Url::parse(trimmed).map_err(|_| LoadError::bad_url(raw))?;
        let supported = matches!(url.scheme(), "http" | "https") && url.host_str().is_some();
        if supported {
            Ok(url)
        } else {
            Err(LoadError::bad_url(raw))
        }
    }

    /// Returns the normalized URL string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Served from the in-memory cache.
    MemoryCache,
    /// Downloaded and decoded.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A successfully loaded image.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The key the image was loaded for.
    pub key: ImageKey,
    /// The decoded image.
    pub image: CachedImage,
    /// Where the image came from.
    pub source: ImageSource,
}

impl PartialEq for LoadedImage {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
            && self.source == other.source
            && Arc::ptr_eq(&self.image, &other.image)
    }
}

/// Lifecycle state of a single loader.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LoadState {
    /// Nothing requested yet, or the last request was cancelled.
    #[default]
    Idle,
    /// A fetch is in flight. `progress` is a fraction in `[0, 1]`.
    Loading {
        /// Fraction of the body received so far.
        progress: f64,
    },
    /// The last request failed.
    Failed {
        /// Classification of the failure.
        kind: LoadErrorKind,
        /// Human-readable message suitable for display.
        message: String,
    },
    /// The last request produced an image.
    Loaded(LoadedImage),
}

impl LoadState {
    /// Builds a failed state from a load error.
    #[must_use]
    pub fn failed(error: &LoadError) -> Self {
        Self::Failed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Returns true while a fetch is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }

    /// Returns true if an image is available.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// Returns true if the last request failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the current progress fraction while loading.
    #[must_use]
    pub const fn progress(&self) -> Option<f64> {
        match self {
            Self::Loading { progress } => Some(*progress),
            _ => None,
        }
    }

    /// Returns the loaded image, if any.
    #[must_use]
    pub const fn image(&self) -> Option<&LoadedImage> {
        match self {
            Self::Loaded(loaded) => Some(loaded),
            _ => None,
        }
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl std::fmt::Display for LoadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading { progress } => write!(f, "loading ({:.0}%)", progress * 100.0),
            Self::Failed { message, .. } => write!(f, "failed: {message}"),
            Self::Loaded(loaded) => write!(
                f,
                "loaded {}x{} from {}",
                loaded.image.width(),
                loaded.image.height(),
                loaded.source
            ),
        }
    }
}
