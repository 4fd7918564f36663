//! Image loading error types.

use thiserror::Error;

/// Failure reported by a fetcher for a single transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum FetchError {
    #[error("bad URL: {url:?}")]
    BadUrl { url: String },

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("bad response: HTTP {status}")]
    BadResponse { status: u16 },
}

impl FetchError {
    /// Creates bad URL error.
    #[must_use]
    pub fn bad_url(url: impl Into<String>) -> Self {
        Self::BadUrl { url: url.into() }
    }

    /// Creates transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Classification of a load failure, used by hosts to pick an error view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadErrorKind {
    /// The input was not a valid HTTP(S) URL.
    BadUrl,
    /// Connection-level failure.
    Transport,
    /// Non-2xx HTTP status.
    BadResponse,
    /// Bytes arrived but were not a decodable image.
    Decode,
}

impl std::fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadUrl => write!(f, "bad_url"),
            Self::Transport => write!(f, "transport"),
            Self::BadResponse => write!(f, "bad_response"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

/// Error surfaced by a loader as a failed state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("invalid image URL: {url:?}")]
    BadUrl { url: String },

    #[error("network error: {message}")]
    Transport { message: String },

    #[error("server responded with HTTP {status}")]
    BadResponse { status: u16 },

    #[error("failed to decode image: {message}")]
    Decode { message: String },
}

impl LoadError {
    /// Creates bad URL error.
    #[must_use]
    pub fn bad_url(url: impl Into<String>) -> Self {
        Self::BadUrl { url: url.into() }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns the failure classification.
    #[must_use]
    pub const fn kind(&self) -> LoadErrorKind {
        match self {
            Self::BadUrl { .. } => LoadErrorKind::BadUrl,
            Self::Transport { .. } => LoadErrorKind::Transport,
            Self::BadResponse { .. } => LoadErrorKind::BadResponse,
            Self::Decode { .. } => LoadErrorKind::Decode,
        }
    }
}

impl From<FetchError> for LoadError {
    fn from(error: FetchError) -> Self {
        match error {
            FetchError::BadUrl { url } => Self::BadUrl { url },
            FetchError::Transport { message } => Self::Transport { message },
            FetchError::BadResponse { status } => Self::BadResponse { status },
        }
    }
}
