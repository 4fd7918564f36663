//! Oxiload - asynchronous image loading with an in-memory decoded image cache.
//!
//! A host binds URLs to image slots; each slot's loader serves the image from
//! the shared cache or downloads and decodes it, publishing every state
//! transition to its subscribers.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the loader state machine.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing the cache, fetcher, and configuration.
pub mod infrastructure;
/// Presentation layer binding host slots to loaders.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "oxiload";
