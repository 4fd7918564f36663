//! Application layer with the image loading state machine.

/// Application services.
pub mod services;

pub use services::{ImageLoader, StateSubscription};
