//! Domain entity definitions.

mod image;

pub use image::{CachedImage, ImageKey, ImageSource, LoadState, LoadedImage};
