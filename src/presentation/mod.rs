//! Presentation layer binding host UI slots to image loaders.

/// Reusable widgets.
pub mod widgets;

pub use widgets::{ImageSlot, SlotHost, SlotRenderer, render_state};
