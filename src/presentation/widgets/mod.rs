mod image_slot;

pub use image_slot::{ImageSlot, SlotHost, SlotRenderer, render_state};
