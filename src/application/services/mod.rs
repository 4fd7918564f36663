pub mod image_loader;
pub mod state_subscription;

pub use image_loader::ImageLoader;
pub use state_subscription::StateSubscription;
