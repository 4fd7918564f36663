//! Domain error types.

mod load_error;

pub use load_error::{FetchError, LoadError, LoadErrorKind};
