//! HTTP request handlers shared by every Nest binary.

pub mod fallback;
pub mod health;

pub use fallback::{method_not_allowed, not_found};
pub use health::liveness;
