//! Operator-only admin surface.

pub mod auth;
pub mod chunks;

pub use auth::RequireOperator;
