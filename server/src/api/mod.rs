//! Public read-only API.

pub mod events;
