//! # Nest Server
//!
//! The Nest backend application:
//!
//! - [`migrations`]: the registered schema migrations of the `github`,
//!   `owasp` and `ai` apps
//! - [`api`]: the read-only Event API
//! - [`admin`]: the operator-only Chunk changelist
//! - [`routes`]: the router tying them together
//! - [`config`]: environment configuration
//!
//! The `nest` binary drives all of it: `nest migrate`, `nest showmigrations`
//! and `nest serve`.

pub mod admin;
pub mod api;
pub mod commands;
pub mod config;
pub mod migrations;
pub mod routes;
pub mod state;

pub use config::{AdminConfig, Config, ConfigError};
pub use routes::build_router;
pub use state::AppState;
