//! Shared fixtures for detour test suites.

pub mod database;
pub mod events;

mod error;

pub use database::{TestDatabase, env_dsn};
pub use error::{Error, Result};
