//! Host-side configuration

pub mod loader;

pub use loader::{load, parse, ConfigError};
