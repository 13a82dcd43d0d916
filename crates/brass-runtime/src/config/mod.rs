//! Configuration for the Brass runtime.
//!
//! Layered loading with figment, a typed schema for the bot session and
//! logging, and validation of the merged result.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, BrassConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
