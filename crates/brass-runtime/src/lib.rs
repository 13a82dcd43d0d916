//! Brass Runtime - orchestration layer for the Brass chat bot framework.
//!
//! This crate provides:
//! - Layered configuration loading ([`config`])
//! - Logging initialization ([`logging`])
//! - Transport wiring, the dispatch loop task and signal-driven shutdown
//!   ([`BrassRuntime`])
//!
//! ```ignore
//! use brass_runtime::BrassRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BrassRuntime::builder()
//!         .transport(MyTransport::connect_from_env()?)
//!         .module(MyModule)
//!         .build()?;
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{BotConfig, BrassConfig, ConfigError, ConfigLoader, ConfigResult, LoggingConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{BrassRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for handler code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
