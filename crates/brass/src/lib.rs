//! # Brass
//!
//! A chat bot framework built around prioritised, hot-reloadable command
//! rules.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  events  ┌────────────┐  priority order   ┌─────────────────────┐
//! │ Transport │─────────▶│ Dispatcher │──────────────────▶│ Command (module a)  │──▶ handler
//! │           │◀─────────│            │──────────────────▶│ Command (module b)  │──▶ handler
//! └───────────┘  say()   └────────────┘        ...        └─────────────────────┘
//!                             │
//!                             └── CommandRegistry ◀── ModuleManager (hot reload)
//! ```
//!
//! - **Transport**: connects to the chat platform, delivers inbound events and
//!   sends outbound messages
//! - **Dispatcher**: normalizes each event and offers it to every live
//!   command, highest priority first, honouring occlusion
//! - **Commands**: a rule (regex with `$bot`-style placeholders), filters,
//!   lifecycle limits and a handler
//! - **Modules**: named command sets that can be reloaded at runtime without
//!   a window where their commands are missing
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use brass::prelude::*;
//!
//! struct Greeter;
//!
//! impl ModuleProvider for Greeter {
//!     fn id(&self) -> &str {
//!         "greeter"
//!     }
//!
//!     fn build(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>> {
//!         Ok(vec![Command::builder("wave")
//!             .rule("$@bot wave")
//!             .occlusion(Occlusion::Exclusive)
//!             .handler(|ctx, _, _| {
//!                 ctx.reply(":wave:")?;
//!                 Ok(())
//!             })
//!             .build()?])
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = BrassRuntime::builder()
//!         .transport(MyTransport::new())
//!         .module(Bookkeeping)
//!         .module(Greeter)
//!         .build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log output

pub use brass_core as core;
pub use brass_modules as modules;
pub use brass_runtime as runtime;

/// Commonly used types for building bots.
pub mod prelude {
    // Runtime - main entry point
    pub use brass_runtime::{BrassConfig, BrassRuntime};

    // Commands, modules and handlers
    pub use brass_core::prelude::*;
    pub use brass_core::{Bot, Identity, SendError};

    // Built-in modules
    pub use brass_modules::{Admin, Bookkeeping, Console, Friendly, Help};

    // Logging macros
    pub use brass_runtime::prelude::*;
}
