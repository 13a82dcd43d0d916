//! # Brass Core
//!
//! The command dispatch engine of the Brass chat bot framework.
//!
//! ## Components
//!
//! - **Rules** ([`rule`], [`placeholder`]): rule specifications compiled
//!   into anchored patterns, with placeholders resolved against the live bot
//!   identity and recompiled lazily when it changes.
//! - **Commands** ([`command`]): a handler behind action, occlusion, field,
//!   sender and text filters, with priority and lifecycle limits.
//! - **Registry** ([`registry`], [`module`]): module command sets with
//!   atomic load, unload and replace, and transactional hot-reload.
//! - **Normalizer** ([`normalize`]): derived display fields for inbound
//!   events.
//! - **Dispatcher** ([`dispatcher`]): the queue and the single consumer loop
//!   tying the transport to the handlers.
//! - **Session** ([`bot`], [`context`], [`directory`], [`history`]): what
//!   handlers can reach while they run.
//!
//! ```text
//! ┌───────────┐ enqueue ┌────────────┐ snapshot ┌──────────┐
//! │ Transport │────────▶│ Dispatcher │─────────▶│ Registry │
//! └───────────┘         └────────────┘          └──────────┘
//!       ▲                     │ invoke
//!       │ send                ▼
//!       └──────────────── BotContext
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use brass_core::prelude::*;
//! use brass_core::testing::MemoryTransport;
//! use std::sync::Arc;
//!
//! let (bot, transport) = brass_core::testing::test_bot(MemoryTransport::default());
//! bot.registry().add_command(
//!     "greetings",
//!     Arc::new(
//!         Command::builder("say hello")
//!             .rule(r"[Hh]i $@bot!?")
//!             .occlusion(Occlusion::Exclusive)
//!             .handler(|ctx, _, _| Ok(ctx.reply("Hi!")?))
//!             .build()?,
//!     ),
//! )?;
//!
//! let dispatcher = Dispatcher::new(bot);
//! dispatcher.dispatch(Event::message("hi <@U42>").with("channel", "C1"));
//! assert_eq!(transport.sent_texts(), ["Hi!"]);
//! ```

pub mod bot;
pub mod command;
pub mod context;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod history;
pub mod module;
pub mod normalize;
pub mod placeholder;
pub mod registry;
pub mod rule;
pub mod task;
pub mod testing;
pub mod transport;

pub use bot::{Bot, BotBuilder, BotSettings};
pub use command::{
    Action, BoxedHandler, Command, CommandBuilder, FieldMatch, Handler, HandlerResult, Occlusion,
};
pub use context::BotContext;
pub use directory::{ChannelInfo, Directory, UserInfo};
pub use dispatcher::{DispatchObserver, DispatchReport, Dispatcher, TracingObserver};
pub use error::{
    DispatchError, ModuleLoadError, ModuleResult, RegistryError, RegistryResult, RuleError,
    RuleResult, SendError, SendResult, TransportError, TransportResult,
};
pub use event::Event;
pub use history::{PendingMessage, PendingOutgoing, SentHistory};
pub use module::{ModuleContext, ModuleManager, ModuleProvider, ModuleState};
pub use normalize::{flatten_text, normalize};
pub use placeholder::{Identity, PlaceholderTable};
pub use registry::{CommandRegistry, CommandSnapshot};
pub use rule::{Captures, Rule, RuleSpec};
pub use task::{StopSignal, TaskSet};
pub use transport::{BoxedTransport, EventSink, Session, Transport};

/// Prelude for common imports.
pub mod prelude {
    pub use super::command::{Command, FieldMatch, HandlerResult, Occlusion};
    pub use super::context::BotContext;
    pub use super::dispatcher::Dispatcher;
    pub use super::event::Event;
    pub use super::module::{ModuleContext, ModuleProvider};
    pub use super::rule::{Captures, RuleSpec};
    pub use super::transport::{EventSink, Session, Transport};
}
