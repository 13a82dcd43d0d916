//! Per-event handler context.
//!
//! [`BotContext`] is what handlers see of the bot. It forwards a fixed set of
//! operations (replying and sending, directory lookups, the configuration
//! bag, command registration, module reload) to the shared [`Bot`] and
//! remembers the channel of the event being handled so that
//! [`reply`](BotContext::reply) knows where to answer.
//!
//! ```rust,ignore
//! fn greet(ctx: &BotContext, event: &mut Event, _: &Captures) -> HandlerResult {
//!     let who = event.get_str("user_name").unwrap_or("stranger");
//!     ctx.reply(format!("Hi @{who}!"))?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::bot::Bot;
use crate::command::Command;
use crate::directory::{ChannelInfo, Directory};
use crate::error::{ModuleResult, RegistryResult, SendError, SendResult};
use crate::event::Event;
use crate::history::{PendingOutgoing, SentHistory};
use crate::normalize::flatten_text;
use crate::placeholder::Identity;
use crate::registry::CommandSnapshot;
use crate::task::{StopSignal, TaskSet};

/// Handler-facing view of the bot for one event.
#[derive(Clone)]
pub struct BotContext {
    bot: Arc<Bot>,
    channel: Option<String>,
}

impl BotContext {
    /// Creates a context for `event`.
    pub fn new(bot: Arc<Bot>, event: &Event) -> Self {
        Self {
            channel: event.channel().map(str::to_string),
            bot,
        }
    }

    /// Channel id of the event being handled.
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Directory record of the event's channel.
    pub fn channel_info(&self) -> Option<ChannelInfo> {
        self.channel
            .as_deref()
            .and_then(|id| self.bot.directory().channel(id))
    }

    // ---- sending ----

    /// Replies in the event's channel, or the configured default channel.
    pub fn reply(&self, text: impl AsRef<str>) -> SendResult<()> {
        let channel = match &self.channel {
            Some(channel) => channel.clone(),
            None => self
                .config("send_channel")
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or(SendError::NoDestination)?,
        };
        self.bot.say(text.as_ref(), &channel)?;
        Ok(())
    }

    /// Sends to a channel id, `#channel` or `@user`.
    pub fn say(&self, text: impl AsRef<str>, destination: &str) -> SendResult<()> {
        self.bot.say(text.as_ref(), destination)?;
        Ok(())
    }

    /// Replaces the text of a previously sent message.
    pub fn edit_message(&self, ts: &str, channel: &str, text: &str) -> SendResult<()> {
        self.bot.edit_message(ts, channel, text)
    }

    /// Requests a direct-message channel with a user.
    pub fn open_dm(&self, user: &str) -> SendResult<()> {
        self.bot.open_dm(user)
    }

    /// Requests that a direct-message channel be closed.
    pub fn close_dm(&self, user: &str) -> SendResult<bool> {
        self.bot.close_dm(user)
    }

    // ---- lookups ----

    /// The bot's own identity.
    pub fn identity(&self) -> Identity {
        self.bot.identity()
    }

    /// The user and channel directory.
    pub fn directory(&self) -> &Directory {
        self.bot.directory()
    }

    /// Nickname of a user id.
    pub fn nick(&self, user_id: &str) -> Option<String> {
        self.bot.directory().nick(user_id)
    }

    /// User id of a nickname.
    pub fn user_id(&self, name: &str) -> Option<String> {
        self.bot.directory().user_id(name)
    }

    /// Display name of a channel id.
    pub fn channel_name(&self, channel_id: &str) -> Option<String> {
        self.bot.directory().channel_name(channel_id)
    }

    /// Channel id of a channel name.
    pub fn channel_id(&self, name: &str) -> Option<String> {
        self.bot.directory().channel_id(name)
    }

    /// Rewrites platform markup in `text` for display.
    pub fn flatten(&self, text: &str) -> String {
        flatten_text(self.bot.directory(), text)
    }

    // ---- configuration ----

    /// Reads the configuration bag.
    pub fn config(&self, key: &str) -> Option<Value> {
        self.bot.config(key)
    }

    /// Reads a boolean flag from the configuration bag.
    pub fn config_flag(&self, key: &str) -> bool {
        self.config(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Writes the configuration bag.
    pub fn set_config(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.bot.set_config(key, value);
    }

    // ---- commands and modules ----

    /// Every live command, highest priority first.
    pub fn commands(&self) -> CommandSnapshot {
        self.bot.registry().all_commands()
    }

    /// Registers a command under `module` at runtime.
    pub fn register_command(&self, module: &str, command: Command) -> RegistryResult<Arc<Command>> {
        let command = Arc::new(command);
        self.bot
            .registry()
            .add_command(module, Arc::clone(&command))?;
        Ok(command)
    }

    /// Removes a command.
    pub fn unregister_command(&self, command: &Arc<Command>) -> bool {
        self.bot.registry().unregister_command(command)
    }

    /// Hot-reloads a module.
    pub fn reload_module(&self, id: &str) -> ModuleResult<usize> {
        self.bot.reload_module(id)
    }

    /// Ids of installed module providers.
    pub fn installed_modules(&self) -> Vec<String> {
        self.bot.modules().provider_ids()
    }

    /// Ids of modules with live command sets.
    pub fn loaded_modules(&self) -> Vec<String> {
        self.bot.registry().module_ids()
    }

    // ---- bookkeeping ----

    /// Messages awaiting acknowledgement.
    pub fn pending(&self) -> &PendingOutgoing {
        self.bot.pending()
    }

    /// Acknowledged messages, newest first.
    pub fn history(&self) -> &SentHistory {
        self.bot.history()
    }

    /// Fires when the bot shuts down. Long-running threaded handlers should
    /// poll it.
    pub fn stop_signal(&self) -> StopSignal {
        self.bot.tasks().signal()
    }

    pub(crate) fn tasks(&self) -> &TaskSet {
        self.bot.tasks()
    }
}

impl std::fmt::Debug for BotContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotContext")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
