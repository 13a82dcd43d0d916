//! The shared bot session.
//!
//! [`Bot`] owns everything handlers can reach through their
//! [`BotContext`](crate::context::BotContext): identity and placeholders,
//! the directory, the command registry and module manager, outbound message
//! bookkeeping, the key-value configuration bag and the transport.

use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::directory::Directory;
use crate::error::{ModuleLoadError, ModuleResult, SendError, SendResult, TransportResult};
use crate::event::{Event, MESSAGE};
use crate::history::{DEFAULT_HISTORY_CAPACITY, PendingMessage, PendingOutgoing, SentHistory};
use crate::module::{ModuleManager, ModuleProvider};
use crate::placeholder::{Identity, PlaceholderTable};
use crate::registry::CommandRegistry;
use crate::task::TaskSet;
use crate::transport::{BoxedTransport, Session};

/// Default maximum length of an outbound message, in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 4000;

static OUTGOING_USER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^| )@(\w+)\b").unwrap());
static OUTGOING_CHANNEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^| )#([\w-]+)\b").unwrap());

const BROADCASTS: [&str; 3] = ["channel", "everyone", "group"];

/// Session-level settings.
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Channel used when a reply has no originating channel.
    pub default_channel: Option<String>,
    /// Longest accepted outbound message.
    pub max_message_length: usize,
    /// Capacity of the sent-message history.
    pub history_capacity: usize,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            default_channel: None,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

/// The shared bot session.
pub struct Bot {
    settings: BotSettings,
    placeholders: PlaceholderTable,
    directory: Directory,
    registry: CommandRegistry,
    modules: ModuleManager,
    pending: PendingOutgoing,
    history: SentHistory,
    config: RwLock<Map<String, Value>>,
    transport: BoxedTransport,
    tasks: TaskSet,
    next_message_id: AtomicU64,
}

impl Bot {
    /// Starts building a bot over the given transport.
    pub fn builder(transport: BoxedTransport) -> BotBuilder {
        BotBuilder::new(transport)
    }

    /// Session settings.
    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// The placeholder table used to compile rules.
    pub fn placeholders(&self) -> &PlaceholderTable {
        &self.placeholders
    }

    /// The bot's own identity.
    pub fn identity(&self) -> Identity {
        self.placeholders.identity()
    }

    /// User and channel directory.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// The command registry.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// The module manager.
    pub fn modules(&self) -> &ModuleManager {
        &self.modules
    }

    /// Messages sent but not yet acknowledged.
    pub fn pending(&self) -> &PendingOutgoing {
        &self.pending
    }

    /// Acknowledged messages, newest first.
    pub fn history(&self) -> &SentHistory {
        &self.history
    }

    /// Background task set.
    pub fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    /// The transport handle.
    pub fn transport(&self) -> &BoxedTransport {
        &self.transport
    }

    /// Returns a configuration value.
    pub fn config(&self, key: &str) -> Option<Value> {
        self.config.read().get(key).cloned()
    }

    /// Sets a configuration value.
    pub fn set_config(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.config.write().insert(key.into(), value.into());
    }

    /// Applies a session snapshot: identity and directory.
    ///
    /// A changed identity invalidates every compiled rule.
    pub fn apply_session(&self, session: Session) {
        info!(
            id = %session.identity.id,
            name = %session.identity.name,
            users = session.users.len(),
            channels = session.channels.len(),
            "Session established"
        );
        self.placeholders.set_identity(session.identity);
        self.directory.replace(session.users, session.channels);
    }

    /// Connects the transport and applies the resulting session.
    pub async fn connect(&self) -> TransportResult<()> {
        let session = self.transport.connect().await?;
        self.apply_session(session);
        Ok(())
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Sends `text` to `destination`.
    ///
    /// The destination is a channel id, `#channel` or `@user` (the user's
    /// direct-message channel). Empty text is ignored and yields `None`;
    /// otherwise the assigned message id is returned.
    pub fn say(&self, text: &str, destination: &str) -> SendResult<Option<u64>> {
        if text.is_empty() {
            return Ok(None);
        }

        let len = text.chars().count();
        let limit = self.settings.max_message_length;
        if len > limit {
            return Err(SendError::MessageTooLong { len, limit });
        }

        let channel = self.resolve_destination(destination)?;
        let id = self.next_message_id.fetch_add(1, Ordering::AcqRel);
        self.pending.insert(
            id,
            PendingMessage {
                text: text.to_string(),
                channel: channel.clone(),
            },
        );

        let event = Event::new(MESSAGE)
            .with("id", id)
            .with("channel", channel.as_str())
            .with("text", self.format_outgoing(text));
        debug!(id, channel = %channel, "Sending message");

        if let Err(e) = self.transport.send(event) {
            self.pending.take(id);
            return Err(e.into());
        }
        Ok(Some(id))
    }

    /// Replaces the text of a previously sent message.
    pub fn edit_message(&self, ts: &str, channel: &str, text: &str) -> SendResult<()> {
        self.transport.update_message(ts, channel, text)?;
        Ok(())
    }

    /// Requests a direct-message channel with `@name` or a `U…` id.
    pub fn open_dm(&self, user: &str) -> SendResult<()> {
        let user_id = self.directory.parse_user_id(user)?;
        self.transport.open_dm(&user_id)?;
        Ok(())
    }

    /// Requests that the direct-message channel with a user be closed.
    ///
    /// Returns `false` if no such channel is known.
    pub fn close_dm(&self, user: &str) -> SendResult<bool> {
        let user_id = self.directory.parse_user_id(user)?;
        let Some(im) = self.directory.user(&user_id).and_then(|u| u.im) else {
            return Ok(false);
        };
        self.transport.close_dm(&im)?;
        Ok(true)
    }

    /// Resolves `#name` and `@name` destinations to channel ids.
    pub fn resolve_destination(&self, destination: &str) -> SendResult<String> {
        if let Some(name) = destination.strip_prefix('#') {
            return self
                .directory
                .channel_id(name)
                .ok_or_else(|| SendError::UnknownChannel(name.to_string()));
        }
        if let Some(name) = destination.strip_prefix('@') {
            return self
                .directory
                .user_im(name)
                .ok_or_else(|| SendError::NoDirectMessage(name.to_string()));
        }
        Ok(destination.to_string())
    }

    /// Rewrites `@name` and `#channel` into platform mention markup where
    /// they resolve.
    pub fn format_outgoing(&self, text: &str) -> String {
        let out = OUTGOING_USER.replace_all(text, |caps: &Captures<'_>| {
            let (start, nick) = (&caps[1], &caps[2]);
            if let Some(id) = self.directory.user_id(nick) {
                format!("{start}<@{id}>")
            } else if BROADCASTS.contains(&nick) {
                format!("{start}<!{nick}>")
            } else {
                caps[0].to_string()
            }
        });

        OUTGOING_CHANNEL
            .replace_all(&out, |caps: &Captures<'_>| {
                match self.directory.channel_id(&caps[2]) {
                    Some(id) => format!("{}<#{id}>", &caps[1]),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    // =========================================================================
    // Modules
    // =========================================================================

    /// Installs a module provider without loading it.
    pub fn install_module(&self, provider: Arc<dyn ModuleProvider>) {
        self.modules.install(provider);
    }

    /// Loads every installed module, returning the failures.
    pub fn load_modules(&self) -> Vec<ModuleLoadError> {
        self.modules.load_all(self)
    }

    /// Loads or hot-reloads one module. On failure the previous command set
    /// stays live.
    pub fn reload_module(&self, id: &str) -> ModuleResult<usize> {
        self.modules.load(self, id)
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("identity", &self.identity())
            .field("transport", &self.transport.name())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Bot`].
pub struct BotBuilder {
    transport: BoxedTransport,
    settings: BotSettings,
    identity: Identity,
    config: Map<String, Value>,
    providers: Vec<Arc<dyn ModuleProvider>>,
}

impl BotBuilder {
    fn new(transport: BoxedTransport) -> Self {
        Self {
            transport,
            settings: BotSettings::default(),
            identity: Identity::default(),
            config: Map::new(),
            providers: Vec::new(),
        }
    }

    /// Sets the session settings.
    pub fn settings(mut self, settings: BotSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the initial identity (normally replaced on connect).
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    /// Seeds a configuration value.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Seeds the whole configuration bag.
    pub fn config_map(mut self, config: Map<String, Value>) -> Self {
        self.config.extend(config);
        self
    }

    /// Installs a module provider.
    pub fn module(mut self, provider: impl ModuleProvider) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Builds the bot. Modules are installed but not loaded.
    pub fn build(self) -> Arc<Bot> {
        if self.settings.max_message_length == 0 {
            warn!("max_message_length is 0; every message will be rejected");
        }

        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(1);

        let mut config = self.config;
        if let Some(channel) = &self.settings.default_channel {
            config
                .entry("send_channel")
                .or_insert_with(|| Value::String(channel.clone()));
        }

        let bot = Bot {
            history: SentHistory::with_capacity(self.settings.history_capacity),
            settings: self.settings,
            placeholders: PlaceholderTable::new(self.identity),
            directory: Directory::new(),
            registry: CommandRegistry::new(),
            modules: ModuleManager::new(),
            pending: PendingOutgoing::default(),
            config: RwLock::new(config),
            transport: self.transport,
            tasks: TaskSet::new(),
            next_message_id: AtomicU64::new(seed),
        };
        for provider in self.providers {
            bot.modules.install(provider);
        }
        Arc::new(bot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryTransport, test_bot};

    #[test]
    fn test_outgoing_patterns_compile() {
        LazyLock::force(&OUTGOING_USER);
        LazyLock::force(&OUTGOING_CHANNEL);
    }

    #[test]
    fn test_say_sends_formatted_message() {
        let (bot, transport) = test_bot(MemoryTransport::default());
        let id = bot.say("hey @alice, see #general", "C1").unwrap().unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].get("id"), Some(&Value::from(id)));
        assert_eq!(sent[0].channel(), Some("C1"));
        assert_eq!(sent[0].text(), Some("hey <@U1>, see <#C1>"));

        let pending = bot.pending().take(id).unwrap();
        assert_eq!(pending.text, "hey @alice, see #general");
        assert_eq!(pending.channel, "C1");
    }

    #[test]
    fn test_say_ignores_empty_text() {
        let (bot, transport) = test_bot(MemoryTransport::default());
        assert_eq!(bot.say("", "C1").unwrap(), None);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_say_rejects_long_text() {
        let (bot, transport) = test_bot(MemoryTransport::default());
        let text = "x".repeat(DEFAULT_MAX_MESSAGE_LENGTH + 1);
        assert!(matches!(
            bot.say(&text, "C1"),
            Err(SendError::MessageTooLong { .. })
        ));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_message_ids_increase() {
        let (bot, _transport) = test_bot(MemoryTransport::default());
        let a = bot.say("a", "C1").unwrap().unwrap();
        let b = bot.say("b", "C1").unwrap().unwrap();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_destinations() {
        let (bot, _transport) = test_bot(MemoryTransport::default());
        assert_eq!(bot.resolve_destination("#general").unwrap(), "C1");
        assert_eq!(bot.resolve_destination("@alice").unwrap(), "D1");
        assert_eq!(bot.resolve_destination("C77").unwrap(), "C77");
        assert!(matches!(
            bot.resolve_destination("@bob"),
            Err(SendError::NoDirectMessage(_))
        ));
        assert!(matches!(
            bot.resolve_destination("#nowhere"),
            Err(SendError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_format_outgoing_broadcasts_and_unknowns() {
        let (bot, _transport) = test_bot(MemoryTransport::default());
        assert_eq!(bot.format_outgoing("@channel hi"), "<!channel> hi");
        assert_eq!(bot.format_outgoing("@nobody #nowhere"), "@nobody #nowhere");
        assert_eq!(bot.format_outgoing("mail a@alice"), "mail a@alice");
    }

    #[test]
    fn test_dm_requests() {
        let (bot, transport) = test_bot(MemoryTransport::default());
        bot.open_dm("@bob").unwrap();
        assert!(bot.close_dm("U1").unwrap());
        assert!(!bot.close_dm("@bob").unwrap());
        assert!(matches!(
            bot.open_dm("bob"),
            Err(SendError::UnknownUser { .. })
        ));
        assert_eq!(transport.opened_dms(), ["U2"]);
        assert_eq!(transport.closed_dms(), ["D1"]);
    }

    #[test]
    fn test_config_bag() {
        let (bot, _transport) = test_bot(MemoryTransport::default());
        assert_eq!(bot.config("missing"), None);
        bot.set_config("show_typing", true);
        assert_eq!(bot.config("show_typing"), Some(Value::Bool(true)));
    }

    #[test]
    fn test_apply_session_bumps_rule_version() {
        let (bot, _transport) = test_bot(MemoryTransport::default());
        let before = bot.placeholders().version();
        bot.apply_session(Session {
            identity: Identity::new("U99", "renamed"),
            ..Session::default()
        });
        assert!(bot.placeholders().version() > before);
        assert_eq!(bot.identity().name, "renamed");
    }
}
