//! In-memory transport for tests and demos.
//!
//! [`MemoryTransport`] records everything the bot sends and lets a test
//! inject inbound events through the registered sink, as a real transport's
//! reader task would.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::bot::{Bot, BotSettings};
use crate::directory::{ChannelInfo, UserInfo};
use crate::error::{TransportError, TransportResult};
use crate::event::Event;
use crate::placeholder::Identity;
use crate::transport::{EventSink, Session, Transport};

/// An edit requested through [`Transport::update_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageUpdate {
    /// Timestamp of the edited message.
    pub ts: String,
    /// Channel of the edited message.
    pub channel: String,
    /// Replacement text.
    pub text: String,
}

#[derive(Debug, Default)]
struct Recorded {
    sent: Vec<Event>,
    updates: Vec<MessageUpdate>,
    opened_dms: Vec<String>,
    closed_dms: Vec<String>,
}

/// A transport that keeps everything in memory.
#[derive(Debug)]
pub struct MemoryTransport {
    session: Session,
    refuse_connect: bool,
    sink: Mutex<Option<EventSink>>,
    recorded: Mutex<Recorded>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(sample_session())
    }
}

impl MemoryTransport {
    /// Creates a transport that reports `session` on connect.
    pub fn new(session: Session) -> Self {
        Self {
            session,
            refuse_connect: false,
            sink: Mutex::new(None),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Makes [`connect`](Transport::connect) fail with a connection error.
    pub fn refusing() -> Self {
        Self {
            refuse_connect: true,
            ..Self::default()
        }
    }

    /// The session reported on connect.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Delivers an inbound event to the registered sink.
    ///
    /// Returns `false` if nothing is listening yet.
    pub fn inject(&self, event: Event) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => {
                sink.deliver(event);
                true
            }
            None => false,
        }
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<Event> {
        self.recorded.lock().sent.clone()
    }

    /// Texts of everything sent so far.
    pub fn sent_texts(&self) -> Vec<String> {
        self.recorded
            .lock()
            .sent
            .iter()
            .filter_map(|e| e.text().map(str::to_string))
            .collect()
    }

    /// Message edits requested so far.
    pub fn updates(&self) -> Vec<MessageUpdate> {
        self.recorded.lock().updates.clone()
    }

    /// User ids for which a direct-message channel was requested.
    pub fn opened_dms(&self) -> Vec<String> {
        self.recorded.lock().opened_dms.clone()
    }

    /// Channel ids whose closing was requested.
    pub fn closed_dms(&self) -> Vec<String> {
        self.recorded.lock().closed_dms.clone()
    }

    /// Builds the acknowledgement the platform would send for a message.
    pub fn ack_for(message: &Event, ts: &str) -> Event {
        let mut ack = Event::untyped().with("ok", true).with("ts", ts);
        if let Some(id) = message.get("id") {
            ack.set("reply_to", id.clone());
        }
        if let Some(text) = message.text() {
            ack.set("text", text);
        }
        ack
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> TransportResult<Session> {
        if self.refuse_connect {
            return Err(TransportError::connection("invalid_auth"));
        }
        Ok(self.session.clone())
    }

    fn on_receive(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn send(&self, event: Event) -> TransportResult<()> {
        self.recorded.lock().sent.push(event);
        Ok(())
    }

    fn update_message(&self, ts: &str, channel: &str, text: &str) -> TransportResult<()> {
        self.recorded.lock().updates.push(MessageUpdate {
            ts: ts.to_string(),
            channel: channel.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn open_dm(&self, user_id: &str) -> TransportResult<()> {
        self.recorded.lock().opened_dms.push(user_id.to_string());
        Ok(())
    }

    fn close_dm(&self, channel_id: &str) -> TransportResult<()> {
        self.recorded.lock().closed_dms.push(channel_id.to_string());
        Ok(())
    }
}

/// A small workspace: the bot `brassbot` (`U42`), users `alice` (`U1`, with
/// direct-message channel `D1`) and `bob` (`U2`), channel `#general` (`C1`).
pub fn sample_session() -> Session {
    Session {
        identity: Identity::new("U42", "brassbot"),
        users: vec![
            UserInfo::new("U1", "alice").with_im("D1"),
            UserInfo::new("U2", "bob"),
            UserInfo::new("U42", "brassbot"),
        ],
        channels: vec![ChannelInfo::new("C1", "general").with_members(["U1", "U2", "U42"])],
    }
}

/// Builds a bot over `transport` with its session already applied.
pub fn test_bot(transport: MemoryTransport) -> (Arc<Bot>, Arc<MemoryTransport>) {
    let transport = Arc::new(transport);
    let bot = Bot::builder(Arc::clone(&transport) as Arc<dyn Transport>)
        .settings(BotSettings::default())
        .build();
    bot.apply_session(transport.session().clone());
    (bot, transport)
}
