//! Transport boundary.
//!
//! The core never talks to the network itself. A [`Transport`] establishes
//! the session, delivers inbound events to an [`EventSink`] from its own task
//! and accepts outbound events without blocking the caller.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::directory::{ChannelInfo, UserInfo};
use crate::error::{TransportError, TransportResult};
use crate::event::Event;
use crate::placeholder::Identity;

/// State reported by the platform when a session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The bot's own identity.
    pub identity: Identity,
    /// Known users.
    #[serde(default)]
    pub users: Vec<UserInfo>,
    /// Known channels.
    #[serde(default)]
    pub channels: Vec<ChannelInfo>,
}

/// Receive callback handed to a transport.
///
/// Delivering never blocks: the dispatcher's sink only enqueues.
#[derive(Clone)]
pub struct EventSink {
    deliver: Arc<dyn Fn(Event) + Send + Sync>,
}

impl EventSink {
    /// Wraps a delivery function.
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Delivers one inbound event.
    pub fn deliver(&self, event: Event) {
        (self.deliver)(event);
    }

    /// Parses a raw JSON frame and delivers it.
    ///
    /// Frames that are not JSON objects are rejected.
    pub fn deliver_raw(&self, frame: &[u8]) -> serde_json::Result<()> {
        let event = Event::from_slice(frame)?;
        self.deliver(event);
        Ok(())
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").finish_non_exhaustive()
    }
}

/// A messaging transport.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "transport"
    }

    /// Establishes the session.
    ///
    /// Authentication or network failures are reported as
    /// [`TransportError::Connection`].
    async fn connect(&self) -> TransportResult<Session>;

    /// Registers the receive callback. Called before [`connect`](Self::connect).
    fn on_receive(&self, sink: EventSink);

    /// Queues an outbound event. Best-effort; delivery is confirmed later by
    /// an acknowledgement event, if at all.
    fn send(&self, event: Event) -> TransportResult<()>;

    /// Replaces the text of a previously sent message.
    fn update_message(&self, _ts: &str, _channel: &str, _text: &str) -> TransportResult<()> {
        Err(TransportError::Unsupported("update_message"))
    }

    /// Requests a direct-message channel with a user.
    fn open_dm(&self, _user_id: &str) -> TransportResult<()> {
        Err(TransportError::Unsupported("open_dm"))
    }

    /// Requests that a direct-message channel be closed.
    fn close_dm(&self, _channel_id: &str) -> TransportResult<()> {
        Err(TransportError::Unsupported("close_dm"))
    }

    /// Closes the session.
    async fn disconnect(&self) {}
}

/// A shareable transport handle.
pub type BoxedTransport = Arc<dyn Transport>;
