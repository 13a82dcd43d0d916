//! A transport that talks to the terminal.
//!
//! Every line typed on stdin arrives as a message in `#general` from the
//! local user. Outbound messages are printed and acknowledged right away,
//! the way a chat server would.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use brass::core::{
    ChannelInfo, Event, EventSink, Identity, Session, Transport, TransportError, TransportResult,
    UserInfo,
};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

const BOT_ID: &str = "U0";
const USER_ID: &str = "U1";
const CHANNEL_ID: &str = "C1";
const DM_ID: &str = "D1";

pub struct ConsoleTransport {
    bot_name: String,
    user_name: String,
    sink: Arc<Mutex<Option<EventSink>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<Notify>,
    next_ts: AtomicU64,
}

impl ConsoleTransport {
    pub fn new(bot_name: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            user_name: user_name.into(),
            sink: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
            closed: Arc::new(Notify::new()),
            next_ts: AtomicU64::new(1),
        }
    }

    /// Completes once stdin reaches end of file.
    pub async fn closed(&self) {
        self.closed.notified().await;
    }

    fn deliver(&self, event: Event) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.deliver(event);
        }
    }

    /// Replaces `<@U…>` and `<#C…>` markup with readable names.
    fn display(&self, text: &str) -> String {
        text.replace(&format!("<@{BOT_ID}>"), &format!("@{}", self.bot_name))
            .replace(&format!("<@{USER_ID}>"), &format!("@{}", self.user_name))
            .replace(&format!("<#{CHANNEL_ID}>"), "#general")
    }

    fn channel_label(channel: &str) -> &str {
        match channel {
            CHANNEL_ID => "#general",
            DM_ID => "(direct)",
            other => other,
        }
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn connect(&self) -> TransportResult<Session> {
        let sink = Arc::clone(&self.sink);
        let closed = Arc::clone(&self.closed);
        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let event = Event::message(line)
                            .with("channel", CHANNEL_ID)
                            .with("user", USER_ID);
                        if let Some(sink) = sink.lock().as_ref() {
                            sink.deliver(event);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "stdin closed");
                        break;
                    }
                }
            }
            closed.notify_one();
        });
        *self.reader.lock() = Some(handle);

        Ok(Session {
            identity: Identity::new(BOT_ID, self.bot_name.clone()),
            users: vec![
                UserInfo::new(BOT_ID, self.bot_name.clone()),
                UserInfo::new(USER_ID, self.user_name.clone()).with_im(DM_ID),
            ],
            channels: vec![
                ChannelInfo::new(CHANNEL_ID, "general").with_members([BOT_ID, USER_ID]),
            ],
        })
    }

    fn on_receive(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn send(&self, event: Event) -> TransportResult<()> {
        let text = event
            .text()
            .ok_or_else(|| TransportError::SendFailed("outbound event has no text".to_string()))?;
        let channel = event.channel().unwrap_or(CHANNEL_ID);
        println!(
            "{} {}: {}",
            Self::channel_label(channel),
            self.bot_name,
            self.display(text)
        );

        let ts = format!("{}.000", self.next_ts.fetch_add(1, Ordering::Relaxed));
        let mut ack = Event::untyped()
            .with("ok", true)
            .with("ts", ts)
            .with("text", text);
        if let Some(id) = event.get("id") {
            ack.set("reply_to", id.clone());
        }
        self.deliver(ack);
        Ok(())
    }

    fn update_message(&self, ts: &str, channel: &str, text: &str) -> TransportResult<()> {
        println!(
            "{} {} (edited {ts}): {}",
            Self::channel_label(channel),
            self.bot_name,
            self.display(text)
        );
        Ok(())
    }

    fn open_dm(&self, user_id: &str) -> TransportResult<()> {
        self.deliver(
            Event::new("im_open")
                .with("user", user_id)
                .with("channel", DM_ID),
        );
        Ok(())
    }

    fn close_dm(&self, channel_id: &str) -> TransportResult<()> {
        self.deliver(
            Event::new("im_close")
                .with("user", USER_ID)
                .with("channel", channel_id),
        );
        Ok(())
    }

    async fn disconnect(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}
