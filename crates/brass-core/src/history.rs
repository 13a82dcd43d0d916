//! Outbound message bookkeeping.
//!
//! [`PendingOutgoing`] remembers what was sent until the platform
//! acknowledges it or the entry expires; [`SentHistory`] keeps the acknowledged messages,
//! newest first, so later commands can edit or redact them.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::event::Event;

/// Default capacity of [`SentHistory`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

/// How long an unacknowledged message is remembered by default.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(300);

/// A message handed to the transport and not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    /// Text as written by the handler (before mention formatting).
    pub text: String,
    /// Destination channel id.
    pub channel: String,
}

/// Messages awaiting acknowledgement, keyed by message id.
///
/// Entries older than the ttl are dropped on the next insert, so sends the
/// platform never acknowledges do not accumulate.
#[derive(Debug)]
pub struct PendingOutgoing {
    ttl: Duration,
    messages: Mutex<HashMap<u64, (Instant, PendingMessage)>>,
}

impl Default for PendingOutgoing {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_PENDING_TTL)
    }
}

impl PendingOutgoing {
    /// Creates an empty set whose entries expire after `ttl`.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            messages: Mutex::new(HashMap::new()),
        }
    }

    /// Records a sent message, dropping expired ones.
    pub fn insert(&self, id: u64, message: PendingMessage) {
        let now = Instant::now();
        let mut messages = self.messages.lock();
        let before = messages.len();
        messages.retain(|_, (sent_at, _)| now.duration_since(*sent_at) < self.ttl);
        let expired = before - messages.len();
        if expired > 0 {
            debug!(expired, "Dropped unacknowledged messages");
        }
        messages.insert(id, (now, message));
    }

    /// Removes and returns the message acknowledged by `id`.
    pub fn take(&self, id: u64) -> Option<PendingMessage> {
        self.messages.lock().remove(&id).map(|(_, message)| message)
    }

    /// Number of unacknowledged messages.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Returns `true` if everything sent was acknowledged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Bounded, newest-first ring of acknowledged messages.
#[derive(Debug)]
pub struct SentHistory {
    capacity: usize,
    messages: Mutex<VecDeque<Event>>,
}

impl Default for SentHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl SentHistory {
    /// Creates a ring holding at most `capacity` messages (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Maximum number of retained messages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pushes a message to the front, evicting the oldest ones if full.
    pub fn push(&self, message: Event) {
        let mut messages = self.messages.lock();
        messages.push_front(message);
        messages.truncate(self.capacity);
    }

    /// Most recent message sent to `channel`.
    pub fn latest_in(&self, channel: &str) -> Option<Event> {
        self.messages
            .lock()
            .iter()
            .find(|m| m.channel() == Some(channel))
            .cloned()
    }

    /// Copies of all retained messages, newest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.messages.lock().iter().cloned().collect()
    }

    /// Number of retained messages.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Returns `true` if nothing was retained yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sent(ts: &str, channel: &str) -> Event {
        Event::untyped().with("ts", ts).with("channel", channel)
    }

    #[test]
    fn test_pending_expires_unacknowledged() {
        let pending = PendingOutgoing::with_ttl(Duration::ZERO);
        let message = PendingMessage {
            text: "hi".into(),
            channel: "C1".into(),
        };
        pending.insert(1, message.clone());
        pending.insert(2, message.clone());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.take(1), None);
        assert_eq!(pending.take(2), Some(message));
    }

    #[test]
    fn test_pending_take_once() {
        let pending = PendingOutgoing::default();
        pending.insert(
            7,
            PendingMessage {
                text: "hi".into(),
                channel: "C1".into(),
            },
        );
        assert_eq!(pending.take(7).unwrap().channel, "C1");
        assert!(pending.take(7).is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_history_is_newest_first_and_bounded() {
        let history = SentHistory::with_capacity(2);
        history.push(sent("1", "C1"));
        history.push(sent("2", "C2"));
        history.push(sent("3", "C1"));
        assert_eq!(history.len(), 2);

        let ts: Vec<_> = history
            .snapshot()
            .iter()
            .map(|m| m.get_str("ts").unwrap().to_string())
            .collect();
        assert_eq!(ts, ["3", "2"]);
    }

    #[test]
    fn test_latest_in_channel() {
        let history = SentHistory::default();
        history.push(sent("1", "C1"));
        history.push(sent("2", "C2"));
        assert_eq!(history.latest_in("C1").unwrap().get_str("ts"), Some("1"));
        assert!(history.latest_in("C3").is_none());
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let history = SentHistory::with_capacity(0);
        history.push(sent("1", "C1"));
        history.push(sent("2", "C1"));
        assert_eq!(history.len(), 1);
    }
}
