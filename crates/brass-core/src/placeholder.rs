//! Placeholder substitution for rule text.
//!
//! Rule authors write `$@bot` instead of the bot's concrete mention markup so
//! that rules survive identity changes. The [`PlaceholderTable`] expands these
//! tokens at compile time and carries a version: every change draws a new one,
//! and compiled rules notice the mismatch on their next use and recompile.
//! Versions come from one process-wide counter, so a rule compiled against
//! one table is never mistaken for current against another.
//!
//! | Token | Expansion |
//! |-------|-----------|
//! | `$bot` | the bot's name |
//! | `$@bot` | a mention of the bot (`<@ID>` or `@name`), optional trailing `:` |
//! | `$yes` | `(?:yes\|yup\|yeah\|uh huh)` |
//! | `$no` | `(?:nope\|no\|nah\|nuh uh)` |
//! | `$@user` | any user mention |
//! | `$(@user)` | any user mention, capturing the user id |

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

const YES: &str = r"(?:yes|yup|yeah|uh huh)";
const NO: &str = r"(?:nope|no|nah|nuh uh)";
const ANY_USER: &str = r"<@U\w+>:?";
const CAPTURE_USER: &str = r"<@(U\w+)>:?";

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// The bot's own identity as reported by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Platform user id (e.g. `U024BE7LH`).
    pub id: String,
    /// Display name.
    pub name: String,
}

impl Identity {
    /// Creates an identity.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Default)]
struct TableState {
    identity: Identity,
    custom: Vec<(String, String)>,
}

/// Versioned placeholder substitution table.
#[derive(Debug)]
pub struct PlaceholderTable {
    state: RwLock<TableState>,
    version: AtomicU64,
}

impl Default for PlaceholderTable {
    fn default() -> Self {
        Self::new(Identity::default())
    }
}

impl PlaceholderTable {
    /// Creates a table for the given identity.
    pub fn new(identity: Identity) -> Self {
        Self {
            state: RwLock::new(TableState {
                identity,
                custom: Vec::new(),
            }),
            version: AtomicU64::new(next_version()),
        }
    }

    /// Current version. Changes whenever any expansion may have changed and
    /// is unique across tables.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Returns a copy of the current identity.
    pub fn identity(&self) -> Identity {
        self.state.read().identity.clone()
    }

    /// Replaces the bot identity and invalidates every compiled rule.
    pub fn set_identity(&self, identity: Identity) {
        let mut state = self.state.write();
        if state.identity == identity {
            return;
        }
        debug!(id = %identity.id, name = %identity.name, "Bot identity changed");
        state.identity = identity;
        self.version.store(next_version(), Ordering::Release);
    }

    /// Defines (or redefines) an extra token.
    ///
    /// Extra tokens are expanded before the built-in ones, so their
    /// replacement text may itself use built-in tokens.
    pub fn define(&self, token: impl Into<String>, replacement: impl Into<String>) {
        let token = token.into();
        let replacement = replacement.into();
        let mut state = self.state.write();
        match state.custom.iter_mut().find(|(t, _)| *t == token) {
            Some(entry) => entry.1 = replacement,
            None => state.custom.push((token, replacement)),
        }
        self.version.store(next_version(), Ordering::Release);
    }

    /// Expands every token in `rule`.
    ///
    /// Returns the expanded text together with the version it was expanded
    /// against; both are read under the same lock.
    pub fn expand(&self, rule: &str) -> (String, u64) {
        let state = self.state.read();
        let version = self.version();

        let mut text = rule.to_string();
        for (token, replacement) in &state.custom {
            text = text.replace(token.as_str(), replacement);
        }

        let name = regex::escape(&state.identity.name);
        let mention = if state.identity.id.is_empty() {
            format!("@{name}:?")
        } else {
            format!("(?:<@{}>|@{name}):?", regex::escape(&state.identity.id))
        };

        for (token, replacement) in [
            ("$bot", name.as_str()),
            ("$@bot", mention.as_str()),
            ("$yes", YES),
            ("$no", NO),
            ("$@user", ANY_USER),
            ("$(@user)", CAPTURE_USER),
        ] {
            text = text.replace(token, replacement);
        }

        (text, version)
    }
}
