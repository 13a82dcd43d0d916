//! User and channel directory.
//!
//! Populated from the session snapshot returned by
//! [`Transport::connect`](crate::transport::Transport::connect) and kept up
//! to date by the bookkeeping commands (`team_join`, `user_change`,
//! `im_open`, `im_close`).

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{SendError, SendResult};

/// A known user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// User id (`U…`).
    pub id: String,
    /// Display nickname.
    pub name: String,
    /// Id of the open direct-message channel with the bot (`D…`), if any.
    #[serde(default)]
    pub im: Option<String>,
}

impl UserInfo {
    /// Creates a user without a direct-message channel.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            im: None,
        }
    }

    /// Sets the direct-message channel.
    pub fn with_im(mut self, im: impl Into<String>) -> Self {
        self.im = Some(im.into());
        self
    }
}

/// A known channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Channel id (`C…`).
    pub id: String,
    /// Channel name without the leading `#`.
    pub name: String,
    /// Member user ids.
    #[serde(default)]
    pub members: Vec<String>,
}

impl ChannelInfo {
    /// Creates a channel.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Sets the member list.
    pub fn with_members<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members = members.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<String, UserInfo>,
    channels: Vec<ChannelInfo>,
}

/// Thread-safe user and channel lookups.
#[derive(Debug, Default)]
pub struct Directory {
    state: RwLock<DirectoryState>,
}

impl Directory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole directory, e.g. after (re)connecting.
    pub fn replace(&self, users: Vec<UserInfo>, channels: Vec<ChannelInfo>) {
        let mut state = self.state.write();
        state.users = users.into_iter().map(|u| (u.id.clone(), u)).collect();
        state.channels = channels;
    }

    /// Inserts or updates a user, keeping a known direct-message channel
    /// when the update does not carry one.
    pub fn upsert_user(&self, mut user: UserInfo) {
        let mut state = self.state.write();
        if user.im.is_none()
            && let Some(existing) = state.users.get(&user.id)
        {
            user.im = existing.im.clone();
        }
        state.users.insert(user.id.clone(), user);
    }

    /// Records (or clears) a user's direct-message channel.
    ///
    /// Returns `false` if the user is unknown.
    pub fn set_im(&self, user_id: &str, im: Option<String>) -> bool {
        match self.state.write().users.get_mut(user_id) {
            Some(user) => {
                user.im = im;
                true
            }
            None => false,
        }
    }

    /// Returns a copy of a user record.
    pub fn user(&self, user_id: &str) -> Option<UserInfo> {
        self.state.read().users.get(user_id).cloned()
    }

    /// Nickname of a user id.
    pub fn nick(&self, user_id: &str) -> Option<String> {
        self.state.read().users.get(user_id).map(|u| u.name.clone())
    }

    /// User id for a nickname.
    pub fn user_id(&self, name: &str) -> Option<String> {
        self.state
            .read()
            .users
            .values()
            .find(|u| u.name == name)
            .map(|u| u.id.clone())
    }

    /// Direct-message channel id for a nickname.
    pub fn user_im(&self, name: &str) -> Option<String> {
        self.state
            .read()
            .users
            .values()
            .find(|u| u.name == name)
            .and_then(|u| u.im.clone())
    }

    /// Returns a copy of a channel record.
    pub fn channel(&self, channel_id: &str) -> Option<ChannelInfo> {
        self.state
            .read()
            .channels
            .iter()
            .find(|c| c.id == channel_id)
            .cloned()
    }

    /// Channel id for a name (without `#`).
    pub fn channel_id(&self, name: &str) -> Option<String> {
        self.state
            .read()
            .channels
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id.clone())
    }

    /// Display name of a channel id.
    ///
    /// `C…` ids resolve to `#name`, `D…` ids to `@name` of the partner in the
    /// direct-message channel. Anything else is unresolvable.
    pub fn channel_name(&self, channel_id: &str) -> Option<String> {
        let state = self.state.read();
        if channel_id.starts_with('C') {
            state
                .channels
                .iter()
                .find(|c| c.id == channel_id)
                .map(|c| format!("#{}", c.name))
        } else if channel_id.starts_with('D') {
            state
                .users
                .values()
                .find(|u| u.im.as_deref() == Some(channel_id))
                .map(|u| format!("@{}", u.name))
        } else {
            None
        }
    }

    /// Member ids of a channel.
    pub fn channel_members(&self, channel_id: &str) -> Option<Vec<String>> {
        self.channel(channel_id).map(|c| c.members)
    }

    /// Names of all channels.
    pub fn channel_names(&self) -> Vec<String> {
        self.state
            .read()
            .channels
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Parses `@name` or a known `U…` id into a user id.
    pub fn parse_user_id(&self, input: &str) -> SendResult<String> {
        let mut hint = " Perhaps you omitted the '@'?";
        if let Some(name) = input.strip_prefix('@') {
            hint = "";
            if let Some(id) = self.user_id(name) {
                return Ok(id);
            }
        } else if input.starts_with('U') && self.state.read().users.contains_key(input) {
            return Ok(input.to_string());
        }
        Err(SendError::UnknownUser {
            input: input.to_string(),
            hint,
        })
    }
}
