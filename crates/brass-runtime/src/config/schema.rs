//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use brass_core::BotSettings;
use brass_core::bot::DEFAULT_MAX_MESSAGE_LENGTH;
use brass_core::history::DEFAULT_HISTORY_CAPACITY;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BrassConfig {
    /// Bot session settings.
    #[serde(default)]
    pub bot: BotConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Bot
// =============================================================================

/// Bot session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Channel used for replies to events without a channel.
    #[serde(default)]
    pub default_channel: Option<String>,

    /// Log `user_typing` events.
    #[serde(default)]
    pub show_typing: bool,

    /// Longest accepted outbound message, in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Number of acknowledged messages kept for `redact`.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Modules to install. Empty means every module handed to the runtime.
    #[serde(default)]
    pub modules: Vec<String>,

    /// Free-form values copied into the bot's configuration bag.
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            default_channel: None,
            show_typing: false,
            max_message_length: default_max_message_length(),
            history_capacity: default_history_capacity(),
            modules: Vec::new(),
            settings: Map::new(),
        }
    }
}

impl BotConfig {
    /// Session settings for [`brass_core::Bot`].
    pub fn bot_settings(&self) -> BotSettings {
        BotSettings {
            default_channel: self.default_channel.clone(),
            max_message_length: self.max_message_length,
            history_capacity: self.history_capacity,
        }
    }

    /// The initial configuration bag: `settings` plus the typed flags.
    pub fn config_bag(&self) -> Map<String, Value> {
        let mut bag = self.settings.clone();
        bag.insert("show_typing".to_string(), Value::Bool(self.show_typing));
        bag
    }

    /// Returns `true` if the module should be installed.
    pub fn module_enabled(&self, id: &str) -> bool {
        self.modules.is_empty() || self.modules.iter().any(|m| m == id)
    }
}

fn default_max_message_length() -> usize {
    DEFAULT_MAX_MESSAGE_LENGTH
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Returns the level as a filter directive string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to `full` without it.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// File rotation policy for [`LogOutput::File`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` takes precedence when set.
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required when `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-target levels, e.g. `brass_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_core() {
        let config = BrassConfig::default();
        assert_eq!(config.bot.max_message_length, 4000);
        assert_eq!(config.bot.history_capacity, 30);
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.bot.module_enabled("anything"));
    }

    #[test]
    fn test_config_bag_carries_flags() {
        let mut bot = BotConfig {
            show_typing: true,
            ..Default::default()
        };
        bot.settings
            .insert("greeting".to_string(), Value::from("howdy"));

        let bag = bot.config_bag();
        assert_eq!(bag.get("show_typing"), Some(&Value::Bool(true)));
        assert_eq!(bag.get("greeting"), Some(&Value::from("howdy")));
    }

    #[test]
    fn test_enable_list() {
        let bot = BotConfig {
            modules: vec!["help".to_string()],
            ..Default::default()
        };
        assert!(bot.module_enabled("help"));
        assert!(!bot.module_enabled("friendly"));
    }

    #[test]
    fn test_deserialize_lowercase_enums() {
        let config: LoggingConfig =
            serde_json::from_str(r#"{"level":"debug","format":"pretty","output":"stderr"}"#)
                .unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.output, LogOutput::Stderr);
    }
}
