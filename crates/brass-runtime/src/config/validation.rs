//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, BrassConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &BrassConfig) -> ConfigResult<()> {
    validate_bot_config(&config.bot)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.max_message_length == 0 {
        return Err(ConfigError::validation(
            "bot.max_message_length must be greater than 0",
        ));
    }

    if bot.history_capacity == 0 {
        return Err(ConfigError::validation(
            "bot.history_capacity must be greater than 0",
        ));
    }

    if let Some(channel) = &bot.default_channel
        && channel.trim().is_empty()
    {
        return Err(ConfigError::validation(
            "bot.default_channel cannot be blank",
        ));
    }

    let mut seen = HashSet::new();
    for module in &bot.modules {
        if module.is_empty() {
            return Err(ConfigError::missing_field("bot.modules[]"));
        }
        if !seen.insert(module.as_str()) {
            return Err(ConfigError::DuplicateModule(module.clone()));
        }
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    for target in logging.filters.keys() {
        if target.is_empty() || target.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid logging filter target: {target:?}"
            )));
        }
    }

    Ok(())
}
