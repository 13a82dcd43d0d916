//! Mirrors conversation traffic into the log.
//!
//! Every command here marks the event as logged so the dispatcher does not
//! report it as unhandled. Lines are emitted at `info` under the
//! `brass::console` target.

use brass_core::prelude::*;
use brass_core::{CommandBuilder, RuleResult};
use serde_json::Value;
use tracing::info;

/// Module id.
pub const ID: &str = "console";

/// Config flag enabling `user_typing` lines.
pub const SHOW_TYPING: &str = "show_typing";

const PRIORITY: i32 = 10;

/// Console logging of messages, acknowledgements, typing and presence.
#[derive(Debug, Default, Clone, Copy)]
pub struct Console;

impl ModuleProvider for Console {
    fn id(&self) -> &str {
        ID
    }

    fn build(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>> {
        Ok(vec![
            log_message()?,
            log_received()?,
            log_typing()?,
            log_presence_change()?,
            log_message_changed()?,
        ])
    }
}

fn passive(name: &str) -> CommandBuilder {
    Command::builder(name)
        .priority(PRIORITY)
        .occlusion(Occlusion::Passive)
}

fn log_message() -> RuleResult<Command> {
    passive("log message")
        .rule(RuleSpec::Any)
        .help("Print to the terminal a message that someone has written.")
        .handler(|ctx, event, _| {
            event.mark_logged();
            let text = ctx.flatten(event.text().unwrap_or_default());
            info!(
                target: "brass::console",
                channel = event.get_str("channel_name").unwrap_or("?"),
                user = event.get_str("user_name").unwrap_or("?"),
                "{text}"
            );
            Ok(())
        })
        .build()
}

fn log_received() -> RuleResult<Command> {
    passive("log received")
        .untyped()
        .has_field("reply_to")
        .help("Print to the terminal a message the bot has said.")
        .handler(|ctx, event, _| {
            event.mark_logged();
            let Some(text) = event.text() else {
                return Ok(());
            };
            let channel = event
                .channel()
                .map(|id| ctx.channel_name(id).unwrap_or_else(|| id.to_string()))
                .unwrap_or_else(|| "?".to_string());
            info!(
                target: "brass::console",
                channel = %channel,
                user = %ctx.identity().name,
                "{}",
                ctx.flatten(text)
            );
            Ok(())
        })
        .build()
}

fn log_typing() -> RuleResult<Command> {
    passive("log typing")
        .actions(["user_typing"])
        .help(
            "Print to the terminal that a user is typing.\n\n\
             Nothing is printed unless the `show_typing` config flag is set.",
        )
        .handler(|ctx, event, _| {
            event.mark_logged();
            if !ctx.config_flag(SHOW_TYPING) {
                return Ok(());
            }
            let user = event.get_str("user_name").unwrap_or("someone");
            match event.get_str("channel_name") {
                Some(channel) => info!(target: "brass::console", "{user} is typing in {channel}."),
                None => info!(target: "brass::console", "{user} is typing to you."),
            }
            Ok(())
        })
        .build()
}

fn log_presence_change() -> RuleResult<Command> {
    passive("log presence change")
        .actions(["presence_change"])
        .help("Print to the terminal that a user has changed presence.")
        .handler(|_, event, _| {
            event.mark_logged();
            let user = event.get_str("user_name").unwrap_or("someone");
            let presence = event.get_str("presence").unwrap_or("unknown");
            info!(target: "brass::console", presence, "{user} is now {presence}.");
            Ok(())
        })
        .build()
}

fn log_message_changed() -> RuleResult<Command> {
    passive("log message changed")
        .field("subtype", "message_changed")
        .help(
            "Print to the terminal that a user's message has been edited.\n\n\
             This does not necessarily mean the user edited it: link unfurling \
             also arrives as an edit.",
        )
        .handler(|ctx, event, _| {
            event.mark_logged();
            let message = event.get("message");
            let field = |key: &str| message.and_then(|m| m.get(key)).and_then(Value::as_str);
            let user = field("user")
                .map(|id| ctx.nick(id).unwrap_or_else(|| id.to_string()))
                .unwrap_or_else(|| "?".to_string());
            info!(
                target: "brass::console",
                channel = event.get_str("channel_name").unwrap_or("?"),
                user = %user,
                "edited {}",
                ctx.flatten(field("text").unwrap_or_default())
            );
            Ok(())
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brass_core::testing::{MemoryTransport, test_bot};
    use std::sync::Arc;

    fn dispatcher() -> Dispatcher {
        let (bot, _transport) = test_bot(MemoryTransport::default());
        bot.install_module(Arc::new(Console));
        assert!(bot.load_modules().is_empty());
        Dispatcher::new(bot)
    }

    #[test]
    fn test_messages_are_marked_logged() {
        let dispatcher = dispatcher();
        let report = dispatcher.dispatch(
            Event::message("hello <@U1>")
                .with("channel", "C1")
                .with("user", "U2"),
        );
        assert_eq!(report.fired, ["log message"]);
        assert!(report.handled);
        assert!(report.event.is_logged());
        assert!(!report.event.is_occluded());
    }

    #[test]
    fn test_edits_and_acks_are_logged() {
        let dispatcher = dispatcher();
        let edited = dispatcher.dispatch(
            Event::new("message")
                .with("subtype", "message_changed")
                .with("channel", "C1")
                .with(
                    "message",
                    serde_json::json!({"user": "U1", "text": "see <http://example.com>"}),
                ),
        );
        assert_eq!(edited.fired, ["log message changed"]);

        let ack = dispatcher.dispatch(
            Event::untyped()
                .with("reply_to", 1)
                .with("ok", true)
                .with("text", "hi"),
        );
        assert_eq!(ack.fired, ["log received"]);
        assert!(ack.handled);
    }

    #[test]
    fn test_typing_is_swallowed_without_flag() {
        let dispatcher = dispatcher();
        let report =
            dispatcher.dispatch(Event::new("user_typing").with("channel", "C1").with("user", "U1"));
        assert_eq!(report.fired, ["log typing"]);
        assert!(report.handled);

        dispatcher.bot().set_config(SHOW_TYPING, true);
        let report =
            dispatcher.dispatch(Event::new("user_typing").with("channel", "C1").with("user", "U1"));
        assert!(report.handled);
    }

    #[test]
    fn test_unrelated_events_stay_unhandled() {
        let dispatcher = dispatcher();
        let report = dispatcher.dispatch(Event::new("reconnect_url").with("url", "wss://x"));
        assert!(report.fired.is_empty());
        assert!(!report.handled);
    }
}
