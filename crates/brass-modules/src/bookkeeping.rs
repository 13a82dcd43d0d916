//! Keeps the bot session in sync with what the platform reports.
//!
//! | command | trigger |
//! |---|---|
//! | `acknowledge received` | untyped events with `reply_to` |
//! | `update user` | `team_join`, `user_change` |
//! | `im open` / `im close` | `im_open`, `im_close` |
//! | `redact` | `@bot redact` |

use anyhow::Context as _;
use brass_core::prelude::*;
use brass_core::{PendingMessage, RuleResult, UserInfo};
use serde_json::Value;
use tracing::{debug, error};

/// Module id.
pub const ID: &str = "bookkeeping";

/// Text that replaces a redacted message.
pub const REDACTED: &str = "REDACTED";

/// Delivery acknowledgements, directory updates and `redact`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Bookkeeping;

impl ModuleProvider for Bookkeeping {
    fn id(&self) -> &str {
        ID
    }

    fn build(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>> {
        Ok(vec![
            acknowledge_received()?,
            update_user()?,
            im_open()?,
            im_close()?,
            redact()?,
        ])
    }
}

fn acknowledge_received() -> RuleResult<Command> {
    Command::builder("acknowledge received")
        .untyped()
        .has_field("reply_to")
        .priority(20)
        .occlusion(Occlusion::Passive)
        .hidden(true)
        .help(
            "Acknowledge the server's acknowledgement of message delivery.\n\n\
             Every message the bot sends is confirmed by the server. A failed \
             delivery is logged; a successful one is remembered in the bot's \
             short history of recent messages.",
        )
        .handler(on_acknowledge)
        .build()
}

fn on_acknowledge(ctx: &BotContext, event: &mut Event, _: &Captures) -> HandlerResult {
    let Some(id) = event.get("reply_to").and_then(Value::as_u64) else {
        return Ok(());
    };
    let Some(PendingMessage { channel, .. }) = ctx.pending().take(id) else {
        debug!(message_id = id, "Acknowledgement for unknown message");
        return Ok(());
    };

    if !event.get("ok").and_then(Value::as_bool).unwrap_or(false) {
        error!(
            message_id = id,
            channel = %channel,
            error = event.get_str("error").unwrap_or("unknown"),
            "Message delivery failed"
        );
        return Ok(());
    }

    event.set("channel", channel);
    ctx.history().push(event.clone());
    Ok(())
}

fn update_user() -> RuleResult<Command> {
    Command::builder("update user")
        .actions(["team_join", "user_change"])
        .occlusion(Occlusion::Passive)
        .hidden(true)
        .help("Learn about users who join or change their profile.")
        .handler(|ctx, event, _| {
            let user = event.get("user").cloned().context("event has no user")?;
            let user: UserInfo =
                serde_json::from_value(user).context("user record is malformed")?;
            debug!(user_id = %user.id, name = %user.name, "Updating user");
            ctx.directory().upsert_user(user);
            Ok(())
        })
        .build()
}

fn im_open() -> RuleResult<Command> {
    Command::builder("im open")
        .actions(["im_open"])
        .occlusion(Occlusion::Passive)
        .hidden(true)
        .help("Remember the direct-message channel opened with a user.")
        .handler(|ctx, event, _| {
            let (Some(user), Some(channel)) = (event.user(), event.channel()) else {
                return Ok(());
            };
            if !ctx.directory().set_im(user, Some(channel.to_string())) {
                debug!(user_id = %user, "im_open for unknown user");
            }
            Ok(())
        })
        .build()
}

fn im_close() -> RuleResult<Command> {
    Command::builder("im close")
        .actions(["im_close"])
        .occlusion(Occlusion::Passive)
        .hidden(true)
        .help("Forget a closed direct-message channel.")
        .handler(|ctx, event, _| {
            if let Some(user) = event.user() {
                ctx.directory().set_im(user, None);
            }
            Ok(())
        })
        .build()
}

fn redact() -> RuleResult<Command> {
    Command::builder("redact")
        .rule(["$@bot", "redact"])
        .occlusion(Occlusion::Exclusive)
        .help("Remove the text of the bot's previous message in this channel.")
        .handler(|ctx, _, _| {
            let Some(channel) = ctx.channel() else {
                return Ok(());
            };
            let Some(ts) = ctx
                .history()
                .latest_in(channel)
                .and_then(|m| m.get_str("ts").map(str::to_string))
            else {
                return Ok(());
            };
            ctx.edit_message(&ts, channel, REDACTED)?;
            Ok(())
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brass_core::testing::{MemoryTransport, MessageUpdate, test_bot};
    use std::sync::Arc;

    fn setup() -> (Dispatcher, Arc<MemoryTransport>) {
        let (bot, transport) = test_bot(MemoryTransport::default());
        bot.install_module(Arc::new(Bookkeeping));
        assert!(bot.load_modules().is_empty());
        (Dispatcher::new(bot), transport)
    }

    #[test]
    fn test_acknowledgement_goes_to_history() {
        let (dispatcher, transport) = setup();
        let bot = dispatcher.bot();
        bot.say("hello", "C1").unwrap();
        let sent = transport.sent().remove(0);
        assert_eq!(bot.pending().len(), 1);

        let report = dispatcher.dispatch(MemoryTransport::ack_for(&sent, "1700.01"));
        assert_eq!(report.fired, ["acknowledge received"]);
        assert!(bot.pending().is_empty());

        let latest = bot.history().latest_in("C1").unwrap();
        assert_eq!(latest.get_str("ts"), Some("1700.01"));
        assert_eq!(latest.channel(), Some("C1"));
    }

    #[test]
    fn test_failed_or_unknown_acknowledgement_is_ignored() {
        let (dispatcher, transport) = setup();
        let bot = dispatcher.bot();
        bot.say("hello", "C1").unwrap();
        let sent = transport.sent().remove(0);

        let mut failed = MemoryTransport::ack_for(&sent, "1700.01");
        failed.set("ok", false);
        failed.set("error", "rate_limited");
        dispatcher.dispatch(failed);
        dispatcher.dispatch(Event::untyped().with("reply_to", 9).with("ok", true));

        assert!(bot.pending().is_empty());
        assert!(bot.history().is_empty());
    }

    #[test]
    fn test_directory_updates() {
        let (dispatcher, _transport) = setup();
        let bot = dispatcher.bot();

        dispatcher.dispatch(
            Event::new("team_join").with("user", serde_json::json!({"id": "U7", "name": "carol"})),
        );
        assert_eq!(bot.directory().nick("U7").as_deref(), Some("carol"));

        dispatcher.dispatch(Event::new("im_open").with("user", "U7").with("channel", "D7"));
        assert_eq!(bot.directory().user_im("carol").as_deref(), Some("D7"));

        dispatcher.dispatch(Event::new("im_close").with("user", "U7").with("channel", "D7"));
        assert_eq!(bot.directory().user_im("carol"), None);
    }

    #[test]
    fn test_redact_edits_latest_message_in_channel() {
        let (dispatcher, transport) = setup();
        let bot = dispatcher.bot();
        for (text, ts) in [("first", "1.0"), ("second", "2.0")] {
            bot.say(text, "C1").unwrap();
            let sent = transport.sent().pop().unwrap();
            dispatcher.dispatch(MemoryTransport::ack_for(&sent, ts));
        }

        dispatcher.dispatch(Event::message("<@U42> redact").with("channel", "C1"));
        assert_eq!(
            transport.updates(),
            [MessageUpdate {
                ts: "2.0".to_string(),
                channel: "C1".to_string(),
                text: REDACTED.to_string(),
            }]
        );

        dispatcher.dispatch(Event::message("<@U42> redact").with("channel", "C9"));
        assert_eq!(transport.updates().len(), 1);
    }
}
