//! Module administration from chat.
//!
//! If the configuration bag holds an `admins` list of nicknames, only those
//! users may use these commands.

use brass_core::prelude::*;
use brass_core::{CommandBuilder, RuleError, RuleResult};
use serde_json::Value;
use tracing::info;

/// Module id.
pub const ID: &str = "admin";

/// Config key listing the nicknames allowed to administer the bot.
pub const ADMINS: &str = "admins";

/// `reload <module>` and `modules`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Admin;

impl ModuleProvider for Admin {
    fn id(&self) -> &str {
        ID
    }

    fn build(&self, ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>> {
        let admins = admins(ctx.config(ADMINS))?;
        Ok(vec![reload(admins.clone())?, modules(admins)?])
    }
}

fn admins(value: Option<Value>) -> RuleResult<Option<Vec<String>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let names = value
        .as_array()
        .and_then(|names| {
            names
                .iter()
                .map(|n| n.as_str().map(regex::escape))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| {
            RuleError::configuration(ID, format!("`{ADMINS}` must be a list of nicknames"))
        })?;
    Ok(Some(names))
}

fn restricted(name: &str, admins: Option<Vec<String>>) -> CommandBuilder {
    let builder = Command::builder(name).occlusion(Occlusion::Exclusive);
    match admins {
        Some(admins) => builder.senders(admins),
        None => builder,
    }
}

fn reload(admins: Option<Vec<String>>) -> RuleResult<Command> {
    restricted("reload", admins)
        .rule(r"$@bot reload (\w+)")
        .help(
            "Reload a module.\n\n\
             The module's commands are rebuilt and swapped in at once. If \
             building fails the module keeps its current commands.",
        )
        .handler(|ctx, event, captures| {
            let Some(module) = captures.get(0) else {
                return Ok(());
            };
            info!(
                module,
                by = event.get_str("user_name").unwrap_or("?"),
                "Reload requested"
            );
            match ctx.reload_module(module) {
                Ok(count) => ctx.reply(format!("Reloaded `{module}` ({count} commands)."))?,
                Err(e) => ctx.reply(format!("Could not reload `{module}`: {e}"))?,
            }
            Ok(())
        })
        .build()
}

fn modules(admins: Option<Vec<String>>) -> RuleResult<Command> {
    restricted("modules", admins)
        .rule(r"$@bot modules *$")
        .help("List installed modules and whether their commands are live.")
        .handler(|ctx, _, _| {
            let loaded = ctx.loaded_modules();
            let listing: Vec<String> = ctx
                .installed_modules()
                .into_iter()
                .map(|id| {
                    if loaded.contains(&id) {
                        id
                    } else {
                        format!("{id} (not loaded)")
                    }
                })
                .collect();
            ctx.reply(format!("Modules: {}", listing.join(", ")))?;
            Ok(())
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brass_core::testing::{MemoryTransport, test_bot};
    use brass_core::{Bot, ModuleLoadError};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flaky(Arc<AtomicBool>);

    impl ModuleProvider for Flaky {
        fn id(&self) -> &str {
            "flaky"
        }

        fn build(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>> {
            if self.0.load(Ordering::SeqCst) {
                anyhow::bail!("broken on purpose");
            }
            Ok(vec![
                Command::builder("ping")
                    .rule("$@bot ping")
                    .occlusion(Occlusion::Exclusive)
                    .handler(|ctx, _, _| {
                        ctx.reply("pong")?;
                        Ok(())
                    })
                    .build()?,
            ])
        }
    }

    fn setup(admins: Option<Value>) -> (Arc<Bot>, Dispatcher, Arc<MemoryTransport>, Arc<AtomicBool>) {
        let (bot, transport) = test_bot(MemoryTransport::default());
        if let Some(admins) = admins {
            bot.set_config(ADMINS, admins);
        }
        let broken = Arc::new(AtomicBool::new(false));
        bot.install_module(Arc::new(Admin));
        bot.install_module(Arc::new(Flaky(Arc::clone(&broken))));
        assert!(bot.load_modules().is_empty());
        let dispatcher = Dispatcher::new(Arc::clone(&bot));
        (bot, dispatcher, transport, broken)
    }

    fn say(dispatcher: &Dispatcher, user: &str, text: &str) {
        dispatcher.dispatch(Event::message(text).with("channel", "C1").with("user", user));
    }

    #[test]
    fn test_reload_reports_outcome_and_keeps_commands() {
        let (bot, dispatcher, transport, broken) = setup(None);

        say(&dispatcher, "U1", "<@U42> reload flaky");
        broken.store(true, Ordering::SeqCst);
        say(&dispatcher, "U1", "<@U42> reload flaky");
        say(&dispatcher, "U1", "<@U42> ping");
        say(&dispatcher, "U1", "<@U42> reload ghost");

        let replies = transport.sent_texts();
        assert_eq!(replies[0], "Reloaded `flaky` (1 commands).");
        assert!(replies[1].starts_with("Could not reload `flaky`"));
        assert_eq!(replies[2], "pong");
        assert!(replies[3].starts_with("Could not reload `ghost`"));
        assert!(matches!(
            bot.reload_module("ghost"),
            Err(ModuleLoadError::UnknownModule(_))
        ));
    }

    #[test]
    fn test_modules_listing() {
        let (bot, dispatcher, transport, _broken) = setup(None);
        bot.modules().unload(&bot, "flaky");

        say(&dispatcher, "U2", "<@U42> modules");
        assert_eq!(transport.sent_texts(), ["Modules: admin, flaky (not loaded)"]);
    }

    #[test]
    fn test_admin_list_restricts_senders() {
        let (_bot, dispatcher, transport, _broken) =
            setup(Some(serde_json::json!(["alice"])));

        say(&dispatcher, "U2", "<@U42> modules");
        assert!(transport.sent_texts().is_empty());

        say(&dispatcher, "U1", "<@U42> modules");
        assert_eq!(transport.sent_texts().len(), 1);
    }

    #[test]
    fn test_malformed_admin_list_fails_load() {
        let (bot, _transport) = test_bot(MemoryTransport::default());
        bot.set_config(ADMINS, "alice");
        bot.install_module(Arc::new(Admin));
        let errors = bot.load_modules();
        assert!(matches!(errors.as_slice(), [ModuleLoadError::Rule { .. }]));
    }
}
