//! Command discovery: `commands`, `help <name>` and `man [<name>]`.

use std::sync::Arc;

use brass_core::RuleResult;
use brass_core::prelude::*;

/// Module id.
pub const ID: &str = "help";

const UNKNOWN: &str = "I don't recognize that command.";
const NO_HELP: &str = "No helpful information provided for this command.";

/// Lists commands and shows their documentation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Help;

impl ModuleProvider for Help {
    fn id(&self) -> &str {
        ID
    }

    fn build(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>> {
        Ok(vec![commands()?, help()?, man()?])
    }
}

/// Names of visible commands in dispatch order, without repeats.
fn visible_names(commands: &[Arc<Command>]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for command in commands.iter().filter(|c| !c.is_hidden()) {
        if !names.contains(&command.name()) {
            names.push(command.name());
        }
    }
    names
}

fn find<'a>(commands: &'a [Arc<Command>], name: &str) -> Option<&'a Arc<Command>> {
    let name = name.trim();
    commands
        .iter()
        .find(|c| !c.is_hidden() && c.name() == name)
}

fn commands() -> RuleResult<Command> {
    Command::builder("commands")
        .rule(r"$@bot (?:help|commands) *$")
        .occlusion(Occlusion::Exclusive)
        .help("List the available commands.")
        .handler(|ctx, _, _| {
            let commands = ctx.commands();
            ctx.reply(format!(
                "Available commands: {}",
                visible_names(&commands).join(", ")
            ))?;
            Ok(())
        })
        .build()
}

fn help() -> RuleResult<Command> {
    Command::builder("help")
        .rule(r"$@bot help (\w.*)")
        .priority(-10)
        .occlusion(Occlusion::Exclusive)
        .help(
            "Get a short blurb of information about a command.\n\n\
             For more in-depth information, see the `man` command.",
        )
        .handler(|ctx, _, captures| {
            let commands = ctx.commands();
            let reply = match find(&commands, captures.get(0).unwrap_or_default()) {
                None => UNKNOWN,
                Some(command) => command.help().unwrap_or(NO_HELP),
            };
            ctx.reply(reply)?;
            Ok(())
        })
        .build()
}

fn man() -> RuleResult<Command> {
    Command::builder("man")
        .rule(r"$@bot man(?: (\w.*))?")
        .priority(-10)
        .occlusion(Occlusion::Exclusive)
        .help(
            "Get the full documentation for a command.\n\n\
             For a quicker snapshot of a command's functionality, see the \
             `help` command.",
        )
        .handler(|ctx, _, captures| {
            let Some(query) = captures.get(0) else {
                ctx.reply(format!("Usage: `@{}: man [command]`", ctx.identity().name))?;
                return Ok(());
            };
            let commands = ctx.commands();
            let reply = match find(&commands, query) {
                None => UNKNOWN,
                Some(command) => command.full_help().unwrap_or(NO_HELP),
            };
            ctx.reply(reply)?;
            Ok(())
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brass_core::testing::{MemoryTransport, test_bot};

    struct Extras;

    impl ModuleProvider for Extras {
        fn id(&self) -> &str {
            "extras"
        }

        fn build(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>> {
            Ok(vec![
                Command::builder("roll")
                    .rule("$@bot roll")
                    .occlusion(Occlusion::Exclusive)
                    .help("Roll a die.\n\nRolls a six-sided die and reports the result.")
                    .handler(|_, _, _| Ok(()))
                    .build()?,
                Command::builder("secret")
                    .rule("$@bot secret")
                    .hidden(true)
                    .occlusion(Occlusion::Exclusive)
                    .help("Hidden.")
                    .handler(|_, _, _| Ok(()))
                    .build()?,
                Command::builder("mute")
                    .rule("$@bot mute")
                    .occlusion(Occlusion::Exclusive)
                    .handler(|_, _, _| Ok(()))
                    .build()?,
            ])
        }
    }

    fn ask(questions: &[&str]) -> Vec<String> {
        let (bot, transport) = test_bot(MemoryTransport::default());
        bot.install_module(Arc::new(Help));
        bot.install_module(Arc::new(Extras));
        assert!(bot.load_modules().is_empty());
        let dispatcher = Dispatcher::new(bot);
        for question in questions {
            dispatcher.dispatch(Event::message(*question).with("channel", "C1"));
        }
        transport.sent_texts()
    }

    #[test]
    fn test_commands_lists_visible_names() {
        let replies = ask(&["<@U42> commands", "<@U42> help"]);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], replies[1]);
        assert!(replies[0].starts_with("Available commands: "));
        assert!(replies[0].contains("roll"));
        assert!(replies[0].contains("man"));
        assert!(!replies[0].contains("secret"));
    }

    #[test]
    fn test_help_shows_first_paragraph() {
        let replies = ask(&[
            "<@U42> help roll",
            "<@U42> help secret",
            "<@U42> help mute",
        ]);
        assert_eq!(replies, ["Roll a die.", UNKNOWN, NO_HELP]);
    }

    #[test]
    fn test_man_shows_full_help_or_usage() {
        let replies = ask(&["<@U42> man roll", "<@U42> man"]);
        assert_eq!(
            replies,
            [
                "Roll a die.\n\nRolls a six-sided die and reports the result.",
                "Usage: `@brassbot: man [command]`",
            ]
        );
    }
}
