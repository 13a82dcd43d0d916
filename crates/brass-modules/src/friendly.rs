//! Small talk.

use brass_core::RuleResult;
use brass_core::prelude::*;

/// Module id.
pub const ID: &str = "friendly";

const HIGH_FIVE: &str = r"hi(?:gh)?[ -]?(?:five|5)";

/// Greetings and high fives.
#[derive(Debug, Default, Clone, Copy)]
pub struct Friendly;

impl ModuleProvider for Friendly {
    fn id(&self) -> &str {
        ID
    }

    fn build(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>> {
        Ok(vec![
            say_hello()?,
            high_five(format!(r"(?i){HIGH_FIVE}[, ]*$@bot"))?,
            high_five(format!(r"$@bot (?i){HIGH_FIVE}"))?,
        ])
    }
}

fn say_hello() -> RuleResult<Command> {
    Command::builder("say hello")
        .rule(r"[Hh]i $@bot!?")
        .hidden(true)
        .occlusion(Occlusion::Exclusive)
        .help("Greet the nice people who say hello to you.")
        .handler(|ctx, event, _| {
            match event.get_str("user_name") {
                Some(name) => ctx.reply(format!("Hi @{name}!"))?,
                None => ctx.reply("Hi!")?,
            }
            Ok(())
        })
        .build()
}

fn high_five(rule: String) -> RuleResult<Command> {
    Command::builder("high five")
        .rule(rule)
        .hidden(true)
        .priority(-5)
        .occlusion(Occlusion::Exclusive)
        .help("High five!")
        .handler(|ctx, _, _| {
            ctx.reply(":hand:")?;
            Ok(())
        })
        .build()
}
