//! Console Bot Example
//!
//! Chat with a Brass bot from the terminal. Every line typed on stdin is a
//! message in `#general`; the bot's replies are printed to stdout and its
//! logs go to stderr.
//!
//! Besides the built-in modules, this demo installs a `quiz` module showing
//! a follow-up command that lives for one answer or thirty seconds:
//!
//! ```text
//! you> @brass quiz
//! #general brass: Is the borrow checker your friend?
//! you> yes
//! #general brass: Correct!
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package console-bot -- --name brass --user you
//! ```

mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use brass::prelude::*;
use clap::Parser;
use tracing::info;

use crate::transport::ConsoleTransport;

#[derive(Debug, Parser)]
#[command(name = "console-bot", about = "Chat with a Brass bot from the terminal")]
struct Args {
    /// Configuration file; searched in the usual places when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration profile (`dev`, `prod`, ...).
    #[arg(short, long)]
    profile: Option<String>,

    /// The bot's user name.
    #[arg(long, default_value = "brass")]
    name: String,

    /// Your user name.
    #[arg(long, default_value = "you")]
    user: String,
}

// ============================================================================
// Quiz Module
// ============================================================================

struct Quiz;

impl ModuleProvider for Quiz {
    fn id(&self) -> &str {
        "quiz"
    }

    fn build(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>> {
        let ask = Command::builder("quiz")
            .rule("$@bot quiz *$")
            .occlusion(Occlusion::Exclusive)
            .help("Ask a yes-or-no question.\n\nAnswer within thirty seconds.")
            .handler(|ctx, _, _| {
                ctx.reply("Is the borrow checker your friend?")?;
                let answer = Command::builder("quiz answer")
                    .rule("$yes|$no")
                    .priority(10)
                    .activations(1)
                    .ttl(Duration::from_secs(30))
                    .hidden(true)
                    .occlusion(Occlusion::Exclusive)
                    .handler(|ctx, event, _| {
                        let yes = event.text().is_some_and(|t| !t.trim().starts_with('n'));
                        ctx.reply(if yes { "Correct!" } else { "It will grow on you." })?;
                        Ok(())
                    })
                    .build()?;
                ctx.register_command("quiz", answer)?;
                Ok(())
            })
            .build()?;
        Ok(vec![ask])
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let transport = Arc::new(ConsoleTransport::new(&args.name, &args.user));

    let mut builder = BrassRuntime::builder()
        .boxed_transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .set("logging.output", "stderr");
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile.clone());
    }
    let runtime = builder.build()?;

    for module in brass::modules::builtin() {
        runtime.install_arc(module);
    }
    runtime.install(Quiz);

    info!(bot = %args.name, "Type a message, mention @{} to talk to the bot. Ctrl+D quits.", args.name);

    runtime
        .run_until(async {
            tokio::select! {
                _ = transport.closed() => info!("End of input"),
                _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C"),
            }
        })
        .await?;

    Ok(())
}
