//! Built-in command modules for Brass.
//!
//! | Module | Id | Commands |
//! |--------|----|----------|
//! | [`Bookkeeping`] | `bookkeeping` | delivery acknowledgements, directory updates, `redact` |
//! | [`Console`] | `console` | logs messages, edits, typing and presence |
//! | [`Help`] | `help` | `commands`, `help <name>`, `man [<name>]` |
//! | [`Friendly`] | `friendly` | greetings, high fives |
//! | [`Admin`] | `admin` | `reload <module>`, `modules` |
//!
//! `bookkeeping` keeps the session's directory and sent-message history
//! current, so almost every bot wants it.
//!
//! ```rust,ignore
//! let runtime = BrassRuntime::builder()
//!     .transport(transport)
//!     .module(brass_modules::Bookkeeping)
//!     .module(brass_modules::Help)
//!     .build()?;
//! // or
//! for module in brass_modules::builtin() {
//!     runtime.install_arc(module);
//! }
//! ```

use std::sync::Arc;

use brass_core::ModuleProvider;

pub mod admin;
pub mod bookkeeping;
pub mod console;
pub mod friendly;
pub mod help;

pub use admin::Admin;
pub use bookkeeping::Bookkeeping;
pub use console::Console;
pub use friendly::Friendly;
pub use help::Help;

/// Every built-in module, bookkeeping first.
pub fn builtin() -> Vec<Arc<dyn ModuleProvider>> {
    vec![
        Arc::new(Bookkeeping),
        Arc::new(Console),
        Arc::new(Help),
        Arc::new(Friendly),
        Arc::new(Admin),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use brass_core::testing::{MemoryTransport, test_bot};
    use brass_core::{Dispatcher, Event};

    #[test]
    fn test_builtin_modules_load_together() {
        let (bot, transport) = test_bot(MemoryTransport::default());
        for module in builtin() {
            bot.install_module(module);
        }
        assert!(bot.load_modules().is_empty());
        assert_eq!(
            bot.registry().module_ids(),
            ["admin", "bookkeeping", "console", "friendly", "help"]
        );

        let dispatcher = Dispatcher::new(Arc::clone(&bot));
        let greeting = dispatcher.dispatch(
            Event::message("hi <@U42>")
                .with("channel", "C1")
                .with("user", "U2"),
        );
        assert_eq!(greeting.fired, ["log message", "say hello"]);
        assert!(greeting.event.is_logged() && greeting.event.is_occluded());

        let sent = transport.sent().remove(0);
        assert_eq!(sent.text(), Some("Hi <@U2>!"));
        let ack = dispatcher.dispatch(MemoryTransport::ack_for(&sent, "5.0"));
        assert_eq!(ack.fired, ["acknowledge received", "log received"]);
        assert_eq!(bot.history().len(), 1);

        dispatcher.dispatch(Event::message("<@U42> redact").with("channel", "C1"));
        assert_eq!(transport.updates()[0].ts, "5.0");
    }
}
