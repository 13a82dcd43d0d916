//! Event dispatcher.
//!
//! The [`Dispatcher`] owns the inbound queue and the single consumer loop
//! that drives every event through:
//!
//! 1. normalization
//! 2. a snapshot of the registry's ordered command list
//! 3. a priority-ordered scan: expired commands are set aside, the rest are
//!    matched and invoked; commands that used their last activation are set
//!    aside too
//! 4. removal of everything set aside
//! 5. reporting of unhandled events
//!
//! Handler failures, panics included, are caught per command and passed to
//! the [`DispatchObserver`]; they never stop the scan or the loop.
//!
//! ```rust,ignore
//! let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&bot)));
//! transport.on_receive(dispatcher.sink());
//! tokio::spawn({
//!     let dispatcher = Arc::clone(&dispatcher);
//!     async move { dispatcher.run().await }
//! });
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, span, trace, warn};

use crate::bot::Bot;
use crate::command::Command;
use crate::context::BotContext;
use crate::error::DispatchError;
use crate::event::Event;
use crate::normalize::normalize;
use crate::transport::EventSink;

// =============================================================================
// Observer
// =============================================================================

/// Receives dispatch outcomes that are not failures of the loop itself.
pub trait DispatchObserver: Send + Sync + 'static {
    /// A command failed while matching or running.
    fn on_failure(&self, error: &DispatchError, event: &Event);

    /// No command logged or occluded the event.
    fn on_unhandled(&self, _event: &Event) {}
}

/// Observer that reports through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn on_failure(&self, error: &DispatchError, event: &Event) {
        error!(error = %error, event = %event, "Command failed");
    }

    fn on_unhandled(&self, event: &Event) {
        debug!(event = %event, "Unhandled event");
    }
}

// =============================================================================
// Report
// =============================================================================

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Names of the commands that fired, in order.
    pub fired: Vec<String>,
    /// Number of commands removed because their deadline passed.
    pub expired: usize,
    /// Number of commands removed because they ran out of activations.
    pub exhausted: usize,
    /// Number of failures passed to the observer.
    pub failures: usize,
    /// Whether some command logged or occluded the event.
    pub handled: bool,
    /// The event after dispatch, with every marker applied.
    pub event: Event,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Single-consumer event dispatcher.
pub struct Dispatcher {
    bot: Arc<Bot>,
    sender: mpsc::UnboundedSender<Event>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    observer: Arc<dyn DispatchObserver>,
}

impl Dispatcher {
    /// Creates a dispatcher reporting through [`TracingObserver`].
    pub fn new(bot: Arc<Bot>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            bot,
            sender,
            receiver: Mutex::new(Some(receiver)),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replaces the observer.
    pub fn with_observer(mut self, observer: impl DispatchObserver) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// The bot this dispatcher serves.
    pub fn bot(&self) -> &Arc<Bot> {
        &self.bot
    }

    /// Queues an event. Never blocks.
    ///
    /// Returns `false` if the loop has shut down.
    pub fn enqueue(&self, event: Event) -> bool {
        self.sender.send(event).is_ok()
    }

    /// A receive callback for the transport that enqueues into this
    /// dispatcher.
    pub fn sink(&self) -> EventSink {
        let sender = self.sender.clone();
        EventSink::new(move |event| {
            if sender.send(event).is_err() {
                trace!("Dispatcher stopped; dropping event");
            }
        })
    }

    /// Runs the dispatch loop until the bot's stop signal fires.
    ///
    /// Only the first call runs; later calls return immediately.
    pub async fn run(&self) {
        let Some(mut receiver) = self.receiver.lock().take() else {
            warn!("Dispatcher loop already running");
            return;
        };
        let signal = self.bot.tasks().signal();
        info!("Dispatcher started");

        loop {
            tokio::select! {
                biased;
                _ = signal.stopped() => break,
                event = receiver.recv() => match event {
                    Some(event) => {
                        self.dispatch(event);
                    }
                    None => break,
                },
            }
        }

        receiver.close();
        info!("Dispatcher stopped");
    }

    /// Dispatches one event synchronously.
    pub fn dispatch(&self, mut event: Event) -> DispatchReport {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            event_type = event.kind().unwrap_or("<untyped>")
        );
        let _enter = span.enter();

        normalize(self.bot.directory(), &mut event);

        let registry = self.bot.registry();
        let placeholders = self.bot.placeholders();
        let ctx = BotContext::new(Arc::clone(&self.bot), &event);
        let commands = registry.all_commands();
        let now = Instant::now();

        let mut report = DispatchReport::default();
        let mut retired: Vec<Arc<Command>> = Vec::new();

        for command in commands.iter() {
            if command.is_expired(now) {
                trace!(command = %command.name(), "Command expired");
                report.expired += 1;
                retired.push(Arc::clone(command));
                continue;
            }

            let captures = match command.matches(&event, placeholders) {
                Ok(Some(captures)) => captures,
                Ok(None) => continue,
                Err(source) => {
                    let error = DispatchError::Rule {
                        command: command.name().to_string(),
                        source,
                    };
                    self.observer.on_failure(&error, &event);
                    report.failures += 1;
                    continue;
                }
            };

            debug!(command = %command.name(), priority = command.priority(), "Command matched");
            report.fired.push(command.name().to_string());

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                command.invoke(&ctx, &mut event, captures)
            }));
            let result = outcome.unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!(command = %command.name(), panic = message, "Handler panicked");
                Err(anyhow::anyhow!("panicked: {message}"))
            });
            if let Err(source) = result {
                let error = DispatchError::Handler {
                    command: command.name().to_string(),
                    source,
                };
                self.observer.on_failure(&error, &event);
                report.failures += 1;
            }

            if command.is_exhausted() {
                trace!(command = %command.name(), "Command exhausted");
                report.exhausted += 1;
                retired.push(Arc::clone(command));
            }
        }

        for command in &retired {
            registry.unregister_command(command);
        }

        report.handled = event.is_logged() || event.is_occluded();
        if !report.handled {
            self.observer.on_unhandled(&event);
        }
        report.event = event;
        report
    }
}

/// Extracts the message of a caught panic.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("bot", &self.bot)
            .finish_non_exhaustive()
    }
}
