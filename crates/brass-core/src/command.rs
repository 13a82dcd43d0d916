//! Commands: the unit of registered behavior.
//!
//! A [`Command`] gates a handler behind a series of filters and carries its
//! own lifecycle limits. Commands are built with [`CommandBuilder`]:
//!
//! ```rust,ignore
//! use brass_core::command::{Command, Occlusion};
//!
//! let hello = Command::builder("say hello")
//!     .rule(r"[Hh]i $@bot!?")
//!     .occlusion(Occlusion::Exclusive)
//!     .hidden(true)
//!     .handler(|ctx, event, _| {
//!         ctx.reply(format!("Hi @{}!", event.get_str("user_name").unwrap_or("there")))?;
//!         Ok(())
//!     })
//!     .build()?;
//! ```
//!
//! # Evaluation order
//!
//! [`Command::matches`] short-circuits on the first failing check:
//!
//! 1. action type
//! 2. occlusion (occludable commands skip occluded events)
//! 3. required fields
//! 4. sender filter
//! 5. text rule

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error};

use crate::context::BotContext;
use crate::dispatcher::panic_message;
use crate::error::{RuleError, RuleResult};
use crate::event::{Event, MESSAGE};
use crate::placeholder::PlaceholderTable;
use crate::rule::{Captures, Rule, RuleSpec, SenderFilter, SenderSpec, compile};

/// Result type returned by handlers.
pub type HandlerResult = anyhow::Result<()>;

// ============================================================================
// Handler
// ============================================================================

/// Handler logic invoked when a command fires.
///
/// Implemented for every `Fn(&BotContext, &mut Event, &Captures) -> HandlerResult`
/// closure, so most code never names this trait.
pub trait Handler: Send + Sync + 'static {
    /// Runs the handler.
    fn call(&self, ctx: &BotContext, event: &mut Event, captures: &Captures) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&BotContext, &mut Event, &Captures) -> HandlerResult + Send + Sync + 'static,
{
    fn call(&self, ctx: &BotContext, event: &mut Event, captures: &Captures) -> HandlerResult {
        self(ctx, event, captures)
    }
}

/// A type-erased, shareable handler.
pub type BoxedHandler = Arc<dyn Handler>;

// ============================================================================
// Filters
// ============================================================================

/// An action-type tag a command responds to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Events whose `type` equals this tag.
    Type(String),
    /// Events without a `type` field (e.g. delivery acknowledgements).
    Untyped,
}

impl Action {
    fn accepts(&self, kind: Option<&str>) -> bool {
        match (self, kind) {
            (Self::Type(tag), Some(kind)) => tag == kind,
            (Self::Untyped, None) => true,
            _ => false,
        }
    }
}

impl From<&str> for Action {
    fn from(tag: &str) -> Self {
        Self::Type(tag.to_string())
    }
}

/// Required value for a field filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMatch {
    /// The field must be present with exactly this value.
    Equals(Value),
    /// The field must be present; any value is accepted.
    Any,
}

impl FieldMatch {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Equals(expected) => expected == value,
            Self::Any => true,
        }
    }
}

impl<T: Into<Value>> From<T> for FieldMatch {
    fn from(value: T) -> Self {
        Self::Equals(value.into())
    }
}

/// Named occlusion presets.
///
/// Every command must state how it interacts with occlusion; the presets
/// cover the four combinations of `occludes` and `occludable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occlusion {
    /// Fires only on unoccluded events and occludes them.
    Exclusive,
    /// Always fires, never occludes. Used for bookkeeping and logging.
    Passive,
    /// Fires only on unoccluded events, never occludes.
    Yielding,
    /// Always fires and occludes.
    Dominant,
}

impl Occlusion {
    /// Returns `(occludes, occludable)`.
    pub fn flags(self) -> (bool, bool) {
        match self {
            Self::Exclusive => (true, true),
            Self::Passive => (false, false),
            Self::Yielding => (false, true),
            Self::Dominant => (true, false),
        }
    }
}

// ============================================================================
// Command
// ============================================================================

/// A registered behavior: filters, lifecycle limits and a handler.
pub struct Command {
    name: String,
    full_help: Option<String>,
    hidden: bool,

    rule: Rule,
    sender: SenderFilter,
    actions: Vec<Action>,
    fields: Vec<(String, FieldMatch)>,

    priority: i32,
    deadline: Option<Instant>,
    activations: Mutex<Option<u32>>,

    occludes: bool,
    occludable: bool,
    threaded: bool,

    handler: BoxedHandler,

    owner: Mutex<Option<String>>,
    sequence: AtomicU64,
}

impl Command {
    /// Starts building a command with the given display name.
    pub fn builder(name: impl Into<String>) -> CommandBuilder {
        CommandBuilder::new(name)
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full help text.
    pub fn full_help(&self) -> Option<&str> {
        self.full_help.as_deref()
    }

    /// Short help: the first paragraph of the full help text.
    pub fn help(&self) -> Option<&str> {
        self.full_help
            .as_deref()
            .map(|text| text.split("\n\n").next().unwrap_or(text))
    }

    /// Hidden commands are omitted from command listings.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// The text rule.
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Action types this command responds to.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Priority. Higher runs first.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Absolute expiry time, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Remaining activations, or `None` if unlimited.
    pub fn remaining_activations(&self) -> Option<u32> {
        *self.activations.lock()
    }

    /// Whether firing this command occludes the event.
    pub fn occludes(&self) -> bool {
        self.occludes
    }

    /// Whether this command skips already-occluded events.
    pub fn occludable(&self) -> bool {
        self.occludable
    }

    /// Whether the handler runs on its own task.
    pub fn is_threaded(&self) -> bool {
        self.threaded
    }

    /// Id of the module currently owning this command.
    pub fn module(&self) -> Option<String> {
        self.owner.lock().clone()
    }

    /// Returns `true` once the deadline has passed.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Returns `true` once a finite activation count reached zero.
    pub fn is_exhausted(&self) -> bool {
        matches!(*self.activations.lock(), Some(0))
    }

    /// Checks whether `event` should trigger this command.
    ///
    /// Returns the rule captures on a match. A rule that fails to compile is
    /// reported as an error rather than a non-match.
    pub fn matches(
        &self,
        event: &Event,
        placeholders: &PlaceholderTable,
    ) -> RuleResult<Option<Captures>> {
        let kind = event.kind();
        if !self.actions.iter().any(|action| action.accepts(kind)) {
            return Ok(None);
        }

        if self.occludable && event.is_occluded() {
            return Ok(None);
        }

        for (field, required) in &self.fields {
            match event.get(field) {
                Some(value) if required.accepts(value) => {}
                _ => return Ok(None),
            }
        }

        if !self.sender.is_any() {
            let sender = event.get_str("user_name").or_else(|| event.user());
            if !self.sender.accepts(sender) {
                return Ok(None);
            }
        }

        let matcher = self.rule.matcher(placeholders)?;
        if self.rule.is_unset() {
            return Ok(matcher.captures(""));
        }
        Ok(event.text().and_then(|text| matcher.captures(text)))
    }

    /// Runs the command on a matched event.
    ///
    /// Decrements a finite activation count and marks the event occluded if
    /// this command occludes. Threaded commands are spawned on the bot's
    /// task set with a copy of the event and return immediately; otherwise
    /// the handler's result is returned. Removal of an exhausted command is
    /// left to the caller.
    pub fn invoke(
        self: &Arc<Self>,
        ctx: &BotContext,
        event: &mut Event,
        captures: Captures,
    ) -> HandlerResult {
        {
            let mut activations = self.activations.lock();
            if let Some(remaining) = activations.as_mut() {
                *remaining = remaining.saturating_sub(1);
            }
        }

        if self.occludes {
            event.mark_occluded();
        }

        if !self.threaded {
            return self.handler.call(ctx, event, &captures);
        }

        let handler = Arc::clone(&self.handler);
        let name = self.name.clone();
        let tasks = ctx.tasks().clone();
        let ctx = ctx.clone();
        let mut event = event.clone();
        debug!(command = %name, "Spawning threaded handler");
        tasks.spawn_blocking(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                handler.call(&ctx, &mut event, &captures)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(command = %name, event = %event, error = %e, "Threaded handler failed");
                }
                Err(payload) => {
                    error!(
                        command = %name,
                        event = %event,
                        panic = panic_message(payload.as_ref()),
                        "Threaded handler panicked"
                    );
                }
            }
        });
        Ok(())
    }

    pub(crate) fn claim(&self, module: &str) -> Result<(), String> {
        let mut owner = self.owner.lock();
        match owner.as_deref() {
            Some(current) if current != module => Err(current.to_string()),
            _ => {
                *owner = Some(module.to_string());
                Ok(())
            }
        }
    }

    pub(crate) fn release(&self) {
        *self.owner.lock() = None;
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Assigns the registration sequence number once; later calls keep it.
    pub(crate) fn assign_sequence(&self, sequence: u64) {
        let _ = self
            .sequence
            .compare_exchange(0, sequence, Ordering::AcqRel, Ordering::Acquire);
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("module", &self.module())
            .field("priority", &self.priority)
            .field("rule", &self.rule)
            .field("actions", &self.actions)
            .field("activations", &self.remaining_activations())
            .field("occludes", &self.occludes)
            .field("occludable", &self.occludable)
            .field("threaded", &self.threaded)
            .finish()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ============================================================================
// CommandBuilder
// ============================================================================

/// Builder for [`Command`].
///
/// Defaults: no text rule, any sender, the `message` action, priority 0, no
/// deadline, unlimited activations, not threaded, not hidden. Occlusion has
/// no default and must be chosen.
pub struct CommandBuilder {
    name: String,
    full_help: Option<String>,
    hidden: bool,
    rule: RuleSpec,
    sender: SenderSpec,
    actions: Vec<Action>,
    fields: Vec<(String, FieldMatch)>,
    priority: i32,
    deadline: Option<Instant>,
    activations: Option<u32>,
    occludes: Option<bool>,
    occludable: Option<bool>,
    threaded: bool,
    handler: Option<BoxedHandler>,
}

impl CommandBuilder {
    /// Creates a builder with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            full_help: None,
            hidden: false,
            rule: RuleSpec::Unset,
            sender: SenderSpec::Any,
            actions: vec![Action::Type(MESSAGE.to_string())],
            fields: Vec::new(),
            priority: 0,
            deadline: None,
            activations: None,
            occludes: None,
            occludable: None,
            threaded: false,
            handler: None,
        }
    }

    /// Sets the text rule.
    pub fn rule(mut self, rule: impl Into<RuleSpec>) -> Self {
        self.rule = rule.into();
        self
    }

    /// Restricts the sender to names matching `pattern` from the start.
    pub fn sender(mut self, pattern: impl Into<String>) -> Self {
        self.sender = SenderSpec::Pattern(pattern.into());
        self
    }

    /// Restricts the sender to one of the given name patterns.
    pub fn senders<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sender = SenderSpec::OneOf(names.into_iter().map(Into::into).collect());
        self
    }

    /// Replaces the accepted action types.
    pub fn actions<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Action>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Accepts only untyped events.
    pub fn untyped(mut self) -> Self {
        self.actions = vec![Action::Untyped];
        self
    }

    /// Requires `field` to be present and match.
    pub fn field(mut self, field: impl Into<String>, required: impl Into<FieldMatch>) -> Self {
        self.fields.push((field.into(), required.into()));
        self
    }

    /// Requires `field` to be present with any value.
    pub fn has_field(self, field: impl Into<String>) -> Self {
        self.field(field, FieldMatch::Any)
    }

    /// Sets the priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Expires the command `ttl` from now.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.deadline = Some(Instant::now() + ttl);
        self
    }

    /// Expires the command at an absolute instant.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Limits the number of times the command may fire.
    pub fn activations(mut self, activations: u32) -> Self {
        self.activations = Some(activations);
        self
    }

    /// Chooses both occlusion flags from a preset.
    pub fn occlusion(mut self, occlusion: Occlusion) -> Self {
        let (occludes, occludable) = occlusion.flags();
        self.occludes = Some(occludes);
        self.occludable = Some(occludable);
        self
    }

    /// Sets whether firing occludes the event.
    pub fn occludes(mut self, occludes: bool) -> Self {
        self.occludes = Some(occludes);
        self
    }

    /// Sets whether the command skips occluded events.
    pub fn occludable(mut self, occludable: bool) -> Self {
        self.occludable = Some(occludable);
        self
    }

    /// Runs the handler on its own task.
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    /// Hides the command from listings.
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    /// Sets the help text. The first paragraph doubles as the short help.
    pub fn help(mut self, text: impl Into<String>) -> Self {
        self.full_help = Some(text.into());
        self
    }

    /// Sets the handler.
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&BotContext, &mut Event, &Captures) -> HandlerResult + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Sets a shared handler, e.g. one used by several commands.
    pub fn boxed_handler(mut self, handler: BoxedHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Validates the configuration and builds the command.
    ///
    /// The rule is test-compiled against a neutral placeholder table so that
    /// syntax errors surface here rather than at dispatch time. The result is
    /// not cached; the first match compiles against the bot's own table.
    pub fn build(self) -> RuleResult<Command> {
        let name = self.name;
        let (Some(occludes), Some(occludable)) = (self.occludes, self.occludable) else {
            return Err(RuleError::configuration(
                &name,
                "occlusion must be chosen explicitly",
            ));
        };
        let Some(handler) = self.handler else {
            return Err(RuleError::configuration(&name, "missing handler"));
        };
        if self.actions.is_empty() {
            return Err(RuleError::configuration(&name, "no action types"));
        }
        if self.activations == Some(0) {
            return Err(RuleError::configuration(
                &name,
                "activations must be positive",
            ));
        }

        let sender = SenderFilter::compile(&name, &self.sender)?;
        compile(&self.rule, &PlaceholderTable::default())?;
        let rule = Rule::new(self.rule);

        Ok(Command {
            name,
            full_help: self.full_help,
            hidden: self.hidden,
            rule,
            sender,
            actions: self.actions,
            fields: self.fields,
            priority: self.priority,
            deadline: self.deadline,
            activations: Mutex::new(self.activations),
            occludes,
            occludable,
            threaded: self.threaded,
            handler,
            owner: Mutex::new(None),
            sequence: AtomicU64::new(0),
        })
    }
}
