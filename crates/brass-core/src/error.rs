//! Unified error types for the Brass core engine.
//!
//! Every layer owns one error enum and a `Result` alias. Handler code is the
//! exception: handlers return [`HandlerResult`](crate::command::HandlerResult)
//! (an `anyhow` result) and the dispatcher wraps failures in
//! [`DispatchError::Handler`].

use thiserror::Error;

// =============================================================================
// Rule Errors
// =============================================================================

/// Errors raised while building or compiling a command's matching rules.
#[derive(Debug, Clone, Error)]
pub enum RuleError {
    /// The rule, sender or field specification is malformed.
    #[error("invalid configuration for '{command}': {reason}")]
    Configuration {
        /// Name of the command being configured.
        command: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The pattern text (after placeholder substitution) does not compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    Pattern {
        /// The expanded pattern text.
        pattern: String,
        /// Reason reported by the regex engine.
        reason: String,
    },
}

impl RuleError {
    /// Creates a configuration error.
    pub fn configuration(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Creates a pattern error from a regex compile failure.
    pub fn pattern(pattern: impl Into<String>, err: &regex::Error) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            reason: err.to_string(),
        }
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors that can occur when mutating the command registry.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The module already has a live command set; unload it first.
    #[error("module '{0}' is already registered")]
    ModuleAlreadyRegistered(String),

    /// A command is already owned by another registry set.
    #[error("command '{command}' already belongs to module '{module}'")]
    CommandAlreadyOwned {
        /// Command display name.
        command: String,
        /// Module currently owning it.
        module: String,
    },
}

// =============================================================================
// Module Load Errors
// =============================================================================

/// Errors raised while loading or hot-reloading a module.
///
/// A failed load never leaves the registry partially updated; the previous
/// command set of the module stays live.
#[derive(Debug, Error)]
pub enum ModuleLoadError {
    /// No provider is installed under this id.
    #[error("unknown module '{0}'")]
    UnknownModule(String),

    /// A command definition in the module was rejected.
    #[error("module '{module}' has an invalid command: {source}")]
    Rule {
        /// Module id.
        module: String,
        /// Underlying rule error.
        #[source]
        source: RuleError,
    },

    /// The registry refused the module's command set.
    #[error("module '{module}' could not be registered: {source}")]
    Registry {
        /// Module id.
        module: String,
        /// Underlying registry error.
        #[source]
        source: RegistryError,
    },

    /// The provider itself failed while building its commands.
    #[error("module '{module}' failed to load: {source}")]
    Provider {
        /// Module id.
        module: String,
        /// Error returned by the provider.
        #[source]
        source: anyhow::Error,
    },
}

impl ModuleLoadError {
    /// Returns the id of the module that failed.
    pub fn module(&self) -> &str {
        match self {
            Self::UnknownModule(module)
            | Self::Rule { module, .. }
            | Self::Registry { module, .. }
            | Self::Provider { module, .. } => module,
        }
    }
}

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Session could not be established (authentication or network failure).
    #[error("connection failed: {reason}")]
    Connection {
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    Closed {
        /// Reason for closure.
        reason: String,
    },

    /// Payload could not be delivered to the transport.
    #[error("failed to send payload: {0}")]
    SendFailed(String),

    /// The transport does not implement this auxiliary call.
    #[error("transport does not support '{0}'")]
    Unsupported(&'static str),
}

impl TransportError {
    /// Creates a connection error.
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Send Errors
// =============================================================================

/// Errors returned by outbound helpers on [`Bot`](crate::bot::Bot).
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The message is longer than the configured limit.
    #[error("message of {len} characters exceeds the limit of {limit}")]
    MessageTooLong {
        /// Length of the rejected text.
        len: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// A user reference could not be resolved.
    #[error("could not parse '{input}' as user.{hint}")]
    UnknownUser {
        /// The raw reference.
        input: String,
        /// Extra hint appended to the message.
        hint: &'static str,
    },

    /// The user has no open direct-message channel.
    #[error("user '{0}' has no direct message channel")]
    NoDirectMessage(String),

    /// A `#name` destination does not name a known channel.
    #[error("unknown channel '{0}'")]
    UnknownChannel(String),

    /// No destination was given and the event carried no channel.
    #[error("no destination channel")]
    NoDestination,

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Failures observed while dispatching an event.
///
/// These are reported to the [`DispatchObserver`](crate::dispatcher::DispatchObserver)
/// and never stop the dispatch loop.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler returned an error.
    #[error("handler '{command}' failed: {source}")]
    Handler {
        /// Command display name.
        command: String,
        /// Error returned by the handler.
        #[source]
        source: anyhow::Error,
    },

    /// A command's rule could not be compiled at match time.
    #[error("command '{command}' could not be matched: {source}")]
    Rule {
        /// Command display name.
        command: String,
        /// Underlying rule error.
        #[source]
        source: RuleError,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for rule compilation.
pub type RuleResult<T> = Result<T, RuleError>;

/// Result type for registry mutations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for module loading.
pub type ModuleResult<T> = Result<T, ModuleLoadError>;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for outbound helpers.
pub type SendResult<T> = Result<T, SendError>;
