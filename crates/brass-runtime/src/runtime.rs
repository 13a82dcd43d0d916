//! Runtime orchestration.
//!
//! [`BrassRuntime`] wires one transport to one bot session:
//!
//! ```text
//! transport ──on_receive──► Dispatcher::sink ──mpsc──► dispatch loop
//!     ▲                                                    │
//!     └──────────────── Bot::say / edit / dm ◄── handlers ─┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use brass_runtime::BrassRuntime;
//!
//! let runtime = BrassRuntime::builder()
//!     .config_file("brass.toml")
//!     .transport(MyTransport::new())
//!     .module(MyModule)
//!     .build()?;
//!
//! // Runs until Ctrl+C / SIGTERM, then shuts down gracefully.
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use brass_core::{Bot, BoxedTransport, Dispatcher, ModuleProvider, Transport};
use parking_lot::Mutex;
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{BrassConfig, ConfigLoader};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
    Stopped,
}

/// Owns a bot session, its dispatcher and its transport.
pub struct BrassRuntime {
    config: BrassConfig,
    bot: Arc<Bot>,
    dispatcher: Arc<Dispatcher>,
    state: Mutex<RunState>,
}

impl BrassRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Initializes logging from `config.logging` unless a subscriber is
    /// already installed.
    pub fn from_config(config: &BrassConfig, transport: BoxedTransport) -> Self {
        logging::init_from_config(&config.logging);

        let bot = Bot::builder(transport)
            .settings(config.bot.bot_settings())
            .config_map(config.bot.config_bag())
            .build();
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&bot)));

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            transport = bot.transport().name(),
            "Runtime initialized from configuration"
        );

        Self {
            config: config.clone(),
            bot,
            dispatcher,
            state: Mutex::new(RunState::Idle),
        }
    }

    /// The configuration this runtime was built from.
    pub fn config(&self) -> &BrassConfig {
        &self.config
    }

    /// The bot session.
    pub fn bot(&self) -> &Arc<Bot> {
        &self.bot
    }

    /// The dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Installs a module provider if `bot.modules` enables it.
    ///
    /// Returns `false` if the module was skipped.
    pub fn install(&self, provider: impl ModuleProvider) -> bool {
        self.install_arc(Arc::new(provider))
    }

    /// Installs a shared module provider if `bot.modules` enables it.
    pub fn install_arc(&self, provider: Arc<dyn ModuleProvider>) -> bool {
        let id = provider.id().to_string();
        if !self.config.bot.module_enabled(&id) {
            debug!(module = %id, "Module not enabled, skipping");
            return false;
        }
        self.bot.install_module(provider);
        true
    }

    /// Returns `true` between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        *self.state.lock() == RunState::Running
    }

    /// Connects the transport, loads the installed modules and starts the
    /// dispatch loop.
    ///
    /// A connection failure is returned and leaves the runtime idle.
    /// Module load failures are logged and do not stop the runtime.
    pub async fn start(&self) -> RuntimeResult<()> {
        {
            let mut state = self.state.lock();
            match *state {
                RunState::Running => {
                    warn!("Runtime is already running");
                    return Ok(());
                }
                RunState::Stopped => return Err(RuntimeError::Stopped),
                RunState::Idle => *state = RunState::Running,
            }
        }

        let transport = self.bot.transport();
        transport.on_receive(self.dispatcher.sink());

        if let Err(e) = self.bot.connect().await {
            error!(transport = transport.name(), error = %e, "Failed to connect");
            *self.state.lock() = RunState::Idle;
            return Err(e.into());
        }

        let failures = self.bot.load_modules();
        let installed = self.bot.modules().provider_ids();
        for id in &self.config.bot.modules {
            if !installed.contains(id) {
                warn!(module = %id, "Enabled module was never installed");
            }
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        self.bot.tasks().spawn(async move { dispatcher.run().await });

        info!(
            transport = transport.name(),
            identity = %self.bot.identity().name,
            modules = installed.len(),
            failed = failures.len(),
            commands = self.bot.registry().len(),
            "Runtime started"
        );
        Ok(())
    }

    /// Stops the dispatch loop, waits for running handlers and disconnects.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state != RunState::Running {
                warn!("Runtime is not running");
                return;
            }
            *state = RunState::Stopped;
        }

        info!("Stopping Brass runtime");
        let tasks = self.bot.tasks();
        if !tasks.is_empty() {
            debug!(tasks = tasks.len(), "Waiting for running tasks");
        }
        tasks.shutdown().await;
        self.bot.transport().disconnect().await;
        info!("Runtime stopped");
    }

    /// Runs until Ctrl+C, SIGTERM or a stop requested through the bot.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.start().await?;
        info!("Brass runtime is now running. Press Ctrl+C to stop.");

        let waited = self.wait_for_shutdown().await;
        self.stop().await;
        waited
    }

    /// Runs until `shutdown` completes or a stop is requested through the bot.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;

        let signal = self.bot.tasks().signal();
        tokio::select! {
            _ = shutdown => {}
            _ = signal.stopped() => info!("Stop requested by the bot"),
        }

        self.stop().await;
        Ok(())
    }

    async fn wait_for_shutdown(&self) -> RuntimeResult<()> {
        let stop = self.bot.tasks().signal();

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received Ctrl+C, shutting down");
                }
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                _ = stop.stopped() => info!("Stop requested by the bot"),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received Ctrl+C, shutting down");
                }
                _ = stop.stopped() => info!("Stop requested by the bot"),
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for BrassRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrassRuntime")
            .field("bot", &self.bot)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`BrassRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    transport: Option<BoxedTransport>,
    providers: Vec<Arc<dyn ModuleProvider>>,
}

impl RuntimeBuilder {
    /// Creates a builder that searches the current directory for config.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            transport: None,
            providers: Vec::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: BrassConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Overrides one configuration value by dotted key.
    pub fn set<V: serde::Serialize>(mut self, key: &str, value: V) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Sets the transport.
    pub fn transport(self, transport: impl Transport) -> Self {
        self.boxed_transport(Arc::new(transport))
    }

    /// Sets a shared transport.
    pub fn boxed_transport(mut self, transport: BoxedTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Adds a module provider, subject to the `bot.modules` enable list.
    pub fn module(mut self, provider: impl ModuleProvider) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<BrassRuntime> {
        let transport = self.transport.ok_or(RuntimeError::MissingTransport)?;
        let config = self.config_loader.load()?;
        let runtime = BrassRuntime::from_config(&config, transport);
        for provider in self.providers {
            runtime.install_arc(provider);
        }
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
