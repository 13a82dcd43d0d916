//! Module providers and transactional hot-reload.
//!
//! A module is a named group of commands produced by a [`ModuleProvider`].
//! Providers are installed once; [`ModuleManager::load`] builds a fresh
//! command set and swaps it in for the module's previous set. A load either
//! replaces the whole set or changes nothing:
//!
//! ```text
//! build new set ──ok──► swap in registry ──ok──► Loaded (old set released)
//!       │                      │
//!       └──err──┐              └──err──┐
//!               ▼                      ▼
//!        previous set stays live, error returned
//! ```
//!
//! [`ModuleManager::unload`] and [`CommandRegistry::reload`] remain available
//! for callers that need to take a module out and put it back verbatim.
//!
//! [`CommandRegistry::reload`]: crate::registry::CommandRegistry::reload

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::bot::{Bot, BotSettings};
use crate::command::Command;
use crate::directory::Directory;
use crate::error::{ModuleLoadError, ModuleResult, RuleError};
use crate::placeholder::Identity;

/// What a provider can see while building its commands.
pub struct ModuleContext<'a> {
    bot: &'a Bot,
    module: &'a str,
}

impl<'a> ModuleContext<'a> {
    /// Id of the module being built.
    pub fn module(&self) -> &str {
        self.module
    }

    /// The bot's identity.
    pub fn identity(&self) -> Identity {
        self.bot.identity()
    }

    /// Reads the bot's configuration bag.
    pub fn config(&self, key: &str) -> Option<Value> {
        self.bot.config(key)
    }

    /// Session settings.
    pub fn settings(&self) -> &BotSettings {
        self.bot.settings()
    }

    /// The user and channel directory.
    pub fn directory(&self) -> &Directory {
        self.bot.directory()
    }
}

/// A named source of commands.
pub trait ModuleProvider: Send + Sync + 'static {
    /// Stable module id.
    fn id(&self) -> &str;

    /// Builds a fresh command set.
    ///
    /// Called on every (re)load. Returning a [`RuleError`] (directly or via
    /// `?`) is reported as [`ModuleLoadError::Rule`].
    fn build(&self, ctx: &ModuleContext<'_>) -> anyhow::Result<Vec<Command>>;
}

/// Load state of an installed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Installed, never loaded.
    Installed,
    /// Its command set is live.
    Loaded,
    /// The last load attempt failed. A previous set may still be live.
    Failed,
    /// Unloaded on request.
    Unloaded,
}

struct ModuleEntry {
    provider: Arc<dyn ModuleProvider>,
    state: ModuleState,
}

/// Owner of the installed module providers.
#[derive(Default)]
pub struct ModuleManager {
    modules: RwLock<Vec<ModuleEntry>>,
    load_lock: Mutex<()>,
}

impl ModuleManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a provider. A provider with the same id is replaced, which
    /// takes effect on the next load.
    pub fn install(&self, provider: Arc<dyn ModuleProvider>) {
        let id = provider.id().to_string();
        let mut modules = self.modules.write();
        match modules.iter_mut().find(|e| e.provider.id() == id) {
            Some(entry) => {
                info!(module = %id, "Module provider replaced");
                entry.provider = provider;
            }
            None => {
                info!(module = %id, "Module installed");
                modules.push(ModuleEntry {
                    provider,
                    state: ModuleState::Installed,
                });
            }
        }
    }

    /// Ids of installed providers, in installation order.
    pub fn provider_ids(&self) -> Vec<String> {
        self.modules
            .read()
            .iter()
            .map(|e| e.provider.id().to_string())
            .collect()
    }

    /// Load state of a module.
    pub fn state(&self, id: &str) -> Option<ModuleState> {
        self.modules
            .read()
            .iter()
            .find(|e| e.provider.id() == id)
            .map(|e| e.state)
    }

    /// Loads every installed module in installation order.
    ///
    /// Failures are logged and returned; they do not stop other modules
    /// from loading.
    pub fn load_all(&self, bot: &Bot) -> Vec<ModuleLoadError> {
        self.provider_ids()
            .iter()
            .filter_map(|id| self.load(bot, id).err())
            .collect()
    }

    /// Loads or reloads a module, returning the number of live commands.
    ///
    /// On failure the module's previous command set stays registered
    /// untouched, including its remaining activations and deadlines.
    pub fn load(&self, bot: &Bot, id: &str) -> ModuleResult<usize> {
        let _guard = self.load_lock.lock();

        let Some(provider) = self.provider(id) else {
            return Err(ModuleLoadError::UnknownModule(id.to_string()));
        };

        let result = Self::build(bot, provider.as_ref()).and_then(|commands| {
            let count = commands.len();
            bot.registry()
                .replace_module(id, commands)
                .map(|_| count)
                .map_err(|source| ModuleLoadError::Registry {
                    module: id.to_string(),
                    source,
                })
        });

        match &result {
            Ok(count) => {
                info!(module = %id, commands = *count, "Module loaded");
                self.set_state(id, ModuleState::Loaded);
            }
            Err(e) => {
                error!(module = %id, error = %e, "Module load failed; previous commands kept");
                self.set_state(id, ModuleState::Failed);
            }
        }
        result
    }

    /// Takes a module's commands out of the registry.
    pub fn unload(&self, bot: &Bot, id: &str) -> Vec<Arc<Command>> {
        let _guard = self.load_lock.lock();
        let commands = bot.registry().unload(id);
        if commands.is_empty() {
            warn!(module = %id, "Nothing to unload");
        }
        self.set_state(id, ModuleState::Unloaded);
        commands
    }

    fn build(bot: &Bot, provider: &dyn ModuleProvider) -> ModuleResult<Vec<Arc<Command>>> {
        let module = provider.id();
        let ctx = ModuleContext { bot, module };
        let commands = provider.build(&ctx).map_err(|source| {
            match source.downcast::<RuleError>() {
                Ok(source) => ModuleLoadError::Rule {
                    module: module.to_string(),
                    source,
                },
                Err(source) => ModuleLoadError::Provider {
                    module: module.to_string(),
                    source,
                },
            }
        })?;
        Ok(commands.into_iter().map(Arc::new).collect())
    }

    fn provider(&self, id: &str) -> Option<Arc<dyn ModuleProvider>> {
        self.modules
            .read()
            .iter()
            .find(|e| e.provider.id() == id)
            .map(|e| Arc::clone(&e.provider))
    }

    fn set_state(&self, id: &str, state: ModuleState) {
        if let Some(entry) = self
            .modules
            .write()
            .iter_mut()
            .find(|e| e.provider.id() == id)
        {
            entry.state = state;
        }
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleManager")
            .field("modules", &self.provider_ids())
            .finish()
    }
}
