//! Command registry.
//!
//! Maps module ids to the command sets they contribute and publishes a
//! priority-ordered snapshot of every live command. Each mutation rebuilds
//! the snapshot under the write lock and swaps it in whole, so a reader
//! holding a snapshot never observes a half-applied change; commands added
//! while a dispatch pass is iterating show up in the next pass.
//!
//! Ordering is by descending priority, ties broken by registration order.
//! The registration sequence number is assigned the first time a command
//! enters the registry and survives [`CommandRegistry::unload`] /
//! [`CommandRegistry::reload`], so a round trip restores the exact order.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::command::Command;
use crate::error::{RegistryError, RegistryResult};

/// An immutable, ordered view of all live commands.
pub type CommandSnapshot = Arc<Vec<Arc<Command>>>;

#[derive(Default)]
struct RegistryState {
    modules: HashMap<String, Vec<Arc<Command>>>,
    snapshot: CommandSnapshot,
    next_sequence: u64,
}

impl RegistryState {
    fn rebuild(&mut self) {
        let mut all: Vec<Arc<Command>> = self.modules.values().flatten().cloned().collect();
        all.sort_by_key(|command| (Reverse(command.priority()), command.sequence()));
        self.snapshot = Arc::new(all);
    }

    fn claim_all(&mut self, module: &str, commands: &[Arc<Command>]) -> RegistryResult<()> {
        for (index, command) in commands.iter().enumerate() {
            if let Err(owner) = command.claim(module) {
                for claimed in &commands[..index] {
                    claimed.release();
                }
                return Err(RegistryError::CommandAlreadyOwned {
                    command: command.name().to_string(),
                    module: owner,
                });
            }
        }
        for command in commands {
            self.next_sequence += 1;
            command.assign_sequence(self.next_sequence);
        }
        Ok(())
    }
}

/// Thread-safe registry of module command sets.
#[derive(Default)]
pub struct CommandRegistry {
    state: RwLock<RegistryState>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module's command set.
    ///
    /// Fails if the module already has a set (unload it first) or if any
    /// command already belongs to another module. On failure nothing changes.
    pub fn register(&self, module: &str, commands: Vec<Arc<Command>>) -> RegistryResult<()> {
        let mut state = self.state.write();
        if state.modules.contains_key(module) {
            return Err(RegistryError::ModuleAlreadyRegistered(module.to_string()));
        }
        state.claim_all(module, &commands)?;
        debug!(module, count = commands.len(), "Registered module");
        state.modules.insert(module.to_string(), commands);
        state.rebuild();
        Ok(())
    }

    /// Swaps a module's command set for a new one in a single step.
    ///
    /// Returns the previous set (empty if the module was not registered).
    /// If any new command belongs to another module nothing changes.
    pub fn replace_module(
        &self,
        module: &str,
        commands: Vec<Arc<Command>>,
    ) -> RegistryResult<Vec<Arc<Command>>> {
        let mut state = self.state.write();
        let previous = state.modules.remove(module).unwrap_or_default();
        for command in &previous {
            command.release();
        }
        if let Err(e) = state.claim_all(module, &commands) {
            for command in &previous {
                let _ = command.claim(module);
            }
            state.modules.insert(module.to_string(), previous);
            return Err(e);
        }
        debug!(
            module,
            old = previous.len(),
            new = commands.len(),
            "Replaced module"
        );
        state.modules.insert(module.to_string(), commands);
        state.rebuild();
        Ok(previous)
    }

    /// Adds a single command to a module's set, creating the set if needed.
    ///
    /// This is how handlers register follow-up commands at runtime.
    pub fn add_command(&self, module: &str, command: Arc<Command>) -> RegistryResult<()> {
        let mut state = self.state.write();
        state.claim_all(module, std::slice::from_ref(&command))?;
        trace!(module, command = %command.name(), "Added command");
        state
            .modules
            .entry(module.to_string())
            .or_default()
            .push(command);
        state.rebuild();
        Ok(())
    }

    /// Removes and returns a module's command set.
    ///
    /// An absent module yields an empty set.
    pub fn unload(&self, module: &str) -> Vec<Arc<Command>> {
        let mut state = self.state.write();
        let Some(commands) = state.modules.remove(module) else {
            return Vec::new();
        };
        for command in &commands {
            command.release();
        }
        debug!(module, count = commands.len(), "Unloaded module");
        state.rebuild();
        commands
    }

    /// Restores a set previously returned by [`unload`](Self::unload).
    ///
    /// Lifecycle state (remaining activations, deadlines, ordering) is kept
    /// as it was. Only meant for rollback.
    pub fn reload(&self, module: &str, commands: Vec<Arc<Command>>) -> RegistryResult<()> {
        self.register(module, commands)
    }

    /// Removes one command from whichever module owns it.
    ///
    /// Returns `false` if the command was not registered.
    pub fn unregister_command(&self, command: &Arc<Command>) -> bool {
        let Some(module) = command.module() else {
            return false;
        };
        let mut state = self.state.write();
        let Some(commands) = state.modules.get_mut(&module) else {
            return false;
        };
        let Some(index) = commands.iter().position(|c| Arc::ptr_eq(c, command)) else {
            return false;
        };
        commands.remove(index);
        command.release();
        trace!(module = %module, command = %command.name(), "Unregistered command");
        state.rebuild();
        true
    }

    /// Returns every live command, highest priority first.
    pub fn all_commands(&self) -> CommandSnapshot {
        Arc::clone(&self.state.read().snapshot)
    }

    /// Returns a copy of one module's command set.
    pub fn module(&self, module: &str) -> Option<Vec<Arc<Command>>> {
        self.state.read().modules.get(module).cloned()
    }

    /// Returns `true` if the module has a registered set (possibly empty).
    pub fn contains_module(&self, module: &str) -> bool {
        self.state.read().modules.contains_key(module)
    }

    /// Ids of all registered modules, sorted.
    pub fn module_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().modules.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of live commands.
    pub fn len(&self) -> usize {
        self.state.read().snapshot.len()
    }

    /// Returns `true` if no command is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("CommandRegistry")
            .field("modules", &state.modules.len())
            .field("commands", &state.snapshot.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{HandlerResult, Occlusion};
    use crate::context::BotContext;
    use crate::event::Event;
    use crate::rule::Captures;

    fn noop(_: &BotContext, _: &mut Event, _: &Captures) -> HandlerResult {
        Ok(())
    }

    fn cmd(name: &str, priority: i32) -> Arc<Command> {
        Arc::new(
            Command::builder(name)
                .priority(priority)
                .occlusion(Occlusion::Exclusive)
                .handler(noop)
                .build()
                .unwrap(),
        )
    }

    fn names(registry: &CommandRegistry) -> Vec<String> {
        registry
            .all_commands()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    #[test]
    fn test_priority_order_is_stable() {
        let registry = CommandRegistry::new();
        registry
            .register(
                "m",
                vec![cmd("a", 5), cmd("b", -5), cmd("c", 0), cmd("d", 5)],
            )
            .unwrap();
        assert_eq!(names(&registry), ["a", "d", "c", "b"]);
    }

    #[test]
    fn test_ties_across_modules_follow_registration_order() {
        let registry = CommandRegistry::new();
        registry.register("first", vec![cmd("x", 0)]).unwrap();
        registry.register("second", vec![cmd("y", 0), cmd("z", 1)]).unwrap();
        assert_eq!(names(&registry), ["z", "x", "y"]);
    }

    #[test]
    fn test_register_twice_fails() {
        let registry = CommandRegistry::new();
        registry.register("m", vec![cmd("a", 0)]).unwrap();
        let err = registry.register("m", vec![cmd("b", 0)]).unwrap_err();
        assert!(matches!(err, RegistryError::ModuleAlreadyRegistered(_)));
        assert_eq!(names(&registry), ["a"]);
    }

    #[test]
    fn test_command_belongs_to_one_module() {
        let registry = CommandRegistry::new();
        let shared = cmd("shared", 0);
        registry.register("a", vec![Arc::clone(&shared)]).unwrap();
        let err = registry
            .register("b", vec![cmd("fresh", 0), Arc::clone(&shared)])
            .unwrap_err();
        assert!(matches!(err, RegistryError::CommandAlreadyOwned { .. }));
        assert!(!registry.contains_module("b"));
        assert_eq!(shared.module().as_deref(), Some("a"));
    }

    #[test]
    fn test_unload_missing_module_is_empty() {
        let registry = CommandRegistry::new();
        assert!(registry.unload("nope").is_empty());
    }

    #[test]
    fn test_unload_then_reload_round_trip() {
        let registry = CommandRegistry::new();
        registry.register("a", vec![cmd("a1", 0), cmd("a2", 3)]).unwrap();
        registry.register("b", vec![cmd("b1", 0)]).unwrap();
        let before = names(&registry);

        let set = registry.unload("a");
        assert_eq!(names(&registry), ["b1"]);
        assert!(set.iter().all(|c| c.module().is_none()));

        registry.reload("a", set).unwrap();
        assert_eq!(names(&registry), before);
    }

    #[test]
    fn test_snapshot_is_isolated_from_mutation() {
        let registry = CommandRegistry::new();
        registry.register("a", vec![cmd("a1", 0)]).unwrap();
        let snapshot = registry.all_commands();
        registry.register("b", vec![cmd("b1", 0)]).unwrap();
        registry.unload("a");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name(), "a1");
        assert_eq!(names(&registry), ["b1"]);
    }

    #[test]
    fn test_unregister_single_command() {
        let registry = CommandRegistry::new();
        let keep = cmd("keep", 0);
        let drop = cmd("drop", 0);
        registry
            .register("m", vec![Arc::clone(&keep), Arc::clone(&drop)])
            .unwrap();

        assert!(registry.unregister_command(&drop));
        assert!(!registry.unregister_command(&drop));
        assert_eq!(names(&registry), ["keep"]);
        assert!(registry.contains_module("m"));
    }

    #[test]
    fn test_replace_module_swaps_atomically() {
        let registry = CommandRegistry::new();
        registry.register("m", vec![cmd("old", 0)]).unwrap();
        let snapshot = registry.all_commands();

        let previous = registry.replace_module("m", vec![cmd("new", 0)]).unwrap();
        assert_eq!(previous[0].name(), "old");
        assert!(previous[0].module().is_none());
        assert_eq!(names(&registry), ["new"]);
        assert_eq!(snapshot[0].name(), "old");
    }

    #[test]
    fn test_replace_module_failure_keeps_previous() {
        let registry = CommandRegistry::new();
        let foreign = cmd("foreign", 0);
        registry.register("other", vec![Arc::clone(&foreign)]).unwrap();
        registry.register("m", vec![cmd("old", 0)]).unwrap();

        let err = registry.replace_module("m", vec![foreign]).unwrap_err();
        assert!(matches!(err, RegistryError::CommandAlreadyOwned { .. }));
        assert_eq!(names(&registry), ["foreign", "old"]);
        assert_eq!(registry.module("m").unwrap()[0].module().as_deref(), Some("m"));
    }

    #[test]
    fn test_add_command_creates_module() {
        let registry = CommandRegistry::new();
        registry.add_command("dynamic", cmd("later", 0)).unwrap();
        assert_eq!(registry.module_ids(), ["dynamic"]);
        assert_eq!(registry.len(), 1);
    }
}
