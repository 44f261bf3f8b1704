//! PluginRegistry - owns every plugin instance and drives its lifecycle
//!
//! The table is `module -> [plugin]`, both levels kept in registration
//! order, behind a single mutex. Plugin hooks are never called with that
//! mutex held: a hook may call back into its delegator, which may publish,
//! subscribe or execute a command that reads the registry.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError, Weak};

use hermod_plugin_api::{
    Command, ConfigChangedEvent, HostServices, Message, Plugin, PluginDelegator, PluginDescriptor,
    PluginError, PluginId, PluginMetadata,
};
use libloading::Library;
use semver::Version;
use serde::Serialize;

use super::error::RegistryError;
use super::loader::{LoadMode, LoadedModule};
use crate::bus::{Recipient, TopicBus};

/// Lifecycle state of a registered plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PluginState {
    /// `on_load` is running; not yet visible
    Loading,
    /// `on_load` succeeded
    Loaded,
    Started,
    Stopped,
    /// A lifecycle hook failed or panicked
    Failed { error: String },
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => f.write_str("loading"),
            Self::Loaded => f.write_str("loaded"),
            Self::Started => f.write_str("started"),
            Self::Stopped => f.write_str("stopped"),
            Self::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Information about a plugin
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub id: PluginId,
    pub name: String,
    pub version: Version,
    pub module: String,
    pub type_name: String,
    pub state: PluginState,
    pub commands: Vec<String>,
}

/// A live reference to one plugin: enough to call its hooks or deliver to
/// its delegator. Keeps the plugin's library mapped while held.
#[derive(Clone)]
pub struct PluginHandle {
    name: String,
    instance: Arc<Mutex<Box<dyn Plugin>>>,
    delegator: Arc<PluginDelegator>,
    deferred: Arc<Mutex<Vec<ConfigNotice>>>,
    // Declared last so it is released after the instance and delegator
    _library: Option<Arc<Library>>,
}

impl PluginHandle {
    pub fn delegator(&self) -> &Arc<PluginDelegator> {
        &self.delegator
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Plugin>> {
        self.instance.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` while the plugin is inside another hook
    fn try_lock(&self) -> Option<MutexGuard<'_, Box<dyn Plugin>>> {
        match self.instance.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn deferred(&self) -> MutexGuard<'_, Vec<ConfigNotice>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a lifecycle hook, then hand over notifications that arrived
    /// while it was running
    fn with_plugin<R>(&self, f: impl FnOnce(&mut dyn Plugin) -> R) -> R {
        let result = {
            let mut plugin = self.lock();
            f(&mut **plugin)
        };
        self.deliver_deferred();
        result
    }

    /// Queue a config notification and deliver it unless the plugin is
    /// busy, in which case whoever holds the plugin delivers it on release.
    /// Never blocks.
    fn notify(&self, notice: ConfigNotice) {
        self.deferred().push(notice);
        self.deliver_deferred();
    }

    fn deliver_deferred(&self) {
        // Re-checked after each release: a notice queued while we held the
        // lock was refused by try_lock and is ours to deliver
        while !self.deferred().is_empty() {
            let Some(mut plugin) = self.try_lock() else {
                return;
            };
            let pending = std::mem::take(&mut *self.deferred());
            for notice in pending {
                notice.deliver(&self.name, &mut **plugin);
            }
        }
    }
}

/// A config notification waiting for its plugin
#[derive(Debug, Clone)]
enum ConfigNotice {
    Changed(ConfigChangedEvent),
    Loaded,
}

impl ConfigNotice {
    fn deliver(&self, name: &str, plugin: &mut dyn Plugin) {
        // Failures are logged by run_hook and do not reach other plugins
        let _ = match self {
            Self::Changed(event) => {
                run_hook(name, "on_config_changed", || plugin.on_config_changed(event))
            }
            Self::Loaded => run_hook(name, "on_config_loaded", || plugin.on_config_loaded()),
        };
    }
}

impl Recipient for PluginHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn deliver(&self, message: &Message) -> Result<(), PluginError> {
        self.delegator.deliver(message)
    }
}

struct PluginEntry {
    id: PluginId,
    type_name: String,
    metadata: PluginMetadata,
    state: PluginState,
    commands: Vec<Command>,
    handle: PluginHandle,
}

impl PluginEntry {
    fn visible(&self) -> bool {
        self.state != PluginState::Loading
    }
}

struct ModuleEntry {
    id: String,
    plugins: Vec<PluginEntry>,
}

#[derive(Default)]
struct RegistryTable {
    modules: Vec<ModuleEntry>,
    last_registered: Option<PluginId>,
}

impl RegistryTable {
    fn entries(&self) -> impl Iterator<Item = (&ModuleEntry, &PluginEntry)> {
        self.modules
            .iter()
            .flat_map(|module| module.plugins.iter().map(move |plugin| (module, plugin)))
    }

    fn entry_mut(&mut self, id: PluginId) -> Option<&mut PluginEntry> {
        self.modules
            .iter_mut()
            .flat_map(|module| module.plugins.iter_mut())
            .find(|plugin| plugin.id == id)
    }

    fn contains(&self, module: &str, type_name: &str) -> bool {
        self.entries()
            .any(|(m, p)| m.id == module && p.type_name == type_name)
    }

    /// Remove an entry, dropping its module entry if that leaves it empty
    fn remove(&mut self, id: PluginId) -> Option<PluginEntry> {
        let module_index = self
            .modules
            .iter()
            .position(|module| module.plugins.iter().any(|p| p.id == id))?;
        let module = &mut self.modules[module_index];
        let plugin_index = module.plugins.iter().position(|p| p.id == id)?;
        let entry = module.plugins.remove(plugin_index);
        if module.plugins.is_empty() {
            self.modules.remove(module_index);
        }
        if self.last_registered == Some(id) {
            self.last_registered = None;
        }
        Some(entry)
    }
}

/// Registry of loaded plugins and the merged command namespace
pub struct PluginRegistry {
    host: Weak<dyn HostServices>,
    bus: Arc<TopicBus>,
    table: Mutex<RegistryTable>,
    builtins: RwLock<Vec<Command>>,
    next_id: AtomicU64,
}

impl PluginRegistry {
    /// Create a registry whose delegators call back into `host`
    pub fn new(host: Weak<dyn HostServices>, bus: Arc<TopicBus>) -> Self {
        Self {
            host,
            bus,
            table: Mutex::new(RegistryTable::default()),
            builtins: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn table(&self) -> MutexGuard<'_, RegistryTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ─── Registration ────────────────────────────────────────────────

    /// Instantiate and load every plugin type in `module`
    ///
    /// Types already registered under the same module are skipped. In
    /// [`LoadMode::Strict`] the first failure rolls back everything this
    /// call registered and is returned; in [`LoadMode::Permissive`] failing
    /// plugins are logged and skipped.
    pub fn register_module(
        &self,
        module: &LoadedModule,
        mode: LoadMode,
    ) -> Result<Vec<PluginId>, RegistryError> {
        let mut registered = Vec::new();

        for descriptor in module.descriptors() {
            match self.register_plugin(module, descriptor) {
                Ok(Some(id)) => registered.push(id),
                Ok(None) => {
                    tracing::warn!(
                        module = %module.id(),
                        plugin = %descriptor.metadata.name,
                        "Plugin already registered, skipping"
                    );
                }
                Err(e) if mode == LoadMode::Permissive => {
                    tracing::error!(module = %module.id(), error = %e, "Failed to load plugin");
                }
                Err(e) => {
                    for id in registered.into_iter().rev() {
                        self.remove_entry(id);
                    }
                    return Err(e);
                }
            }
        }

        Ok(registered)
    }

    /// Returns `Ok(None)` when the (module, type) pair is already present
    fn register_plugin(
        &self,
        module: &LoadedModule,
        descriptor: &PluginDescriptor,
    ) -> Result<Option<PluginId>, RegistryError> {
        let type_name = &descriptor.type_name;
        if self.contains(module.id(), type_name) {
            return Ok(None);
        }

        let instance = match std::panic::catch_unwind(AssertUnwindSafe(|| descriptor.instantiate())) {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                return Err(RegistryError::plugin_load(type_name, "construction returned no instance"));
            }
            Err(_) => return Err(RegistryError::plugin_load(type_name, "constructor panicked")),
        };

        let id = PluginId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let name = descriptor.metadata.name.clone();
        let delegator = Arc::new(PluginDelegator::new(id, name.clone(), self.host.clone()));
        let handle = PluginHandle {
            name: name.clone(),
            instance: Arc::new(Mutex::new(instance)),
            delegator: delegator.clone(),
            deferred: Arc::new(Mutex::new(Vec::new())),
            _library: module.library(),
        };

        {
            let mut table = self.table();
            if table.contains(module.id(), type_name) {
                return Ok(None);
            }
            let entry = PluginEntry {
                id,
                type_name: type_name.clone(),
                metadata: descriptor.metadata.clone(),
                state: PluginState::Loading,
                commands: Vec::new(),
                handle: handle.clone(),
            };
            match table.modules.iter_mut().find(|m| m.id == module.id()) {
                Some(existing) => existing.plugins.push(entry),
                None => table.modules.push(ModuleEntry {
                    id: module.id().to_string(),
                    plugins: vec![entry],
                }),
            }
        }

        let loaded = std::panic::catch_unwind(AssertUnwindSafe(|| {
            handle.with_plugin(|plugin| {
                plugin.on_load(delegator)?;
                Ok::<_, PluginError>(plugin.commands())
            })
        }));

        let commands = match loaded {
            Ok(Ok(commands)) => commands,
            Ok(Err(e)) => {
                self.remove_entry(id);
                return Err(RegistryError::plugin_load(type_name, e.to_string()));
            }
            Err(_) => {
                self.remove_entry(id);
                return Err(RegistryError::plugin_load(type_name, "on_load panicked"));
            }
        };

        let commands: Vec<Command> = match module.library() {
            Some(library) => commands
                .into_iter()
                .map(|command| pin_to_library(command, library.clone()))
                .collect(),
            None => commands,
        };
        self.report_shadowed(&name, &commands);

        let mut table = self.table();
        if let Some(entry) = table.entry_mut(id) {
            entry.commands = commands;
            entry.state = PluginState::Loaded;
        }
        table.last_registered = Some(id);
        drop(table);

        tracing::info!(
            plugin = %name,
            version = %descriptor.metadata.version,
            id = %id,
            "Plugin loaded"
        );
        Ok(Some(id))
    }

    /// Warn about commands that lose the first-match tie-break
    fn report_shadowed(&self, plugin: &str, commands: &[Command]) {
        let builtins = self.builtin_commands();
        let table = self.table();
        for command in commands {
            if builtins.iter().any(|b| b.name() == command.name()) {
                tracing::warn!(
                    plugin = %plugin,
                    command = %command.name(),
                    "Command is shadowed by a built-in and will never run"
                );
            } else if let Some((_, owner)) = table.entries().find(|(_, p)| {
                p.visible() && p.commands.iter().any(|c| c.name() == command.name())
            }) {
                tracing::warn!(
                    plugin = %plugin,
                    command = %command.name(),
                    owner = %owner.metadata.name,
                    "Command is shadowed by an earlier plugin"
                );
            }
        }
    }

    /// Take an entry out of the table and purge its subscriptions. The
    /// entry is dropped after the table lock is released.
    fn remove_entry(&self, id: PluginId) -> Option<PluginEntry> {
        let entry = self.table().remove(id);
        if entry.is_some() {
            self.bus.remove_plugin(id);
        }
        entry
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    /// Id of the most recently registered plugin
    pub fn last_registered(&self) -> Option<PluginId> {
        self.table().last_registered
    }

    /// Start a loaded or stopped plugin. Starting a started plugin is a no-op.
    pub fn start(&self, id: PluginId) -> Result<(), RegistryError> {
        let handle = {
            let mut table = self.table();
            let entry = table
                .entry_mut(id)
                .filter(|e| e.visible())
                .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;
            if entry.state == PluginState::Started {
                return Ok(());
            }
            entry.handle.clone()
        };

        let result = handle.with_plugin(|plugin| run_hook(&handle.name, "on_start", || plugin.on_start()));
        self.set_state(id, &result, PluginState::Started);
        if result.is_ok() {
            tracing::info!(plugin = %handle.name, "Plugin started");
        }
        result
    }

    /// Start every plugin that is not running. Returns how many started.
    pub fn start_all(&self) -> usize {
        self.ids_where(|state| matches!(state, PluginState::Loaded | PluginState::Stopped))
            .into_iter()
            .filter(|id| self.start(*id).is_ok())
            .count()
    }

    /// Stop a started plugin. Stopping anything else is a no-op.
    pub fn stop(&self, id: PluginId) -> Result<(), RegistryError> {
        let handle = {
            let mut table = self.table();
            let entry = table
                .entry_mut(id)
                .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;
            if entry.state != PluginState::Started {
                return Ok(());
            }
            entry.handle.clone()
        };

        let result = handle.with_plugin(|plugin| run_hook(&handle.name, "on_stop", || plugin.on_stop()));
        self.set_state(id, &result, PluginState::Stopped);
        if result.is_ok() {
            tracing::info!(plugin = %handle.name, "Plugin stopped");
        }
        result
    }

    /// Stop every started plugin, most recently registered first
    pub fn stop_all(&self) {
        let mut ids = self.ids_where(|state| *state == PluginState::Started);
        ids.reverse();
        for id in ids {
            let _ = self.stop(id);
        }
    }

    /// Stop (if started) and remove one plugin
    pub fn unload(&self, id: PluginId) -> Result<PluginInfo, RegistryError> {
        let info = self
            .info(id)
            .ok_or_else(|| RegistryError::NotFound { id: id.to_string() })?;

        // A failing on_stop does not keep the plugin registered
        let _ = self.stop(id);

        let entry = self.remove_entry(id);
        drop(entry);
        tracing::info!(plugin = %info.name, id = %id, "Plugin unloaded");
        Ok(info)
    }

    /// Remove the plugin of `type_name` registered from `module`
    pub fn deregister(&self, module: &str, type_name: &str) -> Result<PluginInfo, RegistryError> {
        let id = self
            .table()
            .entries()
            .find(|(m, p)| m.id == module && p.type_name == type_name)
            .map(|(_, p)| p.id)
            .ok_or_else(|| RegistryError::NotFound {
                id: format!("{module}::{type_name}"),
            })?;
        self.unload(id)
    }

    /// Unload every plugin, most recently registered first
    pub fn unload_all(&self) -> usize {
        let mut ids = self.ids_where(|_| true);
        ids.reverse();
        ids.into_iter().filter(|id| self.unload(*id).is_ok()).count()
    }

    fn set_state(&self, id: PluginId, result: &Result<(), RegistryError>, on_success: PluginState) {
        if let Some(entry) = self.table().entry_mut(id) {
            entry.state = match result {
                Ok(()) => on_success,
                Err(e) => PluginState::Failed {
                    error: e.to_string(),
                },
            };
        }
    }

    fn ids_where(&self, predicate: impl Fn(&PluginState) -> bool) -> Vec<PluginId> {
        self.table()
            .entries()
            .filter(|(_, p)| p.visible() && predicate(&p.state))
            .map(|(_, p)| p.id)
            .collect()
    }

    fn handles(&self) -> Vec<PluginHandle> {
        self.table()
            .entries()
            .filter(|(_, p)| p.visible())
            .map(|(_, p)| p.handle.clone())
            .collect()
    }

    // ─── Configuration notifications ─────────────────────────────────

    /// Tell every plugin a config value changed. Failures are logged and
    /// do not stop the broadcast. A plugin that is inside one of its hooks
    /// (for example it changed a value from `on_start`) gets the event as
    /// soon as that hook returns.
    pub fn broadcast_config_changed(&self, event: &ConfigChangedEvent) {
        for handle in self.handles() {
            handle.notify(ConfigNotice::Changed(event.clone()));
        }
    }

    pub fn broadcast_config_loaded(&self) {
        for handle in self.handles() {
            handle.notify(ConfigNotice::Loaded);
        }
    }

    // ─── Commands ────────────────────────────────────────────────────

    /// Replace the host's built-in commands
    pub fn set_builtin_commands(&self, commands: Vec<Command>) {
        *self.builtins.write().unwrap_or_else(PoisonError::into_inner) = commands;
    }

    pub fn add_builtin_command(&self, command: Command) {
        self.builtins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command);
    }

    pub fn builtin_commands(&self) -> Vec<Command> {
        self.builtins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Commands of every registered plugin, in registration order
    pub fn plugin_commands(&self) -> Vec<Command> {
        self.table()
            .entries()
            .filter(|(_, p)| p.visible())
            .flat_map(|(_, p)| p.commands.iter().cloned())
            .collect()
    }

    /// Built-ins followed by plugin commands; the first match by name wins
    pub fn all_commands(&self) -> Vec<Command> {
        let mut commands = self.builtin_commands();
        commands.extend(self.plugin_commands());
        commands
    }

    /// First command named `name`, built-ins first
    pub fn find_command(&self, name: &str) -> Option<Command> {
        let builtin = self
            .builtins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|c| c.name() == name)
            .cloned();
        builtin.or_else(|| {
            self.table()
                .entries()
                .filter(|(_, p)| p.visible())
                .flat_map(|(_, p)| p.commands.iter())
                .find(|c| c.name() == name)
                .cloned()
        })
    }

    // ─── Introspection ───────────────────────────────────────────────

    pub fn plugins(&self) -> Vec<PluginInfo> {
        self.table()
            .entries()
            .filter(|(_, p)| p.visible())
            .map(|(m, p)| to_info(m, p))
            .collect()
    }

    pub fn info(&self, id: PluginId) -> Option<PluginInfo> {
        self.table()
            .entries()
            .find(|(_, p)| p.id == id && p.visible())
            .map(|(m, p)| to_info(m, p))
    }

    pub fn plugin_count(&self) -> usize {
        self.table().entries().filter(|(_, p)| p.visible()).count()
    }

    /// Ids of every plugin named `name`; names need not be unique
    pub fn find_by_name(&self, name: &str) -> Vec<PluginId> {
        self.table()
            .entries()
            .filter(|(_, p)| p.visible() && p.metadata.name == name)
            .map(|(_, p)| p.id)
            .collect()
    }

    pub fn contains(&self, module: &str, type_name: &str) -> bool {
        self.table().contains(module, type_name)
    }

    pub fn delegator(&self, id: PluginId) -> Option<Arc<PluginDelegator>> {
        self.handle(id).map(|h| h.delegator)
    }

    /// Live handle for delivery; includes plugins still inside `on_load`
    pub fn handle(&self, id: PluginId) -> Option<PluginHandle> {
        self.table()
            .entries()
            .find(|(_, p)| p.id == id)
            .map(|(_, p)| p.handle.clone())
    }
}

fn to_info(module: &ModuleEntry, plugin: &PluginEntry) -> PluginInfo {
    PluginInfo {
        id: plugin.id,
        name: plugin.metadata.name.clone(),
        version: plugin.metadata.version.clone(),
        module: module.id.clone(),
        type_name: plugin.type_name.clone(),
        state: plugin.state.clone(),
        commands: plugin.commands.iter().map(|c| c.name().to_string()).collect(),
    }
}

/// Run a plugin hook with panic isolation
fn run_hook<F>(plugin: &str, hook: &'static str, f: F) -> Result<(), RegistryError>
where
    F: FnOnce() -> Result<(), PluginError>,
{
    match std::panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::error!(plugin = %plugin, error = %e, "Plugin {hook} error");
            Err(RegistryError::Hook {
                name: plugin.to_string(),
                hook,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            tracing::error!(plugin = %plugin, "Plugin panicked in {hook}");
            Err(RegistryError::Hook {
                name: plugin.to_string(),
                hook,
                reason: "panicked".to_string(),
            })
        }
    }
}

/// Wrap a command from a dynamically loaded module so that any clone of it
/// keeps the module mapped while it can still be called
fn pin_to_library(command: Command, library: Arc<Library>) -> Command {
    struct Pinned {
        command: Command,
        _library: Arc<Library>,
    }

    impl Pinned {
        fn invoke(&self, args: &[String]) -> Result<hermod_plugin_api::CommandResult, PluginError> {
            self.command.invoke(args)
        }
    }

    let mut wrapped = Command::new(command.name(), command.short_description(), {
        let pinned = Pinned {
            command: command.clone(),
            _library: library,
        };
        move |args: &[String]| pinned.invoke(args)
    });
    if let Some(long) = command.long_description() {
        wrapped = wrapped.with_long_description(long);
    }
    for option in command.options() {
        wrapped = wrapped.with_option(option.clone());
    }
    wrapped
}
