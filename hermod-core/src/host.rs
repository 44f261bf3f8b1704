//! Hermod - the host context
//!
//! One `Hermod` value owns the registry, the topic bus, the dispatcher and
//! the configuration provider, and is what every plugin delegator calls back
//! into. It is constructed explicitly and passed around as `Arc<Hermod>`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use hermod_plugin_api::{CommandResult, HostServices, PluginError, PluginId};
use tracing::Level;

use crate::bus::TopicBus;
use crate::commands::{CommandDispatcher, builtins};
use crate::config::{ConfigNotification, ConfigProvider, ConfigProviderExt};
use crate::error::HermodError;
use crate::plugins::{LoadMode, LoadedModule, ModuleLoader, PluginRegistry};

/// Configuration for the host
#[derive(Debug, Clone, Default)]
pub struct HermodConfig {
    /// Overrides `Plugins.InstallDir` when set
    pub plugin_dir: Option<PathBuf>,
}

/// The host context
pub struct Hermod {
    config: HermodConfig,
    settings: Arc<dyn ConfigProvider>,
    bus: Arc<TopicBus>,
    registry: Arc<PluginRegistry>,
    dispatcher: CommandDispatcher,
    keep_alive: AtomicBool,
}

impl Hermod {
    pub fn new(config: HermodConfig, settings: Arc<dyn ConfigProvider>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Hermod>| {
            let host: Weak<dyn HostServices> = weak.clone();
            let bus = Arc::new(TopicBus::new());
            let registry = Arc::new(PluginRegistry::new(host, bus.clone()));
            registry.set_builtin_commands(builtins::builtin_commands(weak.clone()));

            let listener_host = weak.clone();
            settings.set_listener(Arc::new(move |notification| {
                let Some(hermod) = listener_host.upgrade() else {
                    return;
                };
                match notification {
                    ConfigNotification::Changed(event) => {
                        hermod.registry.broadcast_config_changed(event)
                    }
                    ConfigNotification::Loaded => hermod.registry.broadcast_config_loaded(),
                }
            }));

            Self {
                config,
                settings,
                bus,
                dispatcher: CommandDispatcher::new(registry.clone()),
                registry,
                keep_alive: AtomicBool::new(true),
            }
        })
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<TopicBus> {
        &self.bus
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &Arc<dyn ConfigProvider> {
        &self.settings
    }

    /// False once `quit` has run
    pub fn keep_alive(&self) -> bool {
        self.keep_alive.load(Ordering::SeqCst)
    }

    pub fn request_exit(&self) {
        self.keep_alive.store(false, Ordering::SeqCst);
    }

    /// Directory scanned for modules at startup
    ///
    /// An empty `Plugins.InstallDir` resolves to the platform default, which
    /// is then written back to the configuration.
    pub fn plugin_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config.plugin_dir {
            return dir.clone();
        }

        match self.settings.get_as::<String>("Plugins.InstallDir") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let dir = hermod_paths::plugin_dir();
                let stored = self
                    .settings
                    .set_as("Plugins.InstallDir", &dir.display().to_string())
                    .and_then(|()| self.settings.save());
                if let Err(e) = stored {
                    tracing::debug!(error = %e, "Could not store default plugin directory");
                }
                dir
            }
        }
    }

    /// Load every module in the plugin directory, then start the plugins
    /// unless `Plugins.AutoStart` is off. Returns the number of plugins.
    pub fn startup(&self) -> Result<usize, HermodError> {
        let dir = self.plugin_dir();
        tracing::info!(dir = %dir.display(), "Loading plugins");

        for module in ModuleLoader::load_dir(&dir)? {
            if let Err(e) = self.registry.register_module(&module, LoadMode::Permissive) {
                tracing::error!(module = %module.id(), error = %e, "Failed to register module");
            }
        }

        self.registry.broadcast_config_loaded();

        let auto_start = self.settings.get_as::<bool>("Plugins.AutoStart").unwrap_or(true);
        if auto_start {
            let started = self.registry.start_all();
            tracing::debug!(started, "Plugins started");
        }

        Ok(self.registry.plugin_count())
    }

    /// Register an already loaded module strictly and start its plugins
    pub fn install(&self, module: &LoadedModule) -> Result<Vec<PluginId>, HermodError> {
        let ids = self.registry.register_module(module, LoadMode::Strict)?;
        for id in &ids {
            if let Err(e) = self.registry.start(*id) {
                tracing::warn!(id = %id, error = %e, "Plugin failed to start");
            }
        }
        Ok(ids)
    }

    /// Load the module at `path` strictly and start its plugins
    pub fn load_module_file(&self, path: &Path) -> Result<Vec<PluginId>, HermodError> {
        let module = ModuleLoader::load(path)?;
        self.install(&module)
    }

    /// Stop and unload every plugin
    pub fn shutdown(&self) {
        self.request_exit();
        self.registry.stop_all();
        let unloaded = self.registry.unload_all();
        tracing::info!(unloaded, "Host shut down");
    }
}

impl HostServices for Hermod {
    fn subscribe(&self, plugin: PluginId, topic: &str) -> Result<(), PluginError> {
        Ok(self.bus.subscribe(plugin, topic)?)
    }

    fn unsubscribe(&self, plugin: PluginId, topic: &str) -> Result<(), PluginError> {
        Ok(self.bus.unsubscribe(plugin, topic)?)
    }

    fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<usize, PluginError> {
        Ok(self.bus.publish(topic, payload, |id| self.registry.handle(id))?)
    }

    fn execute_command(&self, args: &[String]) -> CommandResult {
        self.dispatcher.execute_line(args)
    }

    fn get_config(&self, key: &str) -> Result<serde_json::Value, PluginError> {
        self.settings
            .get(key)
            .map_err(|e| PluginError::Config(e.to_string()))
    }

    fn set_config(&self, key: &str, value: serde_json::Value) -> Result<(), PluginError> {
        self.settings
            .set(key, value)
            .and_then(|()| self.settings.save())
            .map_err(|e| PluginError::Config(e.to_string()))
    }

    fn log(&self, plugin: &str, level: Level, message: &str) {
        match level {
            Level::TRACE => tracing::trace!(plugin = %plugin, "[{plugin}] {message}"),
            Level::DEBUG => tracing::debug!(plugin = %plugin, "[{plugin}] {message}"),
            Level::INFO => tracing::info!(plugin = %plugin, "[{plugin}] {message}"),
            Level::WARN => tracing::warn!(plugin = %plugin, "[{plugin}] {message}"),
            _ => tracing::error!(plugin = %plugin, "[{plugin}] {message}"),
        }
    }
}
