//! hermod-core: Core library for the hermod plugin host
//!
//! This crate provides the host side of the plugin system:
//!
//! - **Module loading** - [`ModuleLoader`] reads native modules and lists their plugin types
//! - **Plugin registry** - [`PluginRegistry`] owns plugin instances and their lifecycle
//! - **Topic bus** - [`TopicBus`] routes messages between plugins by exact topic
//! - **Command dispatch** - [`CommandDispatcher`] resolves and runs built-in and plugin commands
//! - **Configuration** - [`JsonConfigStore`] backs the dot-notation application config
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use hermod_core::{Hermod, HermodConfig, JsonConfigStore};
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Arc::new(JsonConfigStore::open(hermod_paths::config_file())?);
//!     let hermod = Hermod::new(HermodConfig::default(), settings);
//!
//!     hermod.startup()?;
//!     let line = vec!["get-plugins".to_string()];
//!     println!("{}", hermod.dispatcher().execute_line(&line));
//!     hermod.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//!   Hermod ─┬─ PluginRegistry ── module ── plugin ── PluginDelegator
//!           │        │                                    │
//!           │        └── purges on unload ──┐   subscribe / publish
//!           │                               ▼             │
//!           ├─ TopicBus  ◄────────────────────────────────┘
//!           ├─ CommandDispatcher (built-ins, then plugin commands)
//!           └─ ConfigProvider ── change notifications ──► every plugin
//! ```

pub mod bus;
pub mod commands;
pub mod config;
pub mod error;
pub mod host;
pub mod plugins;

// Re-export key types for convenience
pub use bus::{BusError, Topic, TopicBus};
pub use commands::CommandDispatcher;
pub use config::{
    ConfigError, ConfigNotification, ConfigProvider, ConfigProviderExt, JsonConfigStore,
};
pub use error::HermodError;
pub use host::{Hermod, HermodConfig};
pub use plugins::{
    LoadMode, LoadedModule, LoaderError, ModuleLoader, PluginHandle, PluginInfo, PluginRegistry,
    PluginState, RegistryError,
};
