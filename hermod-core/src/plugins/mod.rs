//! Plugin system for hermod
//!
//! This module provides the infrastructure for loading and managing plugins:
//!
//! - [`ModuleLoader`]: Reads native modules and lists the plugin types they export
//! - [`PluginRegistry`]: Owns plugin instances, their delegators and lifecycle
//! - [`LoaderError`] / [`RegistryError`]: Error types for plugin operations
//!
//! # Plugin Discovery
//!
//! At startup every regular file in the plugin install directory
//! (`Plugins.InstallDir`, by default `~/.local/share/hermod/plugins`) is
//! offered to the loader in name order. Files that are not plugin modules
//! are skipped. `load-plugin <path>` loads a single module and reports
//! every failure.
//!
//! # Example
//!
//! ```ignore
//! use hermod_core::plugins::{LoadMode, ModuleLoader};
//!
//! let module = ModuleLoader::load(Path::new("libecho_plugin.so"))?;
//! let ids = registry.register_module(&module, LoadMode::Strict)?;
//! for id in ids {
//!     registry.start(id)?;
//! }
//! ```

mod error;
mod loader;
mod registry;

pub use error::{LoaderError, RegistryError};
pub use loader::{LoadMode, LoadedModule, ModuleLoader};
pub use registry::{PluginHandle, PluginInfo, PluginRegistry, PluginState};
