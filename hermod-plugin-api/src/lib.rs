//! hermod-plugin-api - Plugin API for the hermod host
//!
//! This crate provides the traits and types needed to write plugins for
//! hermod. Plugins are native Rust dynamic libraries that contribute
//! commands, exchange messages over hierarchical topics, and read the
//! application configuration through their [`PluginDelegator`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hermod_plugin_api::{
//!     DescribedPlugin, Plugin, PluginDelegator, PluginError, PluginMetadata, export_plugins,
//! };
//!
//! #[derive(Default)]
//! pub struct MyPlugin;
//!
//! impl DescribedPlugin for MyPlugin {
//!     fn describe() -> PluginMetadata {
//!         PluginMetadata::new("my-plugin", semver::Version::new(0, 1, 0))
//!     }
//! }
//!
//! impl Plugin for MyPlugin {
//!     fn metadata(&self) -> PluginMetadata {
//!         Self::describe()
//!     }
//!
//!     fn on_load(&mut self, delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
//!         delegator.information("Plugin loaded!");
//!         Ok(())
//!     }
//! }
//!
//! export_plugins!(MyPlugin);
//! ```

use std::sync::Arc;

pub mod command;
pub mod delegator;
pub mod error;
pub mod result;
pub mod types;

pub use command::{ArgumentKind, Command, CommandArgs, CommandHandler, CommandOption, ParseStyle};
pub use delegator::{HostServices, Message, MessageHandler, PluginDelegator, PluginId};
pub use error::PluginError;
pub use result::CommandResult;
pub use types::*;

/// Re-exported so plugins build their metadata against the same version type
pub use semver;

/// Level for [`PluginDelegator::log`]
pub use tracing::Level;

/// Current plugin API version. Modules must match this exactly.
pub const API_VERSION: u32 = 1;

/// The core plugin trait - implement this to create a hermod plugin.
///
/// Lifecycle hooks other than `on_load` default to no-ops. The host calls
/// `on_load` exactly once, right after construction, with the plugin's
/// delegator; keep it if you need to talk to the host later.
pub trait Plugin: Send + Sync {
    /// Return plugin metadata
    fn metadata(&self) -> PluginMetadata;

    /// Commands this plugin contributes. Read once, at registration.
    fn commands(&self) -> Vec<Command> {
        Vec::new()
    }

    /// Called once after construction. Returning an error aborts registration.
    fn on_load(&mut self, delegator: Arc<PluginDelegator>) -> Result<(), PluginError>;

    /// Start background work. Must not block indefinitely.
    fn on_start(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Stop background work and release resources. Called before unload.
    fn on_stop(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_config_changed(&mut self, _event: &ConfigChangedEvent) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_config_loaded(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Static metadata for a plugin type, readable without an instance.
///
/// Types exported through [`export_plugins!`] must implement this.
pub trait DescribedPlugin: Plugin + Default + 'static {
    fn describe() -> PluginMetadata;
}

/// Export plugin types for dynamic loading.
///
/// This macro generates the C ABI entry points the hermod loader looks for.
///
/// # Usage
///
/// ```ignore
/// hermod_plugin_api::export_plugins!(MyPlugin, MyOtherPlugin);
/// ```
///
/// # Generated Functions
///
/// - `_hermod_plugin_api_version()`: Returns the API version
/// - `_hermod_plugin_descriptors()`: Returns a boxed list of descriptors, one
///   per exported type, in the order given
#[macro_export]
macro_rules! export_plugins {
    ($($plugin_type:ty),+ $(,)?) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _hermod_plugin_api_version() -> u32 {
            $crate::API_VERSION
        }

        #[unsafe(no_mangle)]
        #[allow(improper_ctypes_definitions)]
        pub extern "C" fn _hermod_plugin_descriptors() -> *mut ::std::vec::Vec<$crate::PluginDescriptor> {
            let descriptors = ::std::vec![$($crate::PluginDescriptor::of::<$plugin_type>()),+];
            ::std::boxed::Box::into_raw(::std::boxed::Box::new(descriptors))
        }
    };
}
