//! Loader and registry error types

use std::path::PathBuf;
use thiserror::Error;

use super::loader::LoadMode;

/// Errors from reading a module off disk
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Path does not exist
    #[error("Module file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Not a native shared object, or not one built against the plugin API
    #[error("{path} is not a loadable module: {reason}")]
    NotAModule { path: PathBuf, reason: String },

    /// A valid module that exports no plugin types
    #[error("{path} does not contain any plugins")]
    NotAPlugin { path: PathBuf },

    /// API version mismatch between hermod and the module
    #[error("API version mismatch: hermod expects {expected}, module has {found}")]
    ApiVersionMismatch { expected: u32, found: u32 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    pub(crate) fn not_a_module(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::NotAModule {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether a bulk directory scan should skip this error rather than
    /// report it as a failure
    pub fn is_ignorable_in(&self, mode: LoadMode) -> bool {
        mode == LoadMode::Permissive && matches!(self, Self::NotAModule { .. } | Self::NotAPlugin { .. })
    }
}

/// Errors from registering or managing plugins
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Construction or `on_load` failed; the registry is unchanged
    #[error("Failed to load plugin {type_name}: {reason}")]
    PluginLoad { type_name: String, reason: String },

    /// No plugin with this id
    #[error("Plugin {id} not found")]
    NotFound { id: String },

    /// A lifecycle hook failed
    #[error("Plugin '{name}' failed in {hook}: {reason}")]
    Hook {
        name: String,
        hook: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Loader(#[from] LoaderError),
}

impl RegistryError {
    pub(crate) fn plugin_load(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PluginLoad {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }
}
