//! Plugin metadata, descriptors and host notifications

use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{DescribedPlugin, Plugin};

/// Static metadata attached to a plugin type
///
/// This is what the loader reads from a module before any plugin instance
/// exists. The name is what the `unload-plugin` built-in matches against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginMetadata {
    /// Plugin name
    pub name: String,
    /// Plugin version
    pub version: Version,
    /// API version this plugin was built against
    pub api_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            ..Default::default()
        }
    }

    pub fn with_author(mut self, name: impl Into<String>, email: Option<&str>) -> Self {
        self.author_name = Some(name.into());
        self.author_email = email.map(str::to_string);
        self
    }

    pub fn with_homepage(mut self, homepage: impl Into<String>) -> Self {
        self.homepage = Some(homepage.into());
        self
    }
}

impl Default for PluginMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: Version::new(0, 0, 1),
            api_version: crate::API_VERSION,
            author_name: None,
            author_email: None,
            homepage: None,
        }
    }
}

impl fmt::Display for PluginMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{}", self.name, self.version)
    }
}

/// Constructs a fresh plugin instance. `None` means construction failed.
pub type PluginFactory = fn() -> Option<Box<dyn Plugin>>;

/// One loadable plugin type exported by a module
#[derive(Clone)]
pub struct PluginDescriptor {
    pub metadata: PluginMetadata,
    /// Stable identifier of the implementing type, unique within its module
    pub type_name: String,
    pub factory: PluginFactory,
}

impl PluginDescriptor {
    pub fn new(metadata: PluginMetadata, type_name: impl Into<String>, factory: PluginFactory) -> Self {
        Self {
            metadata,
            type_name: type_name.into(),
            factory,
        }
    }

    /// Describe a plugin type through its [`DescribedPlugin`] implementation
    pub fn of<P: DescribedPlugin>() -> Self {
        Self {
            metadata: P::describe(),
            type_name: std::any::type_name::<P>().to_string(),
            factory: || Some(Box::new(P::default())),
        }
    }

    pub fn instantiate(&self) -> Option<Box<dyn Plugin>> {
        (self.factory)()
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("metadata", &self.metadata)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A configuration value changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChangedEvent {
    /// Dot-notation key, e.g. `Logging.ConsoleLogging.LogLevel`
    pub key: String,
    pub old_value: Option<serde_json::Value>,
    pub new_value: serde_json::Value,
}
