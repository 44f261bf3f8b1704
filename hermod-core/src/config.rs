//! Application configuration
//!
//! A JSON document addressed with dot-notation keys such as
//! `Logging.ConsoleLogging.LogLevel`. Keys missing from the document fall
//! back to the built-in defaults. The host consumes it through
//! [`ConfigProvider`]; plugins reach it through their delegator.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use hermod_plugin_api::ConfigChangedEvent;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Errors from the configuration store
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration key not found: {key}")]
    NotFound { key: String },

    #[error("Invalid configuration key: {key:?}")]
    InvalidKey { key: String },

    /// A key walks through a value that is not an object, or a value does
    /// not have the requested type
    #[error("Type mismatch at {key}: {reason}")]
    TypeMismatch { key: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a config listener is told about
#[derive(Debug, Clone)]
pub enum ConfigNotification {
    Changed(ConfigChangedEvent),
    Loaded,
}

pub type ConfigListener = Arc<dyn Fn(&ConfigNotification) + Send + Sync>;

/// Key/value access to the application configuration
pub trait ConfigProvider: Send + Sync {
    fn get(&self, key: &str) -> Result<Value, ConfigError>;

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError>;

    fn save(&self) -> Result<(), ConfigError>;

    fn load(&self) -> Result<(), ConfigError>;

    /// Install the listener told about changes and reloads
    fn set_listener(&self, listener: ConfigListener);
}

/// Typed accessors on top of [`ConfigProvider`]
pub trait ConfigProviderExt: ConfigProvider {
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConfigError> {
        let value = self.get(key)?;
        serde_json::from_value(value).map_err(|e| ConfigError::TypeMismatch {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn set_as<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        self.set(key, serde_json::to_value(value)?)
    }
}

impl<P: ConfigProvider + ?Sized> ConfigProviderExt for P {}

/// Default configuration document
pub fn defaults() -> Value {
    json!({
        "Logging": {
            "ConsoleLogging": {
                "EnableLogging": true,
                "LogLevel": "warning"
            },
            "FileLogging": {
                "EnableLogging": false,
                "LogLevel": "information"
            }
        },
        "Plugins": {
            "InstallDir": "",
            "AutoStart": true
        }
    })
}

fn split_key(key: &str) -> Result<Vec<&str>, ConfigError> {
    let parts: Vec<&str> = key.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(ConfigError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(parts)
}

fn lookup<'a>(document: &'a Value, parts: &[&str]) -> Option<&'a Value> {
    parts.iter().try_fold(document, |node, part| node.get(part))
}

/// JSON file backed configuration store
pub struct JsonConfigStore {
    path: Option<PathBuf>,
    document: RwLock<Value>,
    listener: RwLock<Option<ConfigListener>>,
}

impl JsonConfigStore {
    /// Open the store at `path`, loading it (or creating it from defaults)
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let store = Self {
            path: Some(path.into()),
            document: RwLock::new(defaults()),
            listener: RwLock::new(None),
        };
        store.load()?;
        Ok(store)
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: RwLock::new(defaults()),
            listener: RwLock::new(None),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the whole document with the defaults and save
    pub fn reset(&self) -> Result<(), ConfigError> {
        *self.document.write().unwrap_or_else(PoisonError::into_inner) = defaults();
        tracing::info!("Configuration reset to defaults");
        self.save()
    }

    fn notify(&self, notification: &ConfigNotification) {
        let listener = self
            .listener
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(listener) = listener {
            listener(notification);
        }
    }
}

impl ConfigProvider for JsonConfigStore {
    fn get(&self, key: &str) -> Result<Value, ConfigError> {
        let parts = split_key(key)?;
        let document = self.document.read().unwrap_or_else(PoisonError::into_inner);
        lookup(&document, &parts)
            .cloned()
            .or_else(|| lookup(&defaults(), &parts).cloned())
            .ok_or_else(|| ConfigError::NotFound {
                key: key.to_string(),
            })
    }

    fn set(&self, key: &str, value: Value) -> Result<(), ConfigError> {
        let parts = split_key(key)?;
        let old_value = {
            let mut document = self.document.write().unwrap_or_else(PoisonError::into_inner);
            let (last, parents) = parts
                .split_last()
                .ok_or_else(|| ConfigError::InvalidKey {
                    key: key.to_string(),
                })?;

            let mut node = &mut *document;
            for (depth, part) in parents.iter().enumerate() {
                let Value::Object(map) = node else {
                    return Err(ConfigError::TypeMismatch {
                        key: parts[..depth].join("."),
                        reason: "not an object".to_string(),
                    });
                };
                node = map
                    .entry(part.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            let Value::Object(map) = node else {
                return Err(ConfigError::TypeMismatch {
                    key: parents.join("."),
                    reason: "not an object".to_string(),
                });
            };
            map.insert(last.to_string(), value.clone())
        };

        tracing::debug!(key = %key, "Configuration value set");
        self.notify(&ConfigNotification::Changed(ConfigChangedEvent {
            key: key.to_string(),
            old_value,
            new_value: value,
        }));
        Ok(())
    }

    fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = {
            let document = self.document.read().unwrap_or_else(PoisonError::into_inner);
            serde_json::to_string_pretty(&*document)?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Re-read the file. A missing or empty file is replaced by the
    /// defaults; a corrupt one is left alone and the defaults are used.
    fn load(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            self.notify(&ConfigNotification::Loaded);
            return Ok(());
        };

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            *self.document.write().unwrap_or_else(PoisonError::into_inner) = defaults();
            self.save()?;
            tracing::info!(path = %path.display(), "Created default configuration");
        } else {
            let document = match serde_json::from_str::<Value>(&contents) {
                Ok(document @ Value::Object(_)) => document,
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "Configuration is not a JSON object, using defaults");
                    defaults()
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Configuration is corrupt, using defaults");
                    defaults()
                }
            };
            *self.document.write().unwrap_or_else(PoisonError::into_inner) = document;
        }

        self.notify(&ConfigNotification::Loaded);
        Ok(())
    }

    fn set_listener(&self, listener: ConfigListener) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_visible_through_get() {
        let store = JsonConfigStore::in_memory();
        assert_eq!(
            store.get("Logging.ConsoleLogging.LogLevel").unwrap(),
            json!("warning")
        );
        let auto_start: bool = store.get_as("Plugins.AutoStart").unwrap();
        assert!(auto_start);
    }

    #[test]
    fn test_missing_and_invalid_keys() {
        let store = JsonConfigStore::in_memory();
        assert!(matches!(store.get("Nope.Never"), Err(ConfigError::NotFound { .. })));
        assert!(matches!(store.get("a..b"), Err(ConfigError::InvalidKey { .. })));
        assert!(matches!(store.get(""), Err(ConfigError::InvalidKey { .. })));
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let store = JsonConfigStore::in_memory();
        store.set("Mail.Imap.Port", json!(993)).unwrap();
        let port: u16 = store.get_as("Mail.Imap.Port").unwrap();
        assert_eq!(port, 993);
    }

    #[test]
    fn test_set_through_scalar_is_type_mismatch() {
        let store = JsonConfigStore::in_memory();
        let err = store
            .set("Plugins.AutoStart.Nested", json!(1))
            .unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { ref key, .. } if key == "Plugins.AutoStart"));
    }

    #[test]
    fn test_get_as_wrong_type() {
        let store = JsonConfigStore::in_memory();
        let err = store.get_as::<u32>("Logging.ConsoleLogging.LogLevel").unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn test_listener_sees_changes_with_old_value() {
        let store = JsonConfigStore::in_memory();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.set_listener(Arc::new(move |n| sink.lock().unwrap().push(n.clone())));

        store.set_as("Plugins.AutoStart", &false).unwrap();

        let seen = seen.lock().unwrap();
        let ConfigNotification::Changed(event) = &seen[0] else {
            panic!("expected a change notification");
        };
        assert_eq!(event.key, "Plugins.AutoStart");
        assert_eq!(event.old_value, Some(json!(true)));
        assert_eq!(event.new_value, json!(false));
    }

    #[test]
    fn test_open_creates_file_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("hermod.json");

        let store = JsonConfigStore::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, defaults());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hermod.json");

        let store = JsonConfigStore::open(&path).unwrap();
        store.set("Plugins.InstallDir", json!("/opt/hermod/plugins")).unwrap();
        store.save().unwrap();

        let reopened = JsonConfigStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("Plugins.InstallDir").unwrap(),
            json!("/opt/hermod/plugins")
        );
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hermod.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonConfigStore::open(&path).unwrap();
        assert_eq!(store.get("Plugins.AutoStart").unwrap(), json!(true));
        // The broken file is left for the operator to inspect
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_reset_restores_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hermod.json");
        let store = JsonConfigStore::open(&path).unwrap();
        store.set("Custom.Key", json!("x")).unwrap();

        store.reset().unwrap();
        assert!(store.get("Custom.Key").is_err());
    }
}
