//! The plugin's handle to the host
//!
//! Every registered plugin gets exactly one [`PluginDelegator`]. It is the
//! only way a plugin talks to the rest of the system: topic subscriptions,
//! publishing, command execution, logging and application configuration.
//! The host side is abstracted by [`HostServices`] so this crate does not
//! depend on the host.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::Level;

use crate::error::PluginError;
use crate::result::CommandResult;

/// Identity of one registered plugin instance. Never reused within a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PluginId(u64);

impl PluginId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A message delivered on a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
        }
    }

    /// Deserialize the payload into a concrete type
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, PluginError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Handler for messages on subscribed topics
pub type MessageHandler = Arc<dyn Fn(&Message) -> Result<(), PluginError> + Send + Sync>;

/// Services the host offers to plugins through their delegator
pub trait HostServices: Send + Sync {
    fn subscribe(&self, plugin: PluginId, topic: &str) -> Result<(), PluginError>;

    fn unsubscribe(&self, plugin: PluginId, topic: &str) -> Result<(), PluginError>;

    /// Publish to every subscriber of `topic`, returning the delivery count
    fn publish(&self, topic: &str, payload: serde_json::Value) -> Result<usize, PluginError>;

    /// Resolve and run a command line; the first element is the command name
    fn execute_command(&self, args: &[String]) -> CommandResult;

    fn get_config(&self, key: &str) -> Result<serde_json::Value, PluginError>;

    /// Set a configuration value and persist it
    fn set_config(&self, key: &str, value: serde_json::Value) -> Result<(), PluginError>;

    /// Emit a log line on the host's subscriber. Plugins in a loaded module
    /// carry their own `tracing` statics, so they must log through here.
    fn log(&self, plugin: &str, level: Level, message: &str);
}

/// Per-plugin gateway to the host
pub struct PluginDelegator {
    plugin_id: PluginId,
    plugin_name: String,
    host: Weak<dyn HostServices>,
    handlers: RwLock<Vec<MessageHandler>>,
    received: AtomicU64,
}

impl PluginDelegator {
    pub fn new(plugin_id: PluginId, plugin_name: impl Into<String>, host: Weak<dyn HostServices>) -> Self {
        Self {
            plugin_id,
            plugin_name: plugin_name.into(),
            host,
            handlers: RwLock::new(Vec::new()),
            received: AtomicU64::new(0),
        }
    }

    pub fn plugin_id(&self) -> PluginId {
        self.plugin_id
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    fn host(&self) -> Result<Arc<dyn HostServices>, PluginError> {
        self.host.upgrade().ok_or(PluginError::HostUnavailable)
    }

    // ─── Messaging ───────────────────────────────────────────────────

    pub fn subscribe_topic(&self, topic: &str) -> Result<(), PluginError> {
        self.host()?.subscribe(self.plugin_id, topic)
    }

    /// Subscribe to several topics. Failures are logged and skipped; returns
    /// how many subscriptions succeeded.
    pub fn subscribe_topics(&self, topics: &[&str]) -> usize {
        topics
            .iter()
            .filter(|topic| match self.subscribe_topic(topic) {
                Ok(()) => true,
                Err(e) => {
                    self.warning(&format!("Could not subscribe to {topic}: {e}"));
                    false
                }
            })
            .count()
    }

    pub fn unsubscribe_topic(&self, topic: &str) -> Result<(), PluginError> {
        self.host()?.unsubscribe(self.plugin_id, topic)
    }

    /// Publish `payload` on `topic`, returning the number of deliveries
    pub fn publish_message<T: Serialize>(&self, topic: &str, payload: &T) -> Result<usize, PluginError> {
        let payload = serde_json::to_value(payload)?;
        self.host()?.publish(topic, payload)
    }

    /// Register a handler for messages on this plugin's subscribed topics
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Message) -> Result<(), PluginError> + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Receive messages on a channel instead of a callback
    pub fn message_channel(&self) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.on_message(move |message| {
            // A dropped receiver just means the plugin stopped listening
            let _ = tx.send(message.clone());
            Ok(())
        });
        rx
    }

    /// Hand a message to this plugin's handlers. Called by the host's bus.
    ///
    /// Every handler runs even if an earlier one fails; the first error is
    /// returned.
    #[doc(hidden)]
    pub fn deliver(&self, message: &Message) -> Result<(), PluginError> {
        self.received.fetch_add(1, Ordering::Relaxed);
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut first_error = None;
        for handler in handlers {
            if let Err(e) = handler(message) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Messages delivered to this plugin so far
    pub fn received_count(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    // ─── Commands ────────────────────────────────────────────────────

    /// Execute a command by name, e.g. `["get-plugins"]`
    pub fn execute_command(&self, command: &[&str]) -> CommandResult {
        if command.is_empty() {
            return CommandResult::error("No command given");
        }
        let args: Vec<String> = command.iter().map(|s| s.to_string()).collect();
        match self.host() {
            Ok(host) => host.execute_command(&args),
            Err(e) => e.into(),
        }
    }

    // ─── Logging ─────────────────────────────────────────────────────

    /// Forward a log line to the host. Dropped once the host is gone.
    pub fn log(&self, level: Level, message: &str) {
        if let Ok(host) = self.host() {
            host.log(&self.plugin_name, level, message);
        }
    }

    pub fn trace(&self, message: &str) {
        self.log(Level::TRACE, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    pub fn information(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }

    // ─── Configuration ───────────────────────────────────────────────

    /// Read an application config value by dot-notation key
    pub fn get_application_config<T: DeserializeOwned>(&self, key: &str) -> Result<T, PluginError> {
        let value = self.host()?.get_config(key)?;
        serde_json::from_value(value).map_err(|e| PluginError::Config(format!("{key}: {e}")))
    }

    pub fn try_get_application_config<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_application_config(key).ok()
    }

    /// Set and persist an application config value
    pub fn set_application_config<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PluginError> {
        let value = serde_json::to_value(value)?;
        self.host()?.set_config(key, value)
    }

    pub fn try_set_application_config<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match self.set_application_config(key, value) {
            Ok(()) => true,
            Err(e) => {
                self.debug(&format!("Could not set {key}: {e}"));
                false
            }
        }
    }
}

impl fmt::Debug for PluginDelegator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDelegator")
            .field("plugin_id", &self.plugin_id)
            .field("plugin_name", &self.plugin_name)
            .field("received", &self.received_count())
            .finish_non_exhaustive()
    }
}
