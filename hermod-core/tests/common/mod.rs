//! In-process plugins shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hermod_core::{Hermod, HermodConfig, JsonConfigStore, LoadedModule};
use hermod_plugin_api::semver::Version;
use hermod_plugin_api::{
    Command, CommandResult, ConfigChangedEvent, DescribedPlugin, Message, Plugin, PluginDelegator,
    PluginDescriptor, PluginError, PluginMetadata,
};

pub fn hermod() -> Arc<Hermod> {
    Hermod::new(
        HermodConfig::default(),
        Arc::new(JsonConfigStore::in_memory()),
    )
}

pub fn module_of<P: DescribedPlugin>(id: &str) -> LoadedModule {
    LoadedModule::from_descriptors(id, vec![PluginDescriptor::of::<P>()])
}

pub fn line(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Record every payload delivered to `delegator`
pub fn record(delegator: &PluginDelegator) -> Arc<Mutex<Vec<serde_json::Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    delegator.on_message(move |message: &Message| {
        sink.lock().unwrap().push(message.payload.clone());
        Ok(())
    });
    seen
}

macro_rules! described {
    ($ty:ty, $name:expr) => {
        impl DescribedPlugin for $ty {
            fn describe() -> PluginMetadata {
                PluginMetadata::new($name, Version::new(1, 0, 0))
            }
        }
    };
}

/// Declares `echo` and subscribes to `/t/1` on load
#[derive(Default)]
pub struct EchoPlugin;

impl Plugin for EchoPlugin {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("echo", "Echo the arguments", |args| {
            Ok(CommandResult::message(args.join(" ")))
        })]
    }

    fn on_load(&mut self, delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        delegator.subscribe_topic("/t/1")
    }
}

described!(EchoPlugin, "echo-test");

/// Loads and does nothing else
#[derive(Default)]
pub struct Listener;

impl Plugin for Listener {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn on_load(&mut self, _delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        Ok(())
    }
}

described!(Listener, "listener");

/// Subscribes, then refuses to load
#[derive(Default)]
pub struct FailsOnLoad;

impl Plugin for FailsOnLoad {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn on_load(&mut self, delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        delegator.subscribe_topic("/fail/topic")?;
        Err(PluginError::custom("refusing to load"))
    }
}

described!(FailsOnLoad, "fails-on-load");

#[derive(Default)]
pub struct PanicsOnLoad;

impl Plugin for PanicsOnLoad {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn on_load(&mut self, delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        delegator.subscribe_topic("/panic/topic")?;
        panic!("on_load exploded");
    }
}

described!(PanicsOnLoad, "panics-on-load");

/// Tries to shadow the `quit` built-in
#[derive(Default)]
pub struct QuitShadow;

impl Plugin for QuitShadow {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn commands(&self) -> Vec<Command> {
        vec![Command::new("quit", "Plugin quit", |_| {
            Ok(CommandResult::message("plugin quit"))
        })]
    }

    fn on_load(&mut self, _delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        Ok(())
    }
}

described!(QuitShadow, "quit-shadow");

pub static LOAD_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Counts `on_load` calls in [`LOAD_COUNT`]
#[derive(Default)]
pub struct LoadCounter;

impl Plugin for LoadCounter {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn on_load(&mut self, _delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        LOAD_COUNT.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

described!(LoadCounter, "load-counter");

pub static STOP_COUNT: AtomicUsize = AtomicUsize::new(0);
pub static CONFIG_CHANGES: AtomicUsize = AtomicUsize::new(0);

/// Writes config from `on_start`, counts config changes and stops
#[derive(Default)]
pub struct ConfigWriter {
    delegator: Option<Arc<PluginDelegator>>,
}

impl Plugin for ConfigWriter {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn on_load(&mut self, delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        self.delegator = Some(delegator);
        Ok(())
    }

    fn on_start(&mut self) -> Result<(), PluginError> {
        let delegator = self.delegator.as_ref().ok_or(PluginError::HostUnavailable)?;
        delegator.set_application_config("ConfigWriter.Started", &true)
    }

    fn on_stop(&mut self) -> Result<(), PluginError> {
        STOP_COUNT.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_config_changed(&mut self, event: &ConfigChangedEvent) -> Result<(), PluginError> {
        if event.key == "Watched.Key" {
            CONFIG_CHANGES.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

described!(ConfigWriter, "config-writer");

/// On `/reentrant/first`, subscribes to `/reentrant/second` and publishes there
#[derive(Default)]
pub struct Reentrant;

impl Plugin for Reentrant {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn on_load(&mut self, delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        delegator.subscribe_topic("/reentrant/first")?;
        let weak = Arc::downgrade(&delegator);
        delegator.on_message(move |message| {
            let Some(delegator) = weak.upgrade() else {
                return Ok(());
            };
            if message.topic == "/reentrant/first" {
                delegator.subscribe_topic("/reentrant/second")?;
                delegator.publish_message("/reentrant/second", &"again")?;
            }
            Ok(())
        });
        Ok(())
    }
}

described!(Reentrant, "reentrant");

pub static FLAKY_CHANGES: AtomicUsize = AtomicUsize::new(0);
pub static FLAKY_LOADS: AtomicUsize = AtomicUsize::new(0);

/// Panics on every config change and fails every config load
#[derive(Default)]
pub struct FlakyConfig;

impl Plugin for FlakyConfig {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn on_load(&mut self, _delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_config_changed(&mut self, _event: &ConfigChangedEvent) -> Result<(), PluginError> {
        FLAKY_CHANGES.fetch_add(1, Ordering::SeqCst);
        panic!("config change exploded");
    }

    fn on_config_loaded(&mut self) -> Result<(), PluginError> {
        FLAKY_LOADS.fetch_add(1, Ordering::SeqCst);
        Err(PluginError::custom("cannot reload"))
    }
}

described!(FlakyConfig, "flaky-config");

pub static RECORDED_CHANGES: Mutex<Vec<String>> = Mutex::new(Vec::new());
pub static RECORDED_LOADS: AtomicUsize = AtomicUsize::new(0);

/// Records the keys of config changes and counts config loads
#[derive(Default)]
pub struct ConfigRecorder;

impl Plugin for ConfigRecorder {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn on_load(&mut self, _delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_config_changed(&mut self, event: &ConfigChangedEvent) -> Result<(), PluginError> {
        RECORDED_CHANGES.lock().unwrap().push(event.key.clone());
        Ok(())
    }

    fn on_config_loaded(&mut self) -> Result<(), PluginError> {
        RECORDED_LOADS.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

described!(ConfigRecorder, "config-recorder");
