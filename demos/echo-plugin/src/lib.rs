//! Echo Plugin - a demo plugin for hermod
//!
//! This plugin demonstrates:
//! - Exporting plugin types with the `export_plugins!` macro
//! - Declaring a command with options (`echo [--upper] <words...>`)
//! - Subscribing to a topic and publishing replies
//! - Running a background worker between `on_start` and `on_stop`
//!
//! ## Building
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! ## Installing
//!
//! ```bash
//! cp target/release/libecho_plugin.so ~/.local/share/hermod/plugins/
//! hermod -i
//! ```
//!
//! or, from a running shell: `load-plugin target/release/libecho_plugin.so`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use hermod_plugin_api::semver::Version;
use hermod_plugin_api::{
    Command, CommandArgs, CommandOption, CommandResult, ConfigChangedEvent, DescribedPlugin,
    Message, ParseStyle, Plugin, PluginDelegator, PluginError, PluginMetadata, export_plugins,
};

pub const INBOX: &str = "/hermod/echo/in";
pub const OUTBOX: &str = "/hermod/echo/out";
pub const TICKS: &str = "/hermod/echo/tick";

const TICK_KEY: &str = "EchoPlugin.TickSeconds";
const DEFAULT_TICK_SECONDS: u64 = 30;

/// Echoes commands and messages, and publishes a heartbeat while running
#[derive(Default)]
pub struct EchoPlugin {
    delegator: Option<Arc<PluginDelegator>>,
    worker: Option<Worker>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(delegator: Arc<PluginDelegator>, period: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::spawn(move || {
            let mut ticks: u64 = 0;
            let mut next = Instant::now() + period;
            while !flag.load(Ordering::Relaxed) {
                if Instant::now() >= next {
                    ticks += 1;
                    if let Err(e) = delegator.publish_message(TICKS, &ticks) {
                        delegator.warning(&format!("Tick not published: {e}"));
                    }
                    next += period;
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        });
        Self { stop, handle }
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.handle.join();
    }
}

fn upper_option() -> CommandOption {
    CommandOption::flag("upper", Some('u'))
}

fn echo_command() -> Command {
    Command::new("echo", "Prints its arguments", |args| {
        let parsed = CommandArgs::parse(args, &[upper_option()], ParseStyle::Posix)?;
        let text = parsed.args.join(" ");
        Ok(if parsed.has_flag("upper") {
            CommandResult::message(text.to_uppercase())
        } else {
            CommandResult::message(text)
        })
    })
    .with_long_description("echo [--upper] <words...>\n\nJoins the words with spaces and prints them.")
    .with_option(upper_option())
}

impl EchoPlugin {
    fn tick_period(&self) -> Duration {
        let seconds = self
            .delegator
            .as_ref()
            .and_then(|d| d.try_get_application_config::<u64>(TICK_KEY))
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_TICK_SECONDS);
        Duration::from_secs(seconds)
    }

    fn restart_worker(&mut self) {
        let Some(delegator) = self.delegator.clone() else {
            return;
        };
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        self.worker = Some(Worker::spawn(delegator, self.tick_period()));
    }
}

impl Plugin for EchoPlugin {
    fn metadata(&self) -> PluginMetadata {
        Self::describe()
    }

    fn commands(&self) -> Vec<Command> {
        vec![echo_command()]
    }

    fn on_load(&mut self, delegator: Arc<PluginDelegator>) -> Result<(), PluginError> {
        delegator.subscribe_topic(INBOX)?;

        let weak = Arc::downgrade(&delegator);
        delegator.on_message(move |message: &Message| {
            let Some(delegator) = weak.upgrade() else {
                return Ok(());
            };
            if message.topic == INBOX {
                delegator.publish_message(OUTBOX, &message.payload)?;
            }
            Ok(())
        });

        delegator.information("Echo plugin loaded");
        self.delegator = Some(delegator);
        Ok(())
    }

    fn on_start(&mut self) -> Result<(), PluginError> {
        self.restart_worker();
        Ok(())
    }

    fn on_stop(&mut self) -> Result<(), PluginError> {
        if let Some(worker) = self.worker.take() {
            worker.stop();
        }
        Ok(())
    }

    fn on_config_changed(&mut self, event: &ConfigChangedEvent) -> Result<(), PluginError> {
        if event.key == TICK_KEY && self.worker.is_some() {
            self.restart_worker();
        }
        Ok(())
    }
}

impl DescribedPlugin for EchoPlugin {
    fn describe() -> PluginMetadata {
        PluginMetadata::new("echo", Version::new(0, 1, 0))
            .with_author("hermod developers", None)
            .with_homepage("https://github.com/hermod-mail/hermod")
    }
}

export_plugins!(EchoPlugin);

#[cfg(test)]
mod tests {
    use super::*;

    fn run(args: &[&str]) -> CommandResult {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        echo_command().invoke(&args).unwrap()
    }

    #[test]
    fn echo_joins_arguments() {
        assert_eq!(run(&["hello", "world"]).message_text(), Some("hello world"));
    }

    #[test]
    fn echo_upper_flag() {
        assert_eq!(run(&["-u", "quiet"]).message_text(), Some("QUIET"));
        assert_eq!(run(&["--upper", "a", "b"]).message_text(), Some("A B"));
    }

    #[test]
    fn echo_rejects_unknown_option() {
        let err = echo_command().invoke(&["--nope".to_string()]).unwrap_err();
        assert!(matches!(err, PluginError::UnknownOption(_)));
    }

    #[test]
    fn exports_descriptor() {
        assert_eq!(_hermod_plugin_api_version(), hermod_plugin_api::API_VERSION);
        let descriptors = unsafe { Box::from_raw(_hermod_plugin_descriptors()) };
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].metadata.name, "echo");
        assert!(descriptors[0].instantiate().is_some());
    }

    #[test]
    fn stop_without_start_is_fine() {
        let mut plugin = EchoPlugin::default();
        assert!(plugin.on_stop().is_ok());
        assert!(plugin.worker.is_none());
    }
}
