//! Command resolution and execution

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use hermod_plugin_api::{Command, CommandResult};

use crate::plugins::PluginRegistry;

/// Resolves command names against the registry and runs them
///
/// Nothing a handler does escapes as a panic or an `Err`: every outcome is
/// a [`CommandResult`].
pub struct CommandDispatcher {
    registry: Arc<PluginRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// Built-ins first, then plugin commands in registration order
    pub fn resolve(&self, name: &str) -> Option<Command> {
        self.registry.find_command(name)
    }

    pub fn execute(&self, command: &Command, args: &[String]) -> CommandResult {
        run(command, args)
    }

    /// Resolve `line[0]` and run it with the rest of the line
    pub fn execute_line(&self, line: &[String]) -> CommandResult {
        let Some((name, args)) = line.split_first() else {
            return CommandResult::error("No command given");
        };
        match self.resolve(name) {
            Some(command) => run(&command, args),
            None => not_found(name),
        }
    }

    /// Same as [`execute_line`](Self::execute_line), on the blocking pool so
    /// slow handlers do not stall the runtime
    pub async fn execute_async(&self, line: Vec<String>) -> CommandResult {
        let Some(name) = line.first() else {
            return CommandResult::error("No command given");
        };
        let Some(command) = self.resolve(name) else {
            return not_found(name);
        };

        let args = line[1..].to_vec();
        match tokio::task::spawn_blocking(move || run(&command, &args)).await {
            Ok(result) => result,
            Err(e) => CommandResult::error_with_cause("Command task failed", e),
        }
    }
}

fn not_found(name: &str) -> CommandResult {
    CommandResult::error(format!(
        "The command {name} does not exist in hermod's namespace. Are the correct plugins loaded?"
    ))
}

fn run(command: &Command, args: &[String]) -> CommandResult {
    match std::panic::catch_unwind(AssertUnwindSafe(|| command.invoke(args))) {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            tracing::warn!(command = %command.name(), error = %e, "Command failed");
            CommandResult::error_with_cause(format!("Command {} failed", command.name()), e)
        }
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            tracing::error!(command = %command.name(), panic = %reason, "Command panicked");
            CommandResult::error(format!("Command {} panicked: {reason}", command.name()))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown cause"
    }
}
