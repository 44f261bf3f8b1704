//! Commands provided by the host itself
//!
//! Built-ins are registered before any plugin and always win name
//! resolution, so a plugin can never shadow `quit` or `unload-plugin`.

use std::path::Path;
use std::sync::{Arc, Weak};

use hermod_plugin_api::{
    ArgumentKind, Command, CommandArgs, CommandOption, CommandResult, ParseStyle, PluginError,
};

use crate::host::Hermod;

pub(crate) fn builtin_commands(host: Weak<Hermod>) -> Vec<Command> {
    vec![
        help(host.clone()),
        load_plugin(host.clone()),
        unload_plugin(host.clone()),
        get_plugins(host.clone()),
        get_topics(host.clone()),
        quit(host),
    ]
}

fn upgrade(host: &Weak<Hermod>) -> Result<Arc<Hermod>, PluginError> {
    host.upgrade().ok_or(PluginError::HostUnavailable)
}

fn help(host: Weak<Hermod>) -> Command {
    Command::new("help", "Lists available commands, or describes one", move |args| {
        let hermod = upgrade(&host)?;
        let registry = hermod.registry();

        if let Some(name) = args.first() {
            return Ok(match registry.find_command(name) {
                Some(command) => CommandResult::message(describe(&command)),
                None => CommandResult::error(format!("No help available: {name} is not a command")),
            });
        }

        let mut out = String::from("Built-ins:\n");
        for command in registry.builtin_commands() {
            out.push_str(&format!("{:<30}{}\n", command.name(), command.short_description()));
        }
        let plugin_commands = registry.plugin_commands();
        if !plugin_commands.is_empty() {
            out.push_str("\nPlugin provided:\n");
            for command in plugin_commands {
                out.push_str(&format!("{:<30}{}\n", command.name(), command.short_description()));
            }
        }
        Ok(CommandResult::message(out.trim_end()))
    })
    .with_long_description("help [command]\n\nWithout arguments, lists every command. With a command name, shows its description and options.")
}

fn describe(command: &Command) -> String {
    let mut out = format!("{} - {}", command.name(), command.short_description());
    if let Some(long) = command.long_description() {
        out.push_str("\n\n");
        out.push_str(long);
    }
    if !command.options().is_empty() {
        out.push_str("\n\nOptions:");
        for option in command.options() {
            let short = option.short.map(|c| format!("-{c}, ")).unwrap_or_default();
            let value = match option.argument {
                ArgumentKind::None => "",
                ArgumentKind::Required => " <value>",
                ArgumentKind::Optional => " [value]",
            };
            out.push_str(&format!("\n  {short}--{}{value}", option.long));
        }
    }
    out
}

fn load_plugin(host: Weak<Hermod>) -> Command {
    Command::new("load-plugin", "Loads plugin modules from the given paths", move |args| {
        let hermod = upgrade(&host)?;
        if args.is_empty() {
            return Ok(CommandResult::error("Usage: load-plugin <path...>"));
        }

        let mut loaded = 0;
        let mut first_failure = None;
        for path in args {
            match hermod.load_module_file(Path::new(path)) {
                Ok(ids) => loaded += ids.len(),
                Err(e) => {
                    tracing::error!(module = %path, error = %e, "Failed to load plugin");
                    first_failure.get_or_insert(e);
                }
            }
        }

        Ok(match first_failure {
            Some(e) => CommandResult::error_with_cause("Failed to load one or more plugins!", e),
            None => CommandResult::message(format!("Successfully loaded {loaded} plugin(s).")),
        })
    })
    .with_long_description("load-plugin <path...>\n\nLoads each module, registers its plugins and starts them. Any failure is reported.")
}

fn unload_plugin(host: Weak<Hermod>) -> Command {
    let options = vec![CommandOption::flag("all", Some('a'))];
    let parse_options = options.clone();

    let command = Command::new("unload-plugin", "Stops and unloads plugins by name", move |args| {
        let hermod = upgrade(&host)?;
        let registry = hermod.registry();
        let parsed = CommandArgs::parse(args, &parse_options, ParseStyle::WithWindows)?;

        if parsed.has_flag("all") {
            let count = registry.unload_all();
            return Ok(CommandResult::message(format!("Unloaded {count} plugin(s).")));
        }
        if parsed.args.is_empty() {
            return Ok(CommandResult::error("Usage: unload-plugin <name...> | --all"));
        }

        let mut unloaded = 0;
        let mut missing = Vec::new();
        for name in &parsed.args {
            let ids = registry.find_by_name(name);
            if ids.is_empty() {
                missing.push(name.as_str());
            }
            for id in ids {
                if registry.unload(id).is_ok() {
                    unloaded += 1;
                }
            }
        }

        Ok(if missing.is_empty() {
            CommandResult::message(format!("Unloaded {unloaded} plugin(s)."))
        } else {
            CommandResult::error(format!("No plugin loaded named: {}", missing.join(", ")))
        })
    })
    .with_long_description("unload-plugin <name...> | --all\n\nCalls on_stop for each running plugin with a matching name, then removes it.");

    options.into_iter().fold(command, Command::with_option)
}

fn get_plugins(host: Weak<Hermod>) -> Command {
    Command::new("get-plugins", "Lists loaded plugins", move |_| {
        let hermod = upgrade(&host)?;
        let plugins = hermod.registry().plugins();
        if plugins.is_empty() {
            return Ok(CommandResult::message("No plugins loaded."));
        }

        let lines: Vec<String> = plugins
            .iter()
            .map(|p| format!("{} v{} [{}] {}", p.name, p.version, p.state, p.module))
            .collect();
        CommandResult::json(Some(lines.join("\n")), &plugins)
    })
}

fn get_topics(host: Weak<Hermod>) -> Command {
    Command::new("get-topics", "Lists known topics and their subscriber counts", move |_| {
        let hermod = upgrade(&host)?;
        let topics = hermod.bus().topics();
        if topics.is_empty() {
            return Ok(CommandResult::message("No topics."));
        }

        let lines: Vec<String> = topics
            .iter()
            .map(|(topic, subscribers)| format!("{topic} ({subscribers} subscriber(s))"))
            .collect();
        Ok(CommandResult::message(lines.join("\n")))
    })
}

fn quit(host: Weak<Hermod>) -> Command {
    Command::new("quit", "Stops all plugins and exits", move |_| {
        let hermod = upgrade(&host)?;
        hermod.request_exit();
        Ok(CommandResult::message("Bye!"))
    })
}
