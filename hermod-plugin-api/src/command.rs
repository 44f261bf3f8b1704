//! Commands contributed by plugins and the host
//!
//! A command is a name, help text, a declared option set and a handler. The
//! handler receives the raw argument vector (command name excluded) and can
//! parse it against its declared options with [`CommandArgs::parse`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::PluginError;
use crate::result::CommandResult;

/// Handler invoked when a command is executed
pub type CommandHandler =
    Arc<dyn Fn(&[String]) -> Result<CommandResult, PluginError> + Send + Sync>;

/// An executable command
#[derive(Clone)]
pub struct Command {
    name: String,
    short_description: String,
    long_description: Option<String>,
    options: Vec<CommandOption>,
    handler: CommandHandler,
}

impl Command {
    pub fn new<F>(name: impl Into<String>, short_description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&[String]) -> Result<CommandResult, PluginError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            short_description: short_description.into(),
            long_description: None,
            options: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn with_long_description(mut self, description: impl Into<String>) -> Self {
        self.long_description = Some(description.into());
        self
    }

    pub fn with_option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_description(&self) -> &str {
        &self.short_description
    }

    pub fn long_description(&self) -> Option<&str> {
        self.long_description.as_deref()
    }

    pub fn options(&self) -> &[CommandOption] {
        &self.options
    }

    /// Call the handler directly. Panics are not caught here; the host's
    /// dispatcher does that.
    pub fn invoke(&self, args: &[String]) -> Result<CommandResult, PluginError> {
        (self.handler)(args)
    }

    /// Parse `args` against this command's declared options, POSIX/GNU style
    pub fn parse_args(&self, args: &[String]) -> Result<CommandArgs, PluginError> {
        CommandArgs::parse(args, &self.options, ParseStyle::Posix)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("short_description", &self.short_description)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Whether an option takes a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    None,
    Required,
    Optional,
}

/// A declared command option, e.g. `--all` / `-a`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOption {
    pub long: String,
    pub short: Option<char>,
    pub argument: ArgumentKind,
}

impl CommandOption {
    /// Option without a value
    pub fn flag(long: impl Into<String>, short: Option<char>) -> Self {
        Self {
            long: long.into(),
            short,
            argument: ArgumentKind::None,
        }
    }

    pub fn required(long: impl Into<String>, short: Option<char>) -> Self {
        Self {
            long: long.into(),
            short,
            argument: ArgumentKind::Required,
        }
    }

    pub fn optional(long: impl Into<String>, short: Option<char>) -> Self {
        Self {
            long: long.into(),
            short,
            argument: ArgumentKind::Optional,
        }
    }
}

/// Which option prefixes are recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseStyle {
    /// `--long`, `--long=value`, `-abc`, `-nvalue`
    #[default]
    Posix,
    /// Posix plus `/long`, `/l` and `/long:value`
    WithWindows,
}

/// Arguments parsed against a command's declared options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    /// Positional arguments
    pub args: Vec<String>,
    /// Options present on the line, keyed by long name
    pub flags: HashMap<String, Option<String>>,
}

impl CommandArgs {
    pub fn parse(
        args: &[String],
        options: &[CommandOption],
        style: ParseStyle,
    ) -> Result<Self, PluginError> {
        let mut parsed = CommandArgs::default();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            i += 1;

            if arg == "--" {
                parsed.args.extend(args[i..].iter().cloned());
                break;
            }

            if let Some(body) = arg.strip_prefix("--") {
                let (name, inline) = match body.split_once('=') {
                    Some((name, value)) => (name, Some(value.to_string())),
                    None => (body, None),
                };
                let option = options
                    .iter()
                    .find(|o| o.long == name)
                    .ok_or_else(|| PluginError::UnknownOption(format!("--{name}")))?;
                let value = match option.argument {
                    ArgumentKind::None if inline.is_some() => {
                        return Err(PluginError::InvalidInput(format!(
                            "option --{name} takes no argument"
                        )));
                    }
                    ArgumentKind::None => None,
                    ArgumentKind::Optional => inline,
                    ArgumentKind::Required => match inline {
                        Some(value) => Some(value),
                        None => Some(take_next(args, &mut i, &format!("--{name}"))?),
                    },
                };
                parsed.flags.insert(option.long.clone(), value);
                continue;
            }

            if style == ParseStyle::WithWindows
                && let Some(body) = arg.strip_prefix('/')
            {
                let (name, inline) = match body.split_once(':') {
                    Some((name, value)) => (name, Some(value.to_string())),
                    None => (body, None),
                };
                let mut chars = name.chars();
                let short = match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                };
                let option = options
                    .iter()
                    .find(|o| o.long == name || (short.is_some() && o.short == short));
                // Not an option: a positional that happens to start with '/'
                let Some(option) = option else {
                    parsed.args.push(arg.clone());
                    continue;
                };
                let value = match option.argument {
                    ArgumentKind::None => None,
                    ArgumentKind::Optional => inline,
                    ArgumentKind::Required => match inline {
                        Some(value) => Some(value),
                        None => Some(take_next(args, &mut i, arg)?),
                    },
                };
                parsed.flags.insert(option.long.clone(), value);
                continue;
            }

            if let Some(cluster) = arg.strip_prefix('-')
                && !cluster.is_empty()
            {
                let chars: Vec<char> = cluster.chars().collect();
                let mut j = 0;
                while j < chars.len() {
                    let c = chars[j];
                    let option = options
                        .iter()
                        .find(|o| o.short == Some(c))
                        .ok_or_else(|| PluginError::UnknownOption(format!("-{c}")))?;
                    let rest: String = chars[j + 1..].iter().collect();
                    match option.argument {
                        ArgumentKind::None => {
                            parsed.flags.insert(option.long.clone(), None);
                            j += 1;
                        }
                        ArgumentKind::Optional => {
                            let value = (!rest.is_empty()).then_some(rest);
                            parsed.flags.insert(option.long.clone(), value);
                            break;
                        }
                        ArgumentKind::Required => {
                            let value = if rest.is_empty() {
                                take_next(args, &mut i, &format!("-{c}"))?
                            } else {
                                rest
                            };
                            parsed.flags.insert(option.long.clone(), Some(value));
                            break;
                        }
                    }
                }
                continue;
            }

            parsed.args.push(arg.clone());
        }

        Ok(parsed)
    }

    pub fn has_flag(&self, long: &str) -> bool {
        self.flags.contains_key(long)
    }

    pub fn flag_value(&self, long: &str) -> Option<&str> {
        self.flags.get(long).and_then(|v| v.as_deref())
    }
}

fn take_next(args: &[String], i: &mut usize, option: &str) -> Result<String, PluginError> {
    let value = args
        .get(*i)
        .cloned()
        .ok_or_else(|| PluginError::MissingArgument(option.to_string()))?;
    *i += 1;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn options() -> Vec<CommandOption> {
        vec![
            CommandOption::flag("all", Some('a')),
            CommandOption::flag("verbose", Some('v')),
            CommandOption::required("name", Some('n')),
            CommandOption::optional("color", Some('c')),
        ]
    }

    #[test]
    fn test_positional_only() {
        let parsed = CommandArgs::parse(&argv(&["one", "two"]), &options(), ParseStyle::Posix).unwrap();
        assert_eq!(parsed.args, vec!["one", "two"]);
        assert!(parsed.flags.is_empty());
    }

    #[test]
    fn test_long_options() {
        let parsed = CommandArgs::parse(
            &argv(&["--all", "--name=bob", "rest", "--color"]),
            &options(),
            ParseStyle::Posix,
        )
        .unwrap();
        assert!(parsed.has_flag("all"));
        assert_eq!(parsed.flag_value("name"), Some("bob"));
        assert!(parsed.has_flag("color"));
        assert_eq!(parsed.flag_value("color"), None);
        assert_eq!(parsed.args, vec!["rest"]);
    }

    #[test]
    fn test_long_required_takes_next_argument() {
        let parsed =
            CommandArgs::parse(&argv(&["--name", "alice"]), &options(), ParseStyle::Posix).unwrap();
        assert_eq!(parsed.flag_value("name"), Some("alice"));
        assert!(parsed.args.is_empty());
    }

    #[test]
    fn test_short_cluster() {
        let parsed = CommandArgs::parse(&argv(&["-av", "-nbob"]), &options(), ParseStyle::Posix).unwrap();
        assert!(parsed.has_flag("all"));
        assert!(parsed.has_flag("verbose"));
        assert_eq!(parsed.flag_value("name"), Some("bob"));
    }

    #[test]
    fn test_short_required_takes_next_argument() {
        let parsed = CommandArgs::parse(&argv(&["-an", "carol", "x"]), &options(), ParseStyle::Posix).unwrap();
        assert!(parsed.has_flag("all"));
        assert_eq!(parsed.flag_value("name"), Some("carol"));
        assert_eq!(parsed.args, vec!["x"]);
    }

    #[test]
    fn test_double_dash_terminates_options() {
        let parsed = CommandArgs::parse(&argv(&["-a", "--", "-v", "--name"]), &options(), ParseStyle::Posix).unwrap();
        assert!(parsed.has_flag("all"));
        assert!(!parsed.has_flag("verbose"));
        assert_eq!(parsed.args, vec!["-v", "--name"]);
    }

    #[test]
    fn test_unknown_options_are_errors() {
        let err = CommandArgs::parse(&argv(&["--bogus"]), &options(), ParseStyle::Posix).unwrap_err();
        assert!(matches!(err, PluginError::UnknownOption(ref o) if o == "--bogus"));

        let err = CommandArgs::parse(&argv(&["-x"]), &options(), ParseStyle::Posix).unwrap_err();
        assert!(matches!(err, PluginError::UnknownOption(ref o) if o == "-x"));
    }

    #[test]
    fn test_missing_required_argument() {
        let err = CommandArgs::parse(&argv(&["--name"]), &options(), ParseStyle::Posix).unwrap_err();
        assert!(matches!(err, PluginError::MissingArgument(_)));
    }

    #[test]
    fn test_flag_with_inline_value_is_rejected() {
        let err = CommandArgs::parse(&argv(&["--all=yes"]), &options(), ParseStyle::Posix).unwrap_err();
        assert!(matches!(err, PluginError::InvalidInput(_)));
    }

    #[test]
    fn test_slash_is_positional_in_posix_style() {
        let parsed = CommandArgs::parse(&argv(&["/a", "/tmp/x.so"]), &options(), ParseStyle::Posix).unwrap();
        assert!(parsed.flags.is_empty());
        assert_eq!(parsed.args, vec!["/a", "/tmp/x.so"]);
    }

    #[test]
    fn test_windows_style_prefixes() {
        let parsed = CommandArgs::parse(
            &argv(&["/all", "/v", "/name:dave", "/tmp/x.so"]),
            &options(),
            ParseStyle::WithWindows,
        )
        .unwrap();
        assert!(parsed.has_flag("all"));
        assert!(parsed.has_flag("verbose"));
        assert_eq!(parsed.flag_value("name"), Some("dave"));
        assert_eq!(parsed.args, vec!["/tmp/x.so"]);
    }

    #[test]
    fn test_command_accessors_and_invoke() {
        let command = Command::new("greet", "Say hello", |args| {
            Ok(CommandResult::message(format!("hello {}", args.join(" "))))
        })
        .with_long_description("Greets whoever is named on the command line")
        .with_option(CommandOption::flag("loud", Some('l')));

        assert_eq!(command.name(), "greet");
        assert_eq!(command.short_description(), "Say hello");
        assert!(command.long_description().is_some());
        assert_eq!(command.options().len(), 1);

        let result = command.invoke(&argv(&["world"])).unwrap();
        assert_eq!(result.message_text(), Some("hello world"));

        let parsed = command.parse_args(&argv(&["-l"])).unwrap();
        assert!(parsed.has_flag("loud"));
    }
}
