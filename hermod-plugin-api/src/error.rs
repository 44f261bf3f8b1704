//! Error types for plugin authors

use thiserror::Error;

/// Errors that plugins can return, and that the host reports back to plugins
#[derive(Error, Debug)]
pub enum PluginError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Command execution failed
    #[error("Command failed: {0}")]
    Command(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A command line named an option the command does not declare
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    /// An option that requires a value was given none
    #[error("Option {0} requires an argument")]
    MissingArgument(String),

    /// Topic string failed validation
    #[error("Malformed topic: {0:?}")]
    MalformedTopic(String),

    /// The host that created this delegator has shut down
    #[error("Host is no longer available")]
    HostUnavailable,
}

impl PluginError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a command error
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command(message.into())
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let config_err = PluginError::Config("missing key".to_string());
        assert_eq!(config_err.to_string(), "Configuration error: missing key");

        let cmd_err = PluginError::Command("exit code 1".to_string());
        assert_eq!(cmd_err.to_string(), "Command failed: exit code 1");

        let custom_err = PluginError::Custom("something happened".to_string());
        assert_eq!(custom_err.to_string(), "something happened");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let plugin_err: PluginError = io_err.into();

        assert!(matches!(plugin_err, PluginError::Io(_)));
        assert!(plugin_err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let plugin_err: PluginError = json_err.into();
        assert!(matches!(plugin_err, PluginError::Serialization(_)));
    }

    #[test]
    fn test_helper_constructors() {
        let err = PluginError::custom("test");
        assert!(matches!(err, PluginError::Custom(_)));

        let err = PluginError::config("bad config");
        assert!(matches!(err, PluginError::Config(_)));

        let err = PluginError::command("failed");
        assert!(matches!(err, PluginError::Command(_)));
    }

    #[test]
    fn test_malformed_topic_quotes_the_topic() {
        let err = PluginError::MalformedTopic("a//b".into());
        assert_eq!(err.to_string(), "Malformed topic: \"a//b\"");
    }

    #[test]
    fn test_option_errors() {
        assert_eq!(
            PluginError::UnknownOption("--bogus".into()).to_string(),
            "Unknown option: --bogus"
        );
        assert_eq!(
            PluginError::MissingArgument("--name".into()).to_string(),
            "Option --name requires an argument"
        );
    }
}
