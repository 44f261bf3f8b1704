//! Outcome of executing a command

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::PluginError;

/// What a command produced: a success (optional message, optional
/// structured payload) or an error (message plus optional cause).
#[derive(Debug, Clone)]
pub enum CommandResult {
    Success {
        message: Option<String>,
        payload: Option<serde_json::Value>,
    },
    Error {
        message: String,
        cause: Option<Arc<dyn StdError + Send + Sync>>,
    },
}

impl CommandResult {
    /// Success with nothing to report
    pub fn empty() -> Self {
        Self::Success {
            message: None,
            payload: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::Success {
            message: Some(message.into()),
            payload: None,
        }
    }

    pub fn with_payload(message: Option<String>, payload: serde_json::Value) -> Self {
        Self::Success {
            message,
            payload: Some(payload),
        }
    }

    /// Success carrying `value` serialized as JSON
    pub fn json<T: Serialize>(message: Option<String>, value: &T) -> Result<Self, PluginError> {
        Ok(Self::with_payload(message, serde_json::to_value(value)?))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            cause: None,
        }
    }

    pub fn error_with_cause<E>(message: impl Into<String>, cause: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Error {
            message: message.into(),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn not_implemented(command: &str) -> Self {
        Self::error(format!("The command {command} is not implemented"))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The message, if any. Always present for errors.
    pub fn message_text(&self) -> Option<&str> {
        match self {
            Self::Success { message, .. } => message.as_deref(),
            Self::Error { message, .. } => Some(message),
        }
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Success { payload, .. } => payload.as_ref(),
            Self::Error { .. } => None,
        }
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync)> {
        match self {
            Self::Error { cause, .. } => cause.as_deref(),
            Self::Success { .. } => None,
        }
    }
}

impl From<PluginError> for CommandResult {
    fn from(err: PluginError) -> Self {
        Self::error_with_cause(err.to_string(), err)
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { message, .. } => write!(f, "{}", message.as_deref().unwrap_or("")),
            Self::Error { message, cause: Some(cause) } => write!(f, "{message}: {cause}"),
            Self::Error { message, cause: None } => write!(f, "{message}"),
        }
    }
}
