//! Topic addresses

use std::fmt;
use std::str::FromStr;

use hermod_plugin_api::PluginError;
use thiserror::Error;

/// Errors from the topic bus
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Malformed topic: {topic:?}")]
    MalformedTopic { topic: String },
}

impl From<BusError> for PluginError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::MalformedTopic { topic } => PluginError::MalformedTopic(topic),
        }
    }
}

/// A validated `/`-delimited topic such as `/hermod/domains/added`
///
/// Valid topics start with `/`, do not end with `/`, and every segment is a
/// non-empty run of letters, digits, `-` or `_`. Letters may be any Unicode
/// alphabetic character; digits are ASCII only. Wildcards are not part of the grammar: topics are
/// matched by exact string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(String);

impl Topic {
    pub fn parse(topic: &str) -> Result<Self, BusError> {
        if Self::is_valid(topic) {
            Ok(Self(topic.to_string()))
        } else {
            Err(BusError::MalformedTopic {
                topic: topic.to_string(),
            })
        }
    }

    pub fn is_valid(topic: &str) -> bool {
        let Some(rest) = topic.strip_prefix('/') else {
            return false;
        };
        rest.split('/').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_alphabetic() || c.is_ascii_digit() || c == '-' || c == '_')
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0[1..].split('/')
    }
}

impl FromStr for Topic {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
