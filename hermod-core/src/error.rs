//! Error types for hermod-core

use thiserror::Error;

use crate::bus::BusError;
use crate::config::ConfigError;
use crate::plugins::{LoaderError, RegistryError};

/// Top-level error type for hermod-core
#[derive(Error, Debug)]
pub enum HermodError {
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_wraps_component_errors() {
        let err: HermodError = LoaderError::NotAPlugin {
            path: PathBuf::from("/p/x.so"),
        }
        .into();
        assert_eq!(err.to_string(), "Loader error: /p/x.so does not contain any plugins");

        let err: HermodError = BusError::MalformedTopic {
            topic: "x".into(),
        }
        .into();
        assert!(matches!(err, HermodError::Bus(_)));
    }

    #[test]
    fn test_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + 'static>() {}
        assert_send_sync::<HermodError>();
    }
}
