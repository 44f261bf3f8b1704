//! Tracing subscriber setup
//!
//! Console output goes to stderr so command output on stdout stays clean.
//! The console level comes from `--log-lvl`, then `RUST_LOG`, then
//! `Logging.ConsoleLogging.LogLevel`. A plain-text file layer is added when
//! `Logging.FileLogging.EnableLogging` is on.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use hermod_core::{ConfigProvider, ConfigProviderExt};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_CONSOLE_LEVEL: &str = "warn";
const DEFAULT_FILE_LEVEL: &str = "info";

/// Map a level word to an `EnvFilter` directive
///
/// Accepts the tracing names plus `information`, `warning`, `fatal` and
/// `critical`, case-insensitively.
pub fn level_directive(word: &str) -> Option<&'static str> {
    match word.trim().to_ascii_lowercase().as_str() {
        "trace" | "verbose" => Some("trace"),
        "debug" => Some("debug"),
        "info" | "information" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "fatal" | "critical" => Some("error"),
        "off" | "none" => Some("off"),
        _ => None,
    }
}

/// Pick the console filter directive
fn console_directive(
    flag: Option<&str>,
    rust_log: Option<String>,
    configured: Option<String>,
) -> Result<String> {
    if let Some(word) = flag {
        return match level_directive(word) {
            Some(level) => Ok(level.to_string()),
            None => bail!("Unknown log level: {word}"),
        };
    }

    if let Some(directives) = rust_log.filter(|s| !s.trim().is_empty()) {
        return Ok(directives);
    }

    let level = configured
        .as_deref()
        .and_then(level_directive)
        .unwrap_or(DEFAULT_CONSOLE_LEVEL);
    Ok(level.to_string())
}

/// Install the global subscriber
pub fn init(flag: Option<&str>, settings: &dyn ConfigProvider) -> Result<()> {
    let console_enabled = settings
        .get_as::<bool>("Logging.ConsoleLogging.EnableLogging")
        .unwrap_or(true);
    let directive = console_directive(
        flag,
        std::env::var("RUST_LOG").ok(),
        settings.get_as("Logging.ConsoleLogging.LogLevel").ok(),
    )?;
    let console_filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter: {directive}"))?;

    let console = console_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
    });

    let file_enabled = settings
        .get_as::<bool>("Logging.FileLogging.EnableLogging")
        .unwrap_or(false);
    let file = if file_enabled {
        let dir = hermod_paths::log_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let path = dir.join("hermod.log");
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        let level = settings
            .get_as::<String>("Logging.FileLogging.LogLevel")
            .ok()
            .as_deref()
            .and_then(level_directive)
            .unwrap_or(DEFAULT_FILE_LEVEL);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false)
                .with_filter(EnvFilter::new(level)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}
