use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hermod_core::{Hermod, HermodConfig, JsonConfigStore};

mod input;
mod logging;
mod repl;
mod terminal;

#[derive(Parser, Debug)]
#[command(name = "hermod", about = "Plugin host with a topic bus and command shell")]
#[command(version)]
struct Cli {
    /// Configuration file [default: <config dir>/hermod/hermod.json]
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Console log level (trace, debug, info, warning, error, critical)
    #[arg(short = 'L', long = "log-lvl", value_name = "LEVEL")]
    log_lvl: Option<String>,

    /// Run the interactive command shell
    #[arg(short, long)]
    interactive: bool,

    /// Overwrite the configuration file with defaults before starting
    #[arg(long)]
    reset_cfg: bool,

    /// Load plugins from this directory instead of Plugins.InstallDir
    #[arg(long, value_name = "DIR")]
    plugin_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(hermod_paths::config_file);
    let settings = Arc::new(
        JsonConfigStore::open(&config_path)
            .with_context(|| format!("Failed to open configuration {}", config_path.display()))?,
    );
    if cli.reset_cfg {
        settings.reset().context("Failed to reset configuration")?;
    }

    logging::init(cli.log_lvl.as_deref(), settings.as_ref())?;

    let hermod = Hermod::new(
        HermodConfig {
            plugin_dir: cli.plugin_dir,
        },
        settings,
    );
    hermod
        .registry()
        .add_builtin_command(terminal::clear_command());

    let count = hermod.startup()?;
    tracing::info!(plugins = count, "Host started");

    if cli.interactive {
        repl::run(hermod.clone()).await?;
    } else {
        wait_for_exit(&hermod).await?;
    }

    hermod.shutdown();
    Ok(())
}

/// Block until Ctrl-C, or until a plugin runs `quit`
async fn wait_for_exit(hermod: &Hermod) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                if !hermod.keep_alive() {
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_all_flags() {
        let cli = Cli::try_parse_from([
            "hermod",
            "-c",
            "/tmp/h.json",
            "-L",
            "debug",
            "-i",
            "--reset-cfg",
            "--plugin-dir",
            "/tmp/plugins",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/h.json")));
        assert_eq!(cli.log_lvl.as_deref(), Some("debug"));
        assert!(cli.interactive);
        assert!(cli.reset_cfg);
        assert_eq!(cli.plugin_dir, Some(PathBuf::from("/tmp/plugins")));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["hermod"]).unwrap();
        assert!(cli.config.is_none());
        assert!(!cli.interactive);
        assert!(!cli.reset_cfg);
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
