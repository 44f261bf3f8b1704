//! XDG Base Directory paths for hermod.
//!
//! Hermod keeps its configuration, plugins and logs under XDG locations on
//! every platform so installs look the same on Linux, macOS and Windows.

use std::path::PathBuf;

const APP_DIR: &str = "hermod";

/// Get the hermod config directory.
///
/// Returns `$XDG_CONFIG_HOME/hermod` if set, otherwise `~/.config/hermod`.
/// This is where `hermod.json` lives.
///
/// # Examples
///
/// ```
/// use hermod_paths::config_dir;
///
/// let config = config_dir();
/// let config_file = config.join("hermod.json");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config").join(APP_DIR)
    } else {
        PathBuf::from(".config").join(APP_DIR)
    }
}

/// Get the hermod data directory.
///
/// Returns `$XDG_DATA_HOME/hermod` if set, otherwise `~/.local/share/hermod`.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join(APP_DIR)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share").join(APP_DIR)
    } else {
        PathBuf::from(".local/share").join(APP_DIR)
    }
}

/// Default plugin install directory (`<data_dir>/plugins`).
///
/// Used when `Plugins.InstallDir` is unset in the configuration.
pub fn plugin_dir() -> PathBuf {
    data_dir().join("plugins")
}

/// Directory for log files (`<data_dir>/log`).
pub fn log_dir() -> PathBuf {
    data_dir().join("log")
}

/// Default location of the configuration file.
pub fn config_file() -> PathBuf {
    config_dir().join("hermod.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_dir_ends_with_hermod() {
        let path = config_dir();
        assert!(
            path.ends_with("hermod"),
            "config_dir should end with 'hermod'"
        );
    }

    #[test]
    #[serial]
    fn test_config_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/test-config");
        }
        let path = config_dir();
        assert_eq!(path, PathBuf::from("/tmp/test-config/hermod"));
        assert_eq!(
            config_file(),
            PathBuf::from("/tmp/test-config/hermod/hermod.json")
        );
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
        }
    }

    #[test]
    #[serial]
    fn test_plugin_and_log_dirs_live_under_data_dir() {
        unsafe {
            std::env::set_var("XDG_DATA_HOME", "/tmp/test-data");
        }
        assert_eq!(data_dir(), PathBuf::from("/tmp/test-data/hermod"));
        assert_eq!(plugin_dir(), PathBuf::from("/tmp/test-data/hermod/plugins"));
        assert_eq!(log_dir(), PathBuf::from("/tmp/test-data/hermod/log"));
        unsafe {
            std::env::remove_var("XDG_DATA_HOME");
        }
    }
}
