//! Demo configuration management.
//!
//! Stored as TOML in `systray-demo/demo.toml` under the user's
//! configuration directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use systray::TrayConfig;

/// Demo configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tooltip shown over the tray icon.
    #[serde(default = "default_tooltip")]
    pub tooltip: String,

    /// Optional `.ico` file to show instead of the built-in icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_tooltip() -> String {
    "This here is an example".into()
}

fn default_log_filter() -> String {
    "info".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tooltip: default_tooltip(),
            icon_path: None,
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Loads the configuration at the platform path, writing the defaults
    /// there on first run.
    #[cfg_attr(not(windows), allow(dead_code))]
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path())
    }

    /// Reads `path`, or writes and returns the defaults if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("invalid demo config at {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
            Err(e) => Err(e).with_context(|| format!("unable to read {}", path.display())),
        }
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("unable to write {}", path.display()))?;

        tracing::debug!(path = %path.display(), "demo configuration saved");
        Ok(())
    }

    /// Settings handed to the tray at startup.
    pub fn tray_config(&self) -> TrayConfig {
        TrayConfig {
            tooltip: Some(self.tooltip.clone()),
            ..TrayConfig::default()
        }
    }
}

/// `%APPDATA%` on Windows, the XDG config directory elsewhere.
fn config_path() -> PathBuf {
    let base = std::env::var_os("APPDATA")
        .or_else(|| std::env::var_os("XDG_CONFIG_HOME"))
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("systray-demo").join("demo.toml")
}
