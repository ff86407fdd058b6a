//! Tray configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use systray_icon_cache::IconCache;

/// Settings applied when the tray starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrayConfig {
    /// Where icon bytes are persisted. Defaults to the OS temporary directory.
    pub icon_cache_dir: Option<PathBuf>,

    /// Tooltip applied once the root menu exists.
    pub tooltip: Option<String>,

    /// Name of the thread the startup callback runs on.
    pub ready_thread_name: String,
}

fn default_ready_thread_name() -> String {
    "systray-ready".into()
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            icon_cache_dir: None,
            tooltip: None,
            ready_thread_name: default_ready_thread_name(),
        }
    }
}

impl TrayConfig {
    pub(crate) fn icon_cache(&self) -> IconCache {
        match &self.icon_cache_dir {
            Some(dir) => IconCache::new(dir),
            None => IconCache::in_temp_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TrayConfig::default();
        assert_eq!(config.icon_cache_dir, None);
        assert_eq!(config.tooltip, None);
        assert_eq!(config.ready_thread_name, "systray-ready");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = TrayConfig {
            icon_cache_dir: Some(PathBuf::from("/var/cache/icons")),
            tooltip: Some("Example".into()),
            ready_thread_name: "host-ready".into(),
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: TrayConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn config_partial_toml() {
        let config: TrayConfig = toml::from_str(r#"tooltip = "Hi""#).unwrap();
        assert_eq!(config.tooltip.as_deref(), Some("Hi"));
        assert_eq!(config.ready_thread_name, "systray-ready");
    }

    #[test]
    fn icon_cache_follows_configured_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = TrayConfig {
            icon_cache_dir: Some(tmp.path().to_path_buf()),
            ..TrayConfig::default()
        };
        assert_eq!(config.icon_cache().dir(), tmp.path());
    }
}
