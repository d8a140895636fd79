//! Initialize the configuration directory: create ~/.murmur and write the default config.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Create the config directory and default config file if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with every default spelled out, so it can be edited in place.
///
/// Returns the config directory.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("murmur-init-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn writes_loadable_default_config() {
        let dir = temp_dir();
        let path = dir.join("nested").join("config.json");
        let created = init_config_dir(&path).unwrap();
        assert_eq!(created, dir.join("nested"));
        let (config, _) = load_config(Some(path)).unwrap();
        assert_eq!(config.relay.pacing_ms, 1000);
        assert_eq!(config.backend.parameters.stop.len(), 3);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn keeps_existing_config() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, br#"{"relay":{"pacingMs":5}}"#).unwrap();
        init_config_dir(&path).unwrap();
        let (config, _) = load_config(Some(path)).unwrap();
        assert_eq!(config.relay.pacing_ms, 5);
        let _ = std::fs::remove_dir_all(dir);
    }
}
