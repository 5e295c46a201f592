//! Initialize the configuration directory: create ~/.nutribot, a default config, and a `.env` template.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{self, Config};

static ENV_TEMPLATE: &str = include_str!("../config/env.example");

/// Create the config directory and default files if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with every default spelled out if missing, so the persona can be edited in place.
/// - Writes `.env` from the bundled template if missing. Existing files are never overwritten.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config::config_dir(config_path);
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

    let env_path = config_dir.join(".env");
    if !env_path.exists() {
        std::fs::write(&env_path, ENV_TEMPLATE)
            .with_context(|| format!("writing .env template to {}", env_path.display()))?;
        log::info!("wrote .env template to {}", env_path.display());
    } else {
        log::debug!(".env already exists at {}, skipping", env_path.display());
    }

    Ok(config_dir.to_path_buf())
}
