use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::Engine;

/// Global configuration loaded from ~/.grampus/config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrampusConfig {
    /// Engine used by `parse` when --engine is not given
    pub default_engine: String,

    /// Disable colored terminal output
    pub no_color: bool,

    /// Recursion depth limit for the descent engine.
    /// Unset means the built-in default.
    pub depth_limit: Option<usize>,
}

impl Default for GrampusConfig {
    fn default() -> Self {
        Self {
            default_engine: "descent".to_string(),
            no_color: false,
            depth_limit: None,
        }
    }
}

impl GrampusConfig {
    pub fn engine(&self) -> Engine {
        match self.default_engine.parse() {
            Ok(engine) => engine,
            Err(e) => {
                log::warn!("{e}; falling back to descent");
                Engine::Descent
            }
        }
    }
}

/// Load config from ~/.grampus/config.toml, falling back to defaults.
pub fn load_config() -> GrampusConfig {
    let config_path = config_path();
    if !config_path.exists() {
        return GrampusConfig::default();
    }
    match std::fs::read_to_string(&config_path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                log::info!("Loaded config from {}", config_path.display());
                config
            }
            Err(e) => {
                log::warn!(
                    "Failed to parse {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                GrampusConfig::default()
            }
        },
        Err(e) => {
            log::warn!(
                "Failed to read {}: {}. Using defaults.",
                config_path.display(),
                e
            );
            GrampusConfig::default()
        }
    }
}

/// Returns the path to ~/.grampus/config.toml
pub fn config_path() -> PathBuf {
    grampus_dir().join("config.toml")
}

/// Returns the path to ~/.grampus/
pub fn grampus_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".grampus")
}

/// Expand ~ to $HOME in a path
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if path_str.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(format!("{}{}", home, &path_str[1..]));
        }
    }
    path.to_path_buf()
}
