//! Optional on-disk configuration.
//!
//! A small TOML file under the platform config directory; every key has a
//! built-in default and CLI flags override everything here.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Model alias requested from the backend.
    pub default_model: Option<String>,
    /// Base URL of the OpenAI-compatible local server.
    pub base_url: Option<String>,
    /// Directory for transcript files saved without an explicit path.
    pub transcript_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        match Self::config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn load_from_path(config_path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "permacommons", "locutor")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
