//! Standard paths used by the BloodHound CLI

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

/// Environment variable that relocates the config directory
pub const CONFIG_DIR_ENV: &str = "CONFIG_DIRECTORY";

/// Name of the JSON config file inside the config directory
pub const CONFIG_FILE_NAME: &str = "bloodhound.config.json";

/// Standard BloodHound CLI paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Config directory (~/.config/bloodhound)
    pub config: PathBuf,
}

impl Paths {
    /// Resolve the config directory, honoring `CONFIG_DIRECTORY`
    pub fn new() -> Result<Self> {
        let config = match std::env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => match default_config_dir() {
                Some(dir) => dir,
                None => bail!(
                    "Could not determine a config directory for this user; set {} to choose one",
                    CONFIG_DIR_ENV
                ),
            },
        };

        Ok(Self { config })
    }

    /// Use an explicit config directory
    pub fn with_config_dir(config: impl Into<PathBuf>) -> Self {
        Self {
            config: config.into(),
        }
    }

    /// Path of the JSON config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join(CONFIG_FILE_NAME)
    }

    /// Path of a service-definition file kept in the config directory
    pub fn service_file(&self, name: &str) -> PathBuf {
        self.config.join(name)
    }

    pub fn config_dir(&self) -> &Path {
        &self.config
    }
}

/// `<config dir>/bloodhound`, falling back to `$HOME/.config/bloodhound`
fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .map(|dir| dir.join("bloodhound"))
}
