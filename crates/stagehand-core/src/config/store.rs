//! Config store for loading and saving stagehand.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{StagehandConfig, parser};
use crate::fs::write_atomic;

pub const CONFIG_FILE_NAME: &str = "stagehand.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store rooted at the platform config directory (`~/.config/stagehand`).
    pub fn from_default_dirs() -> anyhow::Result<Self> {
        Ok(Self::from_dir(Self::default_config_dir()?))
    }

    pub fn default_config_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("stagehand"))
    }

    pub fn from_dir(config_dir: PathBuf) -> Self {
        Self {
            config_path: config_dir.join(CONFIG_FILE_NAME),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the config; a missing file yields the defaults.
    pub fn load(&self) -> anyhow::Result<StagehandConfig> {
        if !self.config_path.exists() {
            return Ok(StagehandConfig::new());
        }
        parser::parse_config(&self.config_path)
    }

    pub fn save(&self, config: &StagehandConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config)?;
        write_atomic(&self.config_path, content.as_bytes()).with_context(|| {
            format!(
                "Failed to write config file: {}",
                self.config_path.display()
            )
        })
    }

    /// Remember `path` as the active workspace.
    pub fn set_active_workspace(&self, path: &Path) -> anyhow::Result<()> {
        let mut config = self.load()?;
        if config.workspace.active_path.as_deref() == Some(path) {
            return Ok(());
        }
        config.workspace.active_path = Some(path.to_path_buf());
        self.save(&config)
    }
}
