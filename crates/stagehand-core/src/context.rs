//! Application context shared by every frontend command.

use std::path::{Path, PathBuf};

use crate::config::{ConfigStore, StagehandConfig};
use crate::state::StateStore;

/// Paths a run works with. Frontends build this once and pass it to commands.
#[derive(Debug, Clone)]
pub struct AppContext {
    state_dir: PathBuf,
    config_dir: PathBuf,
    base_dir: PathBuf,
}

impl AppContext {
    /// Create a context with explicit paths (tests, `--state-dir` overrides).
    pub fn new(state_dir: PathBuf, config_dir: PathBuf, base_dir: PathBuf) -> Self {
        Self {
            state_dir,
            config_dir,
            base_dir,
        }
    }

    /// Platform state and config directories; `base_dir` is usually the cwd.
    pub fn with_default_dirs(base_dir: PathBuf) -> anyhow::Result<Self> {
        Ok(Self::new(
            StateStore::default_state_dir()?,
            ConfigStore::default_config_dir()?,
            base_dir,
        ))
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Directory new workspaces are created in.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn state_store(&self) -> StateStore {
        StateStore::new(self.state_dir.clone())
    }

    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::from_dir(self.config_dir.clone())
    }

    /// Install root for component artefacts.
    pub fn data_dir(&self, config: &StagehandConfig) -> PathBuf {
        config
            .data_dir
            .clone()
            .unwrap_or_else(|| self.state_dir.join("data"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_dir_defaults_under_state_dir() {
        let ctx = AppContext::new("/s".into(), "/c".into(), "/b".into());
        let mut config = StagehandConfig::default();
        assert_eq!(ctx.data_dir(&config), PathBuf::from("/s/data"));

        config.data_dir = Some(PathBuf::from("/opt/stagehand"));
        assert_eq!(ctx.data_dir(&config), PathBuf::from("/opt/stagehand"));
        assert_eq!(
            ctx.config_store().config_path(),
            Path::new("/c/stagehand.toml")
        );
    }
}
