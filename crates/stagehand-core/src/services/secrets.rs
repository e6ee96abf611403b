//! Connection strings derived from the datastore config.

use super::SecretsProvider;
use crate::config::DatastoreConfig;
use crate::types::Component;

/// Overrides the generated datastore URL when set.
pub const DATABASE_URL_ENV: &str = "STAGEHAND_DATABASE_URL";

#[derive(Debug, Clone)]
pub struct ConfigSecretsProvider {
    datastore: DatastoreConfig,
    override_url: Option<String>,
}

impl ConfigSecretsProvider {
    /// Provider that honours `STAGEHAND_DATABASE_URL`.
    pub fn from_env(datastore: DatastoreConfig) -> Self {
        Self::from_lookup(datastore, |key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable lookup.
    pub fn from_lookup(datastore: DatastoreConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let override_url = lookup(DATABASE_URL_ENV).filter(|v| !v.trim().is_empty());
        Self {
            datastore,
            override_url,
        }
    }

    pub fn new(datastore: DatastoreConfig) -> Self {
        Self {
            datastore,
            override_url: None,
        }
    }

    pub fn with_override(mut self, url: impl Into<String>) -> Self {
        self.override_url = Some(url.into());
        self
    }
}

impl SecretsProvider for ConfigSecretsProvider {
    fn connection_string(&self, component: Component) -> anyhow::Result<String> {
        if !component.needs_datastore() {
            anyhow::bail!("{} does not use the datastore", component);
        }
        if let Some(url) = &self.override_url {
            return Ok(url.clone());
        }
        let ds = &self.datastore;
        Ok(format!(
            "postgresql://{}@{}:{}/{}",
            ds.user, ds.host, ds.port, ds.database
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_url_from_config() {
        let provider = ConfigSecretsProvider::new(DatastoreConfig::default());
        assert_eq!(
            provider.connection_string(Component::Workspace).unwrap(),
            "postgresql://stagehand@127.0.0.1:5432/stagehand"
        );
    }

    #[test]
    fn override_wins() {
        let provider =
            ConfigSecretsProvider::new(DatastoreConfig::default()).with_override("postgresql://x");
        assert_eq!(
            provider.connection_string(Component::All).unwrap(),
            "postgresql://x"
        );
    }

    #[test]
    fn override_comes_from_stagehand_database_url() {
        let lookup = |key: &str| (key == "STAGEHAND_DATABASE_URL").then(|| "postgresql://env".to_string());
        let provider = ConfigSecretsProvider::from_lookup(DatastoreConfig::default(), lookup);
        assert_eq!(
            provider.connection_string(Component::Workspace).unwrap(),
            "postgresql://env"
        );

        let blank = ConfigSecretsProvider::from_lookup(DatastoreConfig::default(), |_| Some(" ".to_string()));
        assert!(
            blank
                .connection_string(Component::Workspace)
                .unwrap()
                .starts_with("postgresql://stagehand@")
        );
    }

    #[test]
    fn datastore_free_component_is_rejected() {
        let provider = ConfigSecretsProvider::new(DatastoreConfig::default());
        assert!(provider.connection_string(Component::AuxiliaryB).is_err());
    }
}
