//! Configuration schema for stagehand.toml
//!
//! Every field has a default, so an absent or partial file is a valid
//! configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::types::Component;

/// Root configuration structure for stagehand.toml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagehandConfig {
    /// Root directory for installed component artefacts.
    /// Defaults to `<state_dir>/data`.
    pub data_dir: Option<PathBuf>,

    pub datastore: DatastoreConfig,

    /// Per-service settings keyed by component name (`workspace`, `auxiliary-a`, ...)
    pub services: BTreeMap<String, ServiceConfig>,

    pub health: HealthConfig,

    pub workflow: WorkflowConfig,

    pub workspace: WorkspaceConfig,
}

impl Default for StagehandConfig {
    fn default() -> Self {
        let services = Component::All
            .members()
            .iter()
            .map(|c| (c.as_str().to_string(), ServiceConfig::default_for(*c)))
            .collect();
        Self {
            data_dir: None,
            datastore: DatastoreConfig::default(),
            services,
            health: HealthConfig::default(),
            workflow: WorkflowConfig::default(),
            workspace: WorkspaceConfig::default(),
        }
    }
}

impl StagehandConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for a concrete service, falling back to built-in defaults.
    pub fn service(&self, component: Component) -> ServiceConfig {
        self.services
            .get(component.as_str())
            .cloned()
            .unwrap_or_else(|| ServiceConfig::default_for(component))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for name in self.services.keys() {
            let component: Component = name
                .parse()
                .map_err(|_| anyhow::anyhow!("Unknown service '{}' in [services]", name))?;
            if component == Component::All {
                bail!("[services.all] is not allowed; configure each service separately");
            }
        }
        for (name, service) in &self.services {
            if service.port == 0 {
                bail!("services.{}.port must be non-zero", name);
            }
            if !service.health_path.starts_with('/') {
                bail!("services.{}.health_path must start with '/'", name);
            }
            let endpoint = format!(
                "http://{}:{}{}",
                service.host, service.port, service.health_path
            );
            url::Url::parse(&endpoint).map_err(|e| {
                anyhow::anyhow!("services.{}: invalid endpoint {}: {}", name, endpoint, e)
            })?;
        }
        if self.datastore.port == 0 {
            bail!("datastore.port must be non-zero");
        }
        if self.health.retries > 20 {
            bail!("health.retries must be at most 20");
        }
        if !(0.0..=1.0).contains(&self.health.pool_saturation_warn) {
            bail!("health.pool_saturation_warn must be between 0.0 and 1.0");
        }
        for (label, threshold) in [
            ("cpu", &self.health.cpu),
            ("memory", &self.health.memory),
            ("disk", &self.health.disk),
        ] {
            if threshold.warn > threshold.critical || threshold.critical > 100.0 {
                bail!(
                    "health.{}: warn ({}) must not exceed critical ({}), and critical must be <= 100",
                    label,
                    threshold.warn,
                    threshold.critical
                );
            }
        }
        if self.workspace.max_attempts == 0 {
            bail!("workspace.max_attempts must be at least 1");
        }
        Ok(())
    }
}

/// Datastore connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub pool_size: u32,
    /// Shell command that brings the datastore up; run before a dependent service starts.
    pub start: Option<String>,
    pub stop: Option<String>,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            database: "stagehand".to_string(),
            user: "stagehand".to_string(),
            pool_size: 10,
            start: None,
            stop: None,
        }
    }
}

/// Service endpoint and lifecycle commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub health_path: String,
    pub start: Option<String>,
    pub stop: Option<String>,
    /// Exit status 0 means running. Without it, a TCP connect to host:port decides.
    pub status: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::default_for(Component::Workspace)
    }
}

impl ServiceConfig {
    pub fn default_for(component: Component) -> Self {
        let port = match component {
            Component::All | Component::Workspace => 8881,
            Component::AuxiliaryA => 8886,
            Component::AuxiliaryB => 8887,
        };
        Self {
            host: "127.0.0.1".to_string(),
            port,
            health_path: "/health".to_string(),
            start: None,
            stop: None,
            status: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    #[default]
    Exponential,
}

impl Backoff {
    /// Delay before retry number `attempt` (1-based), capped at `max`.
    pub fn delay(self, base: Duration, attempt: u32, max: Duration) -> Duration {
        let delay = match self {
            Backoff::Fixed => base,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor)
            }
        };
        delay.min(max)
    }
}

/// Warn/critical percentages for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub warn: f64,
    pub critical: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub backoff: Backoff,
    pub max_delay_ms: u64,
    pub connect_timeout_ms: u64,
    /// Responses slower than this mark a facet degraded.
    pub slow_threshold_ms: u64,
    pub pool_saturation_warn: f64,
    pub cpu: Threshold,
    pub memory: Threshold,
    pub disk: Threshold,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 3,
            retry_delay_ms: 1000,
            backoff: Backoff::Exponential,
            max_delay_ms: 8000,
            connect_timeout_ms: 5000,
            slow_threshold_ms: 1000,
            pool_saturation_warn: 0.8,
            cpu: Threshold {
                warn: 80.0,
                critical: 95.0,
            },
            memory: Threshold {
                warn: 85.0,
                critical: 95.0,
            },
            disk: Threshold {
                warn: 85.0,
                critical: 95.0,
            },
        }
    }
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub readiness_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            readiness_timeout_secs: 60,
            poll_interval_ms: 500,
        }
    }
}

impl WorkflowConfig {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Last workspace selected by a successful run.
    pub active_path: Option<PathBuf>,
    /// Interactive re-prompts before workspace setup gives up.
    pub max_attempts: u32,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            active_path: None,
            max_attempts: 5,
        }
    }
}
