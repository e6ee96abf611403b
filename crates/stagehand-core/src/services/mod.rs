//! External collaborators consumed by the pipeline.
//!
//! The orchestrator only talks to these traits. The concrete types in the
//! submodules are thin: shell commands from the config for the
//! service manager, config/env backed connection strings, and `{{key}}`
//! substitution for generated files.

pub mod command;
pub mod render;
pub mod secrets;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::Component;

pub use command::CommandServiceManager;
pub use render::PlaceholderRenderer;
pub use secrets::{ConfigSecretsProvider, DATABASE_URL_ENV};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Running => f.write_str("running"),
            ServiceStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// Starts and stops the processes or containers behind a component.
///
/// `Ok(false)` means the manager ran but the service refused; `Err` means the
/// manager itself could not act.
pub trait ServiceManager {
    fn start(&self, component: Component) -> anyhow::Result<bool>;
    fn stop(&self, component: Component) -> anyhow::Result<bool>;
    fn status(&self, component: Component) -> anyhow::Result<ServiceStatus>;
}

/// Hands out connection strings for components that use the datastore.
pub trait SecretsProvider {
    fn connection_string(&self, component: Component) -> anyhow::Result<String>;
}

/// Files the pipeline generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    /// Per-service settings in the component install directory.
    ServiceConfig,
    /// `workspace.toml` marker of a workspace.
    WorkspaceConfig,
    /// `.env` with connection strings of a workspace.
    EnvFile,
}

impl Template {
    pub fn file_name(self) -> &'static str {
        match self {
            Template::ServiceConfig => "service.toml",
            Template::WorkspaceConfig => "workspace.toml",
            Template::EnvFile => ".env",
        }
    }

    pub fn body(self) -> &'static str {
        match self {
            Template::ServiceConfig => SERVICE_CONFIG_TEMPLATE,
            Template::WorkspaceConfig => WORKSPACE_CONFIG_TEMPLATE,
            Template::EnvFile => ENV_FILE_TEMPLATE,
        }
    }
}

const SERVICE_CONFIG_TEMPLATE: &str = r#"# Generated by stagehand; regenerated on recovery.
component = "{{component}}"
host = "{{host}}"
port = {{port}}
health_path = "{{health_path}}"
database_url = "{{database_url}}"
"#;

const WORKSPACE_CONFIG_TEMPLATE: &str = r#"[workspace]
name = "{{name}}"
created_at = "{{created_at}}"

[dependencies]
components = {{components}}
tools = {{tools}}
"#;

const ENV_FILE_TEMPLATE: &str = "DATABASE_URL={{database_url}}\nSTAGEHAND_WORKSPACE={{name}}\n";

/// Renders a template into `target_dir` and returns the written path.
pub trait TemplateRenderer {
    fn render(
        &self,
        template: Template,
        target_dir: &Path,
        vars: &BTreeMap<String, String>,
    ) -> anyhow::Result<PathBuf>;
}
