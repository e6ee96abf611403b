//! Dependency detection for a workspace.
//!
//! Reports what the workspace declares but the machine lacks. It never
//! installs anything.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{WORKSPACE_FILE, WorkspaceManifest};
use crate::error::WorkspaceError;
use crate::services::{ServiceManager, ServiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Service,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingDependency {
    pub name: String,
    pub kind: DependencyKind,
    pub required: bool,
    pub install_hint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallCommand {
    pub description: String,
    pub estimated_seconds: u32,
    pub requires_confirmation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub missing_services: Vec<MissingDependency>,
    pub install_commands: Vec<InstallCommand>,
    pub auto_installable: bool,
}

impl DependencyReport {
    pub fn is_satisfied(&self) -> bool {
        self.missing_services.is_empty()
    }
}

pub(crate) fn read_manifest(workspace: &Path) -> Result<WorkspaceManifest, WorkspaceError> {
    let file = workspace.join(WORKSPACE_FILE);
    let content = std::fs::read_to_string(&file).map_err(|err| WorkspaceError::Io {
        path: file.clone(),
        message: err.to_string(),
    })?;
    toml::from_str(&content).map_err(|err| WorkspaceError::Io {
        path: file,
        message: err.message().to_string(),
    })
}

pub fn detect_missing_dependencies(
    workspace: &Path,
    services: &dyn ServiceManager,
) -> Result<DependencyReport, WorkspaceError> {
    let manifest = read_manifest(workspace)?;
    let mut report = DependencyReport::default();

    for component in &manifest.dependencies.components {
        let status = services
            .status(*component)
            .map_err(|err| WorkspaceError::Service(format!("{component}: {err:#}")))?;
        if status == ServiceStatus::Running {
            continue;
        }
        report.missing_services.push(MissingDependency {
            name: component.to_string(),
            kind: DependencyKind::Service,
            required: true,
            install_hint: format!("stagehand install {component}"),
        });
        report.install_commands.push(InstallCommand {
            description: format!("stagehand install {component}"),
            estimated_seconds: 60,
            requires_confirmation: false,
        });
    }

    for tool in &manifest.dependencies.tools {
        if find_on_path(tool).is_some() {
            continue;
        }
        report.missing_services.push(MissingDependency {
            name: tool.clone(),
            kind: DependencyKind::Tool,
            required: true,
            install_hint: format!("Install '{tool}' with your system package manager"),
        });
    }

    report.auto_installable = report
        .missing_services
        .iter()
        .all(|dep| dep.kind == DependencyKind::Service);
    Ok(report)
}

/// First executable named `tool` on `PATH`.
pub fn find_on_path(tool: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        let candidate = dir.join(tool);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{tool}.exe"));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn shell_is_on_path() {
        assert!(find_on_path("sh").is_some());
        assert!(find_on_path("definitely-not-a-real-tool-7f3a").is_none());
    }
}
