//! Shared core types used across the pipeline, health and workspace layers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InputValidationError;

/// Named unit of the system being installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Component {
    /// Full deployment: every service plus an interactive workspace setup.
    All,
    /// The primary workspace service and its workspace directory.
    Workspace,
    /// First auxiliary service container.
    AuxiliaryA,
    /// Second auxiliary service container.
    AuxiliaryB,
}

impl Component {
    pub const VARIANTS: [Component; 4] = [
        Component::All,
        Component::Workspace,
        Component::AuxiliaryA,
        Component::AuxiliaryB,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Component::All => "all",
            Component::Workspace => "workspace",
            Component::AuxiliaryA => "auxiliary-a",
            Component::AuxiliaryB => "auxiliary-b",
        }
    }

    /// Concrete services this component brings up, in start order.
    pub fn members(self) -> &'static [Component] {
        match self {
            Component::All => &[
                Component::Workspace,
                Component::AuxiliaryA,
                Component::AuxiliaryB,
            ],
            Component::Workspace => &[Component::Workspace],
            Component::AuxiliaryA => &[Component::AuxiliaryA],
            Component::AuxiliaryB => &[Component::AuxiliaryB],
        }
    }

    /// Whether the component talks to the datastore.
    pub fn needs_datastore(self) -> bool {
        match self {
            Component::All | Component::Workspace | Component::AuxiliaryA => true,
            Component::AuxiliaryB => false,
        }
    }

    /// Whether the pipeline ends with a workspace setup step.
    pub fn requires_workspace_setup(self) -> bool {
        match self {
            Component::All | Component::Workspace => true,
            Component::AuxiliaryA | Component::AuxiliaryB => false,
        }
    }

    /// Whether workspace setup may prompt a human. Narrow components stay
    /// automation-friendly and never prompt.
    pub fn is_interactive(self) -> bool {
        match self {
            Component::All => true,
            Component::Workspace | Component::AuxiliaryA | Component::AuxiliaryB => false,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = InputValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Component::VARIANTS
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| InputValidationError::UnknownComponent(s.to_string()))
    }
}

/// Persisted pipeline steps.
///
/// Serialized with their variant names (`"StartingServices"`), which is also
/// what resume instructions and the state file show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStep {
    ValidatingInput,
    InstallingComponents,
    StartingServices,
    PerformingHealthCheck,
    WorkspaceSelection,
}

impl WorkflowStep {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStep::ValidatingInput => "ValidatingInput",
            WorkflowStep::InstallingComponents => "InstallingComponents",
            WorkflowStep::StartingServices => "StartingServices",
            WorkflowStep::PerformingHealthCheck => "PerformingHealthCheck",
            WorkflowStep::WorkspaceSelection => "WorkspaceSelection",
        }
    }

    /// Steps whose side effects run inside the run's installation transaction.
    pub fn is_transactional(self) -> bool {
        matches!(
            self,
            WorkflowStep::InstallingComponents | WorkflowStep::StartingServices
        )
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of a facet or of a whole component, ordered from best to worst.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    /// Worst status of the set; an empty set is healthy.
    pub fn worst(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
        statuses.into_iter().max().unwrap_or_default()
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
