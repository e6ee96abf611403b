//! Stagehand Core Library
//!
//! Provides the domain logic for taking a machine from nothing installed to a
//! running, health-checked workspace: the install -> start -> health-check ->
//! workspace pipeline, its resumable state, and transactional rollback.

pub mod config;
pub mod context;
pub mod error;
pub mod fs;
pub mod health;
pub mod prompt;
pub mod services;
pub mod state;
pub mod transaction;
pub mod types;
pub mod workflow;
pub mod workspace;

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ConfigStore, StagehandConfig};
    pub use crate::context::AppContext;

    // Errors
    pub use crate::error::{
        HealthCheckError, InputValidationError, InstallationError, ResumptionError,
        WorkflowError, WorkspaceError,
    };

    // Collaborators
    pub use crate::services::{
        SecretsProvider, ServiceManager, ServiceStatus, Template, TemplateRenderer,
    };

    // Health
    pub use crate::health::{HealthChecker, HealthProbe, HealthReport};

    // Pipeline
    pub use crate::state::{StateStore, WorkflowState};
    pub use crate::transaction::{InstallationTransaction, Operation};
    pub use crate::types::{Component, HealthStatus, WorkflowStep};
    pub use crate::workflow::{
        Collaborators, Interrupt, WorkflowOptions, WorkflowOrchestrator, WorkflowResult,
    };

    // Workspace
    pub use crate::prompt::Prompter;
    pub use crate::workspace::{WorkspaceChoice, WorkspaceManager, WorkspaceOutcome};
}
