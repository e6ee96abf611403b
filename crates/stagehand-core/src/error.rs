//! Error taxonomy for the install pipeline.
//!
//! Each family maps to one propagation policy: input errors surface before any
//! side effect, installation errors trigger rollback, health errors are fatal
//! only after recovery, workspace errors are re-prompted, resumption errors
//! are reported with the path to the state file.

use std::path::PathBuf;

use thiserror::Error;

use crate::health::HealthReport;
use crate::transaction::TransactionReport;
use crate::types::{HealthStatus, WorkflowStep};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputValidationError {
    #[error("unknown component '{0}' (expected one of: all, workspace, auxiliary-a, auxiliary-b)")]
    UnknownComponent(String),

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("workspace path is a file, not a directory: {}", .0.display())]
    PathIsFile(PathBuf),

    #[error("state directory {} is not writable: {reason}", .path.display())]
    StateDirUnwritable { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Error)]
#[error("{step} failed during '{operation}': {cause}")]
pub struct InstallationError {
    pub step: WorkflowStep,
    pub operation: String,
    pub cause: String,
    pub rollback: TransactionReport,
}

#[derive(Debug, Clone, Error)]
#[error(
    "health check for {} is {} after retries and recovery",
    .report.component,
    .report.overall
)]
pub struct HealthCheckError {
    pub report: HealthReport,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("prompt interrupted")]
    Interrupted,

    #[error("input closed")]
    Closed,

    #[error("prompt failed: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("path is a file, not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("{} already contains a workspace", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("converting {} into a workspace requires explicit consent", .0.display())]
    ConsentRequired(PathBuf),

    #[error("invalid workspace name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("workspace operation failed at {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("workspace setup interrupted")]
    Interrupted,

    #[error("input closed before a workspace choice was made")]
    InputClosed,

    #[error("gave up after {0} workspace attempts")]
    TooManyAttempts(u32),

    #[error("could not query services: {0}")]
    Service(String),
}

impl WorkspaceError {
    /// Errors the interactive flow can recover from by asking again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkspaceError::DirectoryNotFound(_)
                | WorkspaceError::NotADirectory(_)
                | WorkspaceError::AlreadyInitialized(_)
                | WorkspaceError::InvalidName { .. }
                | WorkspaceError::Io { .. }
        )
    }

    pub fn suggestions(&self) -> Vec<String> {
        match self {
            WorkspaceError::DirectoryNotFound(path) => vec![format!(
                "Create {} first, or choose 'create new' to initialise it",
                path.display()
            )],
            WorkspaceError::NotADirectory(path) => vec![format!(
                "{} is a regular file; pick a directory instead",
                path.display()
            )],
            WorkspaceError::AlreadyInitialized(path) => vec![format!(
                "Choose 'use existing' with {} instead of creating a new workspace",
                path.display()
            )],
            WorkspaceError::ConsentRequired(path) => vec![format!(
                "Re-run with --yes to allow converting {}",
                path.display()
            )],
            WorkspaceError::InvalidName { .. } => vec![
                "Use letters, digits, '-', '_' or '.'; avoid <>:\"/\\|?* characters".to_string(),
            ],
            WorkspaceError::Io { path, .. } => vec![format!(
                "Check permissions and free space for {}",
                path.display()
            )],
            WorkspaceError::Interrupted | WorkspaceError::InputClosed => {
                vec!["Run `stagehand resume` to continue with workspace setup".to_string()]
            }
            WorkspaceError::TooManyAttempts(_) => vec![
                "Run `stagehand workspace init <name>` directly, then `stagehand resume`"
                    .to_string(),
            ],
            WorkspaceError::Service(_) => {
                vec!["Check the service manager with `stagehand health`".to_string()]
            }
        }
    }
}

impl From<PromptError> for WorkspaceError {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::Interrupted => WorkspaceError::Interrupted,
            PromptError::Closed => WorkspaceError::InputClosed,
            PromptError::Io(message) => WorkspaceError::Io {
                path: PathBuf::from("<terminal>"),
                message,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResumptionError {
    #[error("no interrupted installation found")]
    NoInterruptedInstallation,

    #[error("state file {} is corrupted: {reason}", .path.display())]
    Corrupted { path: PathBuf, reason: String },

    #[error("failed to access state file {}: {reason}", .path.display())]
    Io { path: PathBuf, reason: String },
}

/// Any error a workflow run can end with.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    InputValidation(#[from] InputValidationError),

    #[error(transparent)]
    Installation(#[from] InstallationError),

    #[error(transparent)]
    HealthCheck(#[from] HealthCheckError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Resumption(#[from] ResumptionError),

    #[error("failed to persist workflow state: {0}")]
    StatePersistence(String),
}

impl WorkflowError {
    /// Actionable follow-ups; never empty.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            WorkflowError::InputValidation(err) => match err {
                InputValidationError::UnknownComponent(_) => vec![
                    "Use one of: all, workspace, auxiliary-a, auxiliary-b".to_string(),
                ],
                InputValidationError::InvalidValue { field, .. } => {
                    vec![format!("Correct the {field} argument and retry")]
                }
                InputValidationError::PathIsFile(path) => vec![format!(
                    "Pass a directory to --workspace instead of {}",
                    path.display()
                )],
                InputValidationError::StateDirUnwritable { path, .. } => vec![format!(
                    "Make {} writable or set XDG_STATE_HOME to a writable location",
                    path.display()
                )],
            },
            WorkflowError::Installation(err) => {
                let mut hints = vec![format!(
                    "Fix the cause of '{}' and re-run `stagehand resume`",
                    err.operation
                )];
                if !err.rollback.rollback_errors.is_empty() {
                    hints.push(
                        "Some rollback actions failed; inspect the paths listed above before retrying"
                            .to_string(),
                    );
                }
                hints
            }
            WorkflowError::HealthCheck(err) => {
                let mut hints = err.report.recommendations.clone();
                if hints.is_empty() {
                    hints.push("Run `stagehand health` for a detailed report".to_string());
                }
                hints
            }
            WorkflowError::Workspace(err) => err.suggestions(),
            WorkflowError::Resumption(err) => match err {
                ResumptionError::NoInterruptedInstallation => {
                    vec!["Start a new installation with `stagehand install`".to_string()]
                }
                ResumptionError::Corrupted { .. } => vec![
                    "Run `stagehand reset` to discard the corrupted state, then install again"
                        .to_string(),
                ],
                ResumptionError::Io { path, .. } => {
                    vec![format!("Check permissions on {}", path.display())]
                }
            },
            WorkflowError::StatePersistence(_) => vec![
                "Make sure the state directory is writable and has free space".to_string(),
            ],
        }
    }

    /// Overall status carried by a health failure.
    pub fn health_status(&self) -> Option<HealthStatus> {
        match self {
            WorkflowError::HealthCheck(err) => Some(err.report.overall),
            _ => None,
        }
    }
}
