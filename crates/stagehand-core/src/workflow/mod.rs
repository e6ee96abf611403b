//! The install -> start -> health-check -> workspace pipeline.

mod orchestrator;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::health::{HealthProbe, HealthReport};
use crate::services::{SecretsProvider, ServiceManager, TemplateRenderer};
use crate::types::WorkflowStep;
use crate::workspace::WorkspaceOutcome;

pub use orchestrator::WorkflowOrchestrator;

/// Shared cancellation flag, set from the Ctrl-C handler.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Flags a run was started with; persisted so resume re-applies them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowOptions {
    pub skip_health: bool,
    pub skip_workspace: bool,
    /// Accept defaults instead of prompting; also consents to conversion.
    pub auto_yes: bool,
    pub workspace_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub success: bool,
    pub steps_completed: Vec<WorkflowStep>,
    pub errors: Vec<WorkflowError>,
    pub workspace_created: bool,
    pub elapsed: Duration,
    pub interrupted: bool,
    pub health: Option<HealthReport>,
    pub workspace: Option<WorkspaceOutcome>,
}

impl WorkflowResult {
    pub fn exit_code(&self) -> u8 {
        if self.success {
            0
        } else if self.interrupted {
            130
        } else {
            1
        }
    }
}

/// External collaborators the orchestrator drives.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub services: &'a dyn ServiceManager,
    pub secrets: &'a dyn SecretsProvider,
    pub renderer: &'a dyn TemplateRenderer,
    pub probe: &'a dyn HealthProbe,
}
