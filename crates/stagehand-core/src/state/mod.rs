//! Resumable workflow state and its on-disk store.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{InputValidationError, ResumptionError};
use crate::fs::{remove_path_if_exists, write_atomic};
use crate::types::{Component, WorkflowStep};
use crate::workflow::WorkflowOptions;

pub const STATE_FILE_NAME: &str = "install-state.json";

/// Progress of one installation, persisted after every transition.
///
/// A step is never in both `completed_steps` and `failed_steps`; the mutators
/// below are the only way to move steps between the sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub component: Component,
    pub current_step: WorkflowStep,
    completed_steps: Vec<WorkflowStep>,
    failed_steps: Vec<WorkflowStep>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub options: WorkflowOptions,
    #[serde(default)]
    pub rollback_data: BTreeMap<String, serde_json::Value>,
}

impl WorkflowState {
    pub fn new(component: Component, options: WorkflowOptions) -> Self {
        let now = Utc::now();
        Self {
            component,
            current_step: WorkflowStep::ValidatingInput,
            completed_steps: Vec::new(),
            failed_steps: Vec::new(),
            started_at: now,
            updated_at: now,
            options,
            rollback_data: BTreeMap::new(),
        }
    }

    pub fn completed_steps(&self) -> &[WorkflowStep] {
        &self.completed_steps
    }

    pub fn failed_steps(&self) -> &[WorkflowStep] {
        &self.failed_steps
    }

    pub fn is_completed(&self, step: WorkflowStep) -> bool {
        self.completed_steps.contains(&step)
    }

    /// Enter `step`; a previous failure of it is cleared for the retry.
    pub fn begin(&mut self, step: WorkflowStep) {
        self.current_step = step;
        self.failed_steps.retain(|s| *s != step);
        self.touch();
    }

    pub fn complete(&mut self, step: WorkflowStep) {
        self.failed_steps.retain(|s| *s != step);
        if !self.completed_steps.contains(&step) {
            self.completed_steps.push(step);
        }
        self.touch();
    }

    pub fn fail(&mut self, step: WorkflowStep) {
        self.completed_steps.retain(|s| *s != step);
        if !self.failed_steps.contains(&step) {
            self.failed_steps.push(step);
        }
        self.touch();
    }

    /// Forget completion of steps whose effects were rolled back.
    pub fn revert(&mut self, steps: &[WorkflowStep]) {
        self.completed_steps.retain(|s| !steps.contains(s));
        for step in steps {
            self.rollback_data.remove(step.as_str());
        }
        self.touch();
    }

    pub fn record_rollback_data(&mut self, step: WorkflowStep, value: serde_json::Value) {
        self.rollback_data.insert(step.as_str().to_string(), value);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// `~/.local/state/stagehand` on Linux, the local data dir elsewhere.
    pub fn default_state_dir() -> anyhow::Result<PathBuf> {
        Ok(dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .ok_or_else(|| anyhow::anyhow!("Could not determine state directory"))?
            .join("stagehand"))
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    /// Load persisted state. `Ok(None)` when there is nothing to resume.
    pub fn load(&self) -> Result<Option<WorkflowState>, ResumptionError> {
        let path = self.path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(ResumptionError::Io {
                    path,
                    reason: err.to_string(),
                });
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| ResumptionError::Corrupted {
                path,
                reason: err.to_string(),
            })
    }

    pub fn save(&self, state: &WorkflowState) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        write_atomic(&self.path(), json.as_bytes())?;
        debug!(step = %state.current_step, path = %self.path().display(), "saved workflow state");
        Ok(())
    }

    /// Remove persisted state; returns whether a file was removed.
    pub fn clear(&self) -> anyhow::Result<bool> {
        remove_path_if_exists(&self.path())
    }

    /// Fail early when state could not be persisted later on.
    pub fn check_writable(&self) -> Result<(), InputValidationError> {
        let unwritable = |reason: String| InputValidationError::StateDirUnwritable {
            path: self.state_dir.clone(),
            reason,
        };
        fs::create_dir_all(&self.state_dir).map_err(|e| unwritable(e.to_string()))?;
        let probe = self
            .state_dir
            .join(format!(".write-test.{}", std::process::id()));
        fs::write(&probe, b"").map_err(|e| unwritable(e.to_string()))?;
        if let Err(err) = fs::remove_file(&probe) {
            debug!(path = %probe.display(), error = %err, "failed to remove write test file");
        }
        Ok(())
    }
}
