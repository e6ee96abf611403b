use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::bail;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Collaborators, Interrupt, WorkflowOptions, WorkflowResult};
use crate::config::{ConfigStore, ServiceConfig, StagehandConfig};
use crate::context::AppContext;
use crate::error::{
    HealthCheckError, InputValidationError, InstallationError, ResumptionError, WorkflowError,
    WorkspaceError,
};
use crate::fs::{read_if_exists, remove_path_if_exists, write_atomic};
use crate::health::{HealthChecker, HealthReport, RecoveryHooks};
use crate::prompt::{Prompter, parse_path_input};
use crate::services::{SecretsProvider, ServiceStatus, Template};
use crate::state::{StateStore, WorkflowState};
use crate::transaction::{InstallationTransaction, Operation};
use crate::types::{Component, HealthStatus, WorkflowStep};
use crate::workspace::{WorkspaceManager, WorkspaceOutcome};

/// Pipeline phases as logged; only the step phases are ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Step(WorkflowStep),
    Completed,
    Error,
    CleaningUp,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Step(step) => step.fmt(f),
            Phase::Completed => f.write_str("Completed"),
            Phase::Error => f.write_str("Error"),
            Phase::CleaningUp => f.write_str("CleaningUp"),
        }
    }
}

enum StepOutcome {
    Done,
    Interrupted,
    Failed(WorkflowError),
}

/// Rollback data of `InstallingComponents`: enough to undo the step from a
/// later invocation.
#[derive(Debug, Default, Serialize, Deserialize)]
struct InstallRecord {
    members: Vec<InstalledMember>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InstalledMember {
    component: Component,
    dir: PathBuf,
    created_dir: bool,
    config: PathBuf,
    /// Content of `config` before rendering; `None` when it did not exist.
    previous_config: Option<Vec<u8>>,
}

/// What one invocation (fresh or resumed) produced along the way.
#[derive(Default)]
struct RunLog {
    transactional: Vec<WorkflowStep>,
    health: Option<HealthReport>,
    workspace: Option<WorkspaceOutcome>,
}

/// Drives a component through the pipeline, persisting state after every
/// transition so an interrupted run can be resumed.
pub struct WorkflowOrchestrator<'a> {
    config: StagehandConfig,
    state_store: StateStore,
    config_store: ConfigStore,
    base_dir: PathBuf,
    data_dir: PathBuf,
    collab: Collaborators<'a>,
    prompter: RefCell<Box<dyn Prompter + 'a>>,
    interrupt: Interrupt,
}

impl<'a> WorkflowOrchestrator<'a> {
    pub fn new(
        context: &AppContext,
        config: StagehandConfig,
        collaborators: Collaborators<'a>,
        prompter: Box<dyn Prompter + 'a>,
    ) -> Self {
        Self {
            data_dir: context.data_dir(&config),
            state_store: context.state_store(),
            config_store: context.config_store(),
            base_dir: context.base_dir().to_path_buf(),
            config,
            collab: collaborators,
            prompter: RefCell::new(prompter),
            interrupt: Interrupt::new(),
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state_store
    }

    pub fn run(&self, component: Component, options: WorkflowOptions) -> WorkflowResult {
        info!(%component, ?options, "starting installation");
        let mut state = WorkflowState::new(component, options);
        self.execute(&mut state, Instant::now())
    }

    /// Continue a persisted run, skipping the steps it already completed.
    pub fn resume(&self) -> Result<WorkflowResult, ResumptionError> {
        let mut state = self
            .state_store
            .load()?
            .ok_or(ResumptionError::NoInterruptedInstallation)?;
        info!(
            component = %state.component,
            step = %state.current_step,
            completed = ?state.completed_steps(),
            "resuming installation"
        );
        Ok(self.execute(&mut state, Instant::now()))
    }

    /// Persisted state of an unfinished run, if any.
    pub fn pending_state(&self) -> Result<Option<WorkflowState>, ResumptionError> {
        self.state_store.load()
    }

    /// Drop persisted state; returns whether there was any.
    pub fn discard(&self) -> Result<bool, ResumptionError> {
        self.state_store
            .clear()
            .map_err(|err| ResumptionError::Io {
                path: self.state_store.path(),
                reason: format!("{err:#}"),
            })
    }

    /// Standalone health check with recovery enabled.
    pub fn check_health(&self, component: Component, timeout: Duration, retries: u32) -> HealthReport {
        self.health_checker().check(component, timeout, retries)
    }

    fn health_checker(&self) -> HealthChecker<'_> {
        HealthChecker::new(self.collab.probe, self.config.clone(), self.data_dir.clone())
            .with_recovery(self)
            .with_interrupt(self.interrupt.clone())
    }

    /// Steps a component goes through under `options`, in order.
    fn plan(component: Component, options: &WorkflowOptions) -> Vec<WorkflowStep> {
        let mut steps = vec![
            WorkflowStep::ValidatingInput,
            WorkflowStep::InstallingComponents,
            WorkflowStep::StartingServices,
        ];
        if !options.skip_health {
            steps.push(WorkflowStep::PerformingHealthCheck);
        }
        if component.requires_workspace_setup() && !options.skip_workspace {
            steps.push(WorkflowStep::WorkspaceSelection);
        }
        steps
    }

    fn execute(&self, state: &mut WorkflowState, started: Instant) -> WorkflowResult {
        let component = state.component;
        let interrupt = self.interrupt.clone();
        let mut tx = InstallationTransaction::new(format!("install {component}"))
            .with_cancellation(move || interrupt.is_triggered());
        let mut log = RunLog::default();
        let mut previous = Phase::Step(state.current_step);
        self.adopt_completed(state, &mut tx, &mut log);

        let plan = Self::plan(component, &state.options);
        for step in plan {
            if state.is_completed(step) {
                debug!(%step, "already completed, skipping");
                continue;
            }
            if self.interrupt.is_triggered() {
                return self.interrupted(state, log, started);
            }

            transition(previous, Phase::Step(step));
            previous = Phase::Step(step);
            state.begin(step);
            // Nothing is persisted until input and the state dir are known good.
            if step != WorkflowStep::ValidatingInput
                && let Err(err) = self.persist(state)
            {
                return self.fail(state, step, err, &mut tx, log, started);
            }

            let outcome = match step {
                WorkflowStep::ValidatingInput => self.validate_input(state),
                WorkflowStep::InstallingComponents => self.install_components(state, &mut tx),
                WorkflowStep::StartingServices => self.start_services(component, &mut tx),
                WorkflowStep::PerformingHealthCheck => self.perform_health_check(component, &mut log),
                WorkflowStep::WorkspaceSelection => {
                    self.select_workspace(component, &state.options, &mut log)
                }
            };

            match outcome {
                StepOutcome::Done => {
                    state.complete(step);
                    if step.is_transactional() {
                        log.transactional.push(step);
                    }
                    if let Err(err) = self.persist(state) {
                        return self.fail(state, step, err, &mut tx, log, started);
                    }
                    info!(%step, "step completed");
                }
                StepOutcome::Interrupted => return self.interrupted(state, log, started),
                StepOutcome::Failed(err) => {
                    return self.fail(state, step, err, &mut tx, log, started);
                }
            }
        }

        transition(previous, Phase::Completed);
        tx.commit();
        if let Err(err) = self.state_store.clear() {
            warn!(error = %format!("{err:#}"), "failed to remove state file after success");
        }

        let workspace_created = log
            .workspace
            .as_ref()
            .is_some_and(|w| w.created || w.converted);
        info!(%component, elapsed = ?started.elapsed(), "installation completed");
        WorkflowResult {
            success: true,
            steps_completed: state.completed_steps().to_vec(),
            errors: Vec::new(),
            workspace_created,
            elapsed: started.elapsed(),
            interrupted: false,
            health: log.health,
            workspace: log.workspace,
        }
    }

    /// Register the inverses of transactional steps an earlier invocation
    /// completed, so a failure in this one undoes them as well.
    fn adopt_completed(
        &self,
        state: &WorkflowState,
        tx: &mut InstallationTransaction<'_>,
        log: &mut RunLog,
    ) {
        let step = WorkflowStep::InstallingComponents;
        if !state.is_completed(step) {
            return;
        }
        let Some(data) = state.rollback_data.get(step.as_str()) else {
            warn!(%step, "no rollback data for completed step; it cannot be undone");
            return;
        };
        let record = match serde_json::from_value::<InstallRecord>(data.clone()) {
            Ok(record) => record,
            Err(err) => {
                warn!(%step, error = %err, "unreadable rollback data; step cannot be undone");
                return;
            }
        };
        for member in record.members {
            tx.adopt(
                format!("create {} install directory", member.component),
                undo_create_dir(member.dir, !member.created_dir),
            );
            tx.adopt(
                format!("render {} service config", member.component),
                undo_render(member.config, member.previous_config),
            );
        }
        log.transactional.push(step);
    }

    fn persist(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        self.state_store
            .save(state)
            .map_err(|err| WorkflowError::StatePersistence(format!("{err:#}")))
    }

    fn interrupted(&self, state: &WorkflowState, log: RunLog, started: Instant) -> WorkflowResult {
        warn!(step = %state.current_step, "installation interrupted");
        let mut errors = Vec::new();
        if let Err(err) = self.persist(state) {
            errors.push(err);
        }
        WorkflowResult {
            success: false,
            steps_completed: state.completed_steps().to_vec(),
            errors,
            workspace_created: false,
            elapsed: started.elapsed(),
            interrupted: true,
            health: log.health,
            workspace: None,
        }
    }

    fn fail(
        &self,
        state: &mut WorkflowState,
        step: WorkflowStep,
        err: WorkflowError,
        tx: &mut InstallationTransaction<'_>,
        log: RunLog,
        started: Instant,
    ) -> WorkflowResult {
        transition(Phase::Step(step), Phase::Error);
        warn!(%step, error = %err, "step failed");

        let rolled_back = if tx.is_poisoned() {
            true
        } else if step.is_transactional() && tx.committed_len() > 0 {
            tx.rollback();
            true
        } else {
            false
        };
        if rolled_back {
            transition(Phase::Error, Phase::CleaningUp);
            state.revert(&log.transactional);
        }

        state.fail(step);
        let mut errors = vec![err];
        // Rejected input leaves no trace on disk.
        if step != WorkflowStep::ValidatingInput
            && let Err(persist_err) = self.persist(state)
        {
            errors.push(persist_err);
        }

        WorkflowResult {
            success: false,
            steps_completed: state.completed_steps().to_vec(),
            errors,
            workspace_created: false,
            elapsed: started.elapsed(),
            interrupted: false,
            health: log.health,
            workspace: log.workspace,
        }
    }

    fn validate_input(&self, state: &WorkflowState) -> StepOutcome {
        match self.check_input(&state.options) {
            Ok(()) => StepOutcome::Done,
            Err(err) => StepOutcome::Failed(err.into()),
        }
    }

    fn check_input(&self, options: &WorkflowOptions) -> Result<(), InputValidationError> {
        if let Some(path) = &options.workspace_path {
            let text = path.to_str().ok_or_else(|| InputValidationError::InvalidValue {
                field: "workspace path",
                reason: "path is not valid UTF-8".to_string(),
            })?;
            parse_path_input(text).map_err(|reason| InputValidationError::InvalidValue {
                field: "workspace path",
                reason,
            })?;
            if path.exists() && !path.is_dir() {
                return Err(InputValidationError::PathIsFile(path.clone()));
            }
        }
        self.state_store.check_writable()
    }

    fn install_components<'s>(
        &'s self,
        state: &mut WorkflowState,
        tx: &mut InstallationTransaction<'s>,
    ) -> StepOutcome {
        let step = WorkflowStep::InstallingComponents;
        let mut record = InstallRecord::default();

        for member in state.component.members() {
            let member = *member;
            let dir = self.data_dir.join(member.as_str());

            let existed = dir.exists();
            let op = Operation::new(
                format!("create {member} install directory"),
                {
                    let dir = dir.clone();
                    move || {
                        std::fs::create_dir_all(&dir)?;
                        Ok(())
                    }
                },
                undo_create_dir(dir.clone(), existed),
            );
            if let Some(outcome) = self.run_operation(step, tx, op) {
                return outcome;
            }

            let target = dir.join(Template::ServiceConfig.file_name());
            let previous = match read_if_exists(&target) {
                Ok(previous) => previous,
                Err(err) => {
                    tx.rollback();
                    return StepOutcome::Failed(installation_error(step, "read service config", err, tx));
                }
            };
            let op = Operation::new(
                format!("render {member} service config"),
                {
                    let dir = dir.clone();
                    move || self.render_service_config(member, &dir)
                },
                undo_render(target.clone(), previous.clone()),
            );
            if let Some(outcome) = self.run_operation(step, tx, op) {
                return outcome;
            }
            record.members.push(InstalledMember {
                component: member,
                dir,
                created_dir: !existed,
                config: target,
                previous_config: previous,
            });
        }

        match serde_json::to_value(&record) {
            Ok(value) => state.record_rollback_data(step, value),
            Err(err) => warn!(%step, error = %err, "failed to encode rollback data"),
        }
        StepOutcome::Done
    }

    fn start_services<'s>(
        &'s self,
        component: Component,
        tx: &mut InstallationTransaction<'s>,
    ) -> StepOutcome {
        let step = WorkflowStep::StartingServices;
        let services = self.collab.services;

        let start = Operation::new(
            format!("start {component}"),
            move || {
                if !services.start(component)? {
                    bail!("service manager refused to start {component}");
                }
                Ok(())
            },
            move || {
                if !services.stop(component)? {
                    bail!("service manager refused to stop {component}");
                }
                Ok(())
            },
        );
        if let Some(outcome) = self.run_operation(step, tx, start) {
            return outcome;
        }

        let wait = Operation::irreversible(format!("wait for {component} readiness"), move || {
            self.wait_until_running(component)
        });
        self.run_operation(step, tx, wait)
            .unwrap_or(StepOutcome::Done)
    }

    /// Execute `op`; `Some` ends the step (failure or interrupt).
    fn run_operation<'s>(
        &self,
        step: WorkflowStep,
        tx: &mut InstallationTransaction<'s>,
        op: Operation<'s>,
    ) -> Option<StepOutcome> {
        let name = op.name().to_string();
        if !tx.execute_operation(op) {
            if tx.is_interrupted() {
                debug!(operation = %name, "operation failed after interrupt");
                return Some(StepOutcome::Interrupted);
            }
            let cause = tx
                .report()
                .failure
                .as_ref()
                .map(|f| f.message.clone())
                .unwrap_or_else(|| "transaction already rolled back".to_string());
            return Some(StepOutcome::Failed(
                InstallationError {
                    step,
                    operation: name,
                    cause,
                    rollback: tx.report().clone(),
                }
                .into(),
            ));
        }
        if self.interrupt.is_triggered() {
            debug!(operation = %name, "interrupted after operation");
            return Some(StepOutcome::Interrupted);
        }
        None
    }

    fn wait_until_running(&self, component: Component) -> anyhow::Result<()> {
        let timeout = self.config.workflow.readiness_timeout();
        let poll = self.config.workflow.poll_interval();
        let deadline = Instant::now() + timeout;

        loop {
            if self.collab.services.status(component)? == ServiceStatus::Running {
                debug!(%component, "service reports running");
                return Ok(());
            }
            // The orchestrator notices the flag right after this operation.
            if self.interrupt.is_triggered() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                bail!("{component} did not report running within {timeout:?}");
            }
            std::thread::sleep(poll.min(deadline - now));
        }
    }

    fn perform_health_check(&self, component: Component, log: &mut RunLog) -> StepOutcome {
        let report = self.health_checker().check_with_defaults(component);
        if self.interrupt.is_triggered() {
            log.health = Some(report);
            return StepOutcome::Interrupted;
        }

        let outcome = match report.overall {
            HealthStatus::Healthy => StepOutcome::Done,
            HealthStatus::Degraded => {
                warn!(%component, "services are degraded; continuing");
                StepOutcome::Done
            }
            HealthStatus::Unhealthy => StepOutcome::Failed(
                HealthCheckError {
                    report: report.clone(),
                }
                .into(),
            ),
        };
        log.health = Some(report);
        outcome
    }

    fn select_workspace(
        &self,
        component: Component,
        options: &WorkflowOptions,
        log: &mut RunLog,
    ) -> StepOutcome {
        let manager = WorkspaceManager::new(&self.base_dir, self.collab.secrets, self.collab.renderer)
            .with_max_attempts(self.config.workspace.max_attempts)
            .with_dependencies(component.members())
            .with_registry(&self.config_store);

        let interactive =
            component.is_interactive() && !options.auto_yes && options.workspace_path.is_none();
        let result = if interactive {
            let mut prompter = self.prompter.borrow_mut();
            manager.run_flow(&mut **prompter, self.collab.services)
        } else {
            manager.run_unattended(
                options.workspace_path.as_deref(),
                options.auto_yes,
                self.collab.services,
            )
        };

        match result {
            Ok(outcome) => {
                log.workspace = Some(outcome);
                StepOutcome::Done
            }
            Err(WorkspaceError::Interrupted) => StepOutcome::Interrupted,
            Err(err) => StepOutcome::Failed(err.into()),
        }
    }

    fn render_service_config(&self, member: Component, dir: &Path) -> anyhow::Result<()> {
        let vars = service_vars(member, &self.config.service(member), self.collab.secrets)?;
        self.collab
            .renderer
            .render(Template::ServiceConfig, dir, &vars)?;
        Ok(())
    }
}

impl RecoveryHooks for WorkflowOrchestrator<'_> {
    fn restart(&self, component: Component) -> anyhow::Result<bool> {
        if !self.collab.services.stop(component)? {
            debug!(%component, "stop before restart refused");
        }
        self.collab.services.start(component)
    }

    fn regenerate_config(&self, component: Component) -> anyhow::Result<()> {
        for member in component.members() {
            let dir = self.data_dir.join(member.as_str());
            std::fs::create_dir_all(&dir)?;
            self.render_service_config(*member, &dir)?;
        }
        Ok(())
    }

    fn is_running(&self, component: Component) -> bool {
        matches!(
            self.collab.services.status(component),
            Ok(ServiceStatus::Running)
        )
    }
}

fn undo_create_dir(dir: PathBuf, existed: bool) -> impl FnOnce() -> anyhow::Result<()> {
    move || {
        if !existed {
            remove_path_if_exists(&dir)?;
        }
        Ok(())
    }
}

fn undo_render(target: PathBuf, previous: Option<Vec<u8>>) -> impl FnOnce() -> anyhow::Result<()> {
    move || {
        match &previous {
            Some(bytes) => write_atomic(&target, bytes)?,
            None => {
                remove_path_if_exists(&target)?;
            }
        }
        Ok(())
    }
}

fn transition(from: Phase, to: Phase) {
    debug!(%from, %to, "workflow transition");
}

fn service_vars(
    member: Component,
    service: &ServiceConfig,
    secrets: &dyn SecretsProvider,
) -> anyhow::Result<BTreeMap<String, String>> {
    let database_url = if member.needs_datastore() {
        secrets.connection_string(member)?
    } else {
        String::new()
    };
    Ok(BTreeMap::from([
        ("component".to_string(), member.to_string()),
        ("host".to_string(), service.host.clone()),
        ("port".to_string(), service.port.to_string()),
        ("health_path".to_string(), service.health_path.clone()),
        ("database_url".to_string(), database_url),
    ]))
}

fn installation_error(
    step: WorkflowStep,
    operation: &str,
    err: anyhow::Error,
    tx: &InstallationTransaction<'_>,
) -> WorkflowError {
    InstallationError {
        step,
        operation: operation.to_string(),
        cause: format!("{err:#}"),
        rollback: tx.report().clone(),
    }
    .into()
}
