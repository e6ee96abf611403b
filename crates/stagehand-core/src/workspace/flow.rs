//! Interactive and unattended workspace selection.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{WorkspaceAction, WorkspaceChoice, WorkspaceManager, WorkspaceOutcome, default_name};
use crate::error::WorkspaceError;
use crate::prompt::{self, MenuOption, Prompter};
use crate::services::ServiceManager;

const MENU: [MenuOption; 3] = [
    MenuOption {
        label: "Create a new workspace",
        help: "Initialise workspace.toml, .env, .stagehand/ and data/ in a new or empty directory",
    },
    MenuOption {
        label: "Use an existing workspace",
        help: "Point at a directory that already holds a workspace; partial ones can be converted",
    },
    MenuOption {
        label: "Skip workspace setup",
        help: "Finish now and run `stagehand workspace init` later",
    },
];

/// States of the interactive flow.
#[derive(Debug, Clone)]
enum FlowState {
    PresentingOptions,
    NewWorkspace { path: PathBuf, name: String },
    PromptingPath,
    Validating { path: PathBuf },
    OfferingConversion { path: PathBuf },
    Converting { path: PathBuf },
    Starting { choice: WorkspaceChoice, created: bool, converted: bool },
}

impl WorkspaceManager<'_> {
    /// Ask which workspace action to take and collect its input.
    pub fn prompt_choice(&self, prompter: &mut dyn Prompter) -> Result<WorkspaceChoice, WorkspaceError> {
        let index = prompt::select(prompter, "How do you want to set up your workspace?", &MENU)?;
        match index {
            0 => {
                let input = self.prompt_new_workspace(prompter)?;
                let (path, name) = self.resolve_target(&input)?;
                Ok(WorkspaceChoice {
                    action: WorkspaceAction::CreateNew,
                    path: Some(path),
                    name: Some(name),
                })
            }
            1 => Ok(WorkspaceChoice {
                action: WorkspaceAction::UseExisting,
                path: Some(self.prompt_path(prompter)?),
                name: None,
            }),
            _ => Ok(WorkspaceChoice::skip()),
        }
    }

    /// Drive the full selection flow until a workspace is ready or skipped.
    ///
    /// Retryable errors are shown with suggestions and the menu is offered
    /// again, at most `max_attempts` times.
    pub fn run_flow(
        &self,
        prompter: &mut dyn Prompter,
        services: &dyn ServiceManager,
    ) -> Result<WorkspaceOutcome, WorkspaceError> {
        let mut attempts = 0;
        let mut state = FlowState::PresentingOptions;

        loop {
            debug!(?state, "workspace flow");
            let next = match state {
                FlowState::PresentingOptions => {
                    let choice = self.prompt_choice(prompter)?;
                    match (choice.action, choice.path) {
                        (WorkspaceAction::Skip, _) | (_, None) => {
                            prompter.say("Skipping workspace setup.")?;
                            return Ok(WorkspaceOutcome::skipped());
                        }
                        (WorkspaceAction::CreateNew, Some(path)) => {
                            let name = choice.name.unwrap_or_else(|| default_name(&path));
                            FlowState::NewWorkspace { path, name }
                        }
                        (WorkspaceAction::UseExisting, Some(path)) => {
                            FlowState::Validating { path }
                        }
                    }
                }
                FlowState::NewWorkspace { path, name } => {
                    match self.initialize_at(&path, &name) {
                        Ok(result) => {
                            prompter.say(&format!(
                                "Created workspace '{}' at {}",
                                result.name,
                                result.path.display()
                            ))?;
                            FlowState::Starting {
                                choice: WorkspaceChoice {
                                    action: WorkspaceAction::CreateNew,
                                    path: Some(result.path),
                                    name: Some(result.name),
                                },
                                created: true,
                                converted: false,
                            }
                        }
                        Err(err) => self.retry_after(prompter, err, &mut attempts)?,
                    }
                }
                FlowState::PromptingPath => FlowState::Validating {
                    path: self.prompt_path(prompter)?,
                },
                FlowState::Validating { path } => match self.validate(&path) {
                    Ok(result) if result.is_valid => {
                        prompter.say(&format!("Using workspace at {}", path.display()))?;
                        FlowState::Starting {
                            choice: existing_choice(path),
                            created: false,
                            converted: false,
                        }
                    }
                    Ok(result) => {
                        prompter.say(&format!(
                            "{} is not a complete workspace ({:.0}% of markers present).",
                            path.display(),
                            result.confidence * 100.0
                        ))?;
                        for suggestion in &result.suggestions {
                            prompter.say(&format!("  - {suggestion}"))?;
                        }
                        if result.auto_fixable {
                            FlowState::OfferingConversion { path }
                        } else {
                            prompter.say("It cannot be converted automatically.")?;
                            FlowState::PromptingPath
                        }
                    }
                    Err(err) => self.retry_after(prompter, err, &mut attempts)?,
                },
                FlowState::OfferingConversion { path } => {
                    let question = format!("Convert {} into a workspace?", path.display());
                    if prompt::confirm(prompter, &question, false)? {
                        FlowState::Converting { path }
                    } else {
                        FlowState::PromptingPath
                    }
                }
                FlowState::Converting { path } => match self.convert_existing(&path, true) {
                    Ok(result) => {
                        prompter.say(&format!(
                            "Converted {} ({} added, {} regenerated)",
                            path.display(),
                            result.added.len(),
                            result.regenerated.len()
                        ))?;
                        FlowState::Starting {
                            choice: existing_choice(path),
                            created: false,
                            converted: true,
                        }
                    }
                    Err(err) => self.retry_after(prompter, err, &mut attempts)?,
                },
                FlowState::Starting {
                    choice,
                    created,
                    converted,
                } => {
                    let outcome = self.start_workspace(choice, created, converted, services)?;
                    if let Some(deps) = &outcome.dependencies
                        && !deps.is_satisfied()
                    {
                        prompter.say("Missing dependencies:")?;
                        for dep in &deps.missing_services {
                            prompter.say(&format!("  - {} ({})", dep.name, dep.install_hint))?;
                        }
                    }
                    return Ok(outcome);
                }
            };
            state = next;
        }
    }

    /// Non-interactive policy: use a valid workspace, convert a partial one
    /// (only with `consent`), otherwise initialise a new one.
    pub fn run_unattended(
        &self,
        path: Option<&Path>,
        consent: bool,
        services: &dyn ServiceManager,
    ) -> Result<WorkspaceOutcome, WorkspaceError> {
        let target = path.map_or_else(|| self.base_dir.clone(), Path::to_path_buf);

        if !target.exists() {
            let result = self.initialize_at(&target, &default_name(&target))?;
            return self.start_workspace(created_choice(result.path, result.name), true, false, services);
        }

        let validation = self.validate(&target)?;
        if validation.is_valid {
            return self.start_workspace(existing_choice(target), false, false, services);
        }
        if validation.has_markers() {
            self.convert_existing(&target, consent)?;
            return self.start_workspace(existing_choice(target), false, true, services);
        }

        let result = self.initialize_at(&target, &default_name(&target))?;
        self.start_workspace(created_choice(result.path, result.name), true, false, services)
    }

    fn start_workspace(
        &self,
        choice: WorkspaceChoice,
        created: bool,
        converted: bool,
        services: &dyn ServiceManager,
    ) -> Result<WorkspaceOutcome, WorkspaceError> {
        let dependencies = match &choice.path {
            Some(path) => {
                let report = self.detect_missing_dependencies(path, services)?;
                self.register_active(path)?;
                info!(path = %path.display(), created, converted, "workspace ready");
                Some(report)
            }
            None => None,
        };
        Ok(WorkspaceOutcome {
            choice,
            created,
            converted,
            dependencies,
        })
    }

    fn retry_after(
        &self,
        prompter: &mut dyn Prompter,
        err: WorkspaceError,
        attempts: &mut u32,
    ) -> Result<FlowState, WorkspaceError> {
        if !err.is_retryable() {
            return Err(err);
        }
        *attempts += 1;
        prompter.say(&format!("Error: {err}"))?;
        for suggestion in err.suggestions() {
            prompter.say(&format!("  hint: {suggestion}"))?;
        }
        if *attempts >= self.max_attempts {
            return Err(WorkspaceError::TooManyAttempts(*attempts));
        }
        Ok(FlowState::PresentingOptions)
    }

    fn prompt_new_workspace(&self, prompter: &mut dyn Prompter) -> Result<String, WorkspaceError> {
        loop {
            let input = prompter.ask(&format!(
                "Workspace name or path (empty for {})",
                self.base_dir.display()
            ))?;
            match self.resolve_target(&input) {
                Ok(_) => return Ok(input.trim().to_string()),
                Err(err) => prompter.say(&format!("{err}"))?,
            }
        }
    }

    fn prompt_path(&self, prompter: &mut dyn Prompter) -> Result<PathBuf, WorkspaceError> {
        loop {
            let input = prompter.ask("Path to the existing workspace")?;
            match prompt::parse_path_input(&input) {
                Ok(path) if path.is_absolute() => return Ok(path),
                Ok(path) => return Ok(self.base_dir.join(path)),
                Err(reason) => prompter.say(&format!("Invalid path: {reason}"))?,
            }
        }
    }
}

fn existing_choice(path: PathBuf) -> WorkspaceChoice {
    WorkspaceChoice {
        action: WorkspaceAction::UseExisting,
        path: Some(path),
        name: None,
    }
}

fn created_choice(path: PathBuf, name: String) -> WorkspaceChoice {
    WorkspaceChoice {
        action: WorkspaceAction::CreateNew,
        path: Some(path),
        name: Some(name),
    }
}
