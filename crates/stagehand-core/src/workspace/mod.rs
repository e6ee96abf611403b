//! Workspace selection, validation, creation and conversion.
//!
//! A workspace is a directory carrying four markers: `workspace.toml` with a
//! `[workspace] name`, a `.env` with `DATABASE_URL`, and the `.stagehand/`
//! and `data/` directories. Creation and conversion write through an
//! [`InstallationTransaction`] so a failure leaves the directory as it was.

pub mod deps;
pub mod flow;
pub mod validate;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ConfigStore;
use crate::error::WorkspaceError;
use crate::fs::remove_path_if_exists;
use crate::prompt::{parse_path_input, validate_name};
use crate::services::{SecretsProvider, ServiceManager, Template, TemplateRenderer};
use crate::transaction::{InstallationTransaction, Operation};
use crate::types::Component;

pub use deps::{DependencyKind, DependencyReport, InstallCommand, MissingDependency};
pub use validate::{InvalidConfig, ValidationResult};

pub const WORKSPACE_FILE: &str = "workspace.toml";
pub const ENV_FILE: &str = ".env";
pub const STATE_DIR: &str = ".stagehand";
pub const DATA_DIR: &str = "data";

const MARKERS: [&str; 4] = [WORKSPACE_FILE, ENV_FILE, STATE_DIR, DATA_DIR];

/// Contents of `workspace.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceManifest {
    pub workspace: WorkspaceSection,
    #[serde(default)]
    pub dependencies: DependencySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSection {
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencySection {
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceResult {
    pub path: PathBuf,
    pub name: String,
    pub created_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    pub path: PathBuf,
    pub added: Vec<PathBuf>,
    pub regenerated: Vec<PathBuf>,
    pub backups: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceAction {
    CreateNew,
    UseExisting,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceChoice {
    pub action: WorkspaceAction,
    pub path: Option<PathBuf>,
    pub name: Option<String>,
}

impl WorkspaceChoice {
    pub fn skip() -> Self {
        Self {
            action: WorkspaceAction::Skip,
            path: None,
            name: None,
        }
    }
}

/// Where workspace setup ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkspaceOutcome {
    pub choice: WorkspaceChoice,
    pub created: bool,
    pub converted: bool,
    pub dependencies: Option<DependencyReport>,
}

impl WorkspaceOutcome {
    pub fn skipped() -> Self {
        Self {
            choice: WorkspaceChoice::skip(),
            created: false,
            converted: false,
            dependencies: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.choice.path.as_deref()
    }
}

pub struct WorkspaceManager<'a> {
    base_dir: PathBuf,
    secrets: &'a dyn SecretsProvider,
    renderer: &'a dyn TemplateRenderer,
    max_attempts: u32,
    dependencies: Vec<Component>,
    registry: Option<&'a ConfigStore>,
}

impl<'a> WorkspaceManager<'a> {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        secrets: &'a dyn SecretsProvider,
        renderer: &'a dyn TemplateRenderer,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            secrets,
            renderer,
            max_attempts: 5,
            dependencies: vec![Component::Workspace],
            registry: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Components recorded under `[dependencies]` of new workspaces.
    pub fn with_dependencies(mut self, components: &[Component]) -> Self {
        self.dependencies = components.to_vec();
        self
    }

    /// Remember the selected workspace as active in this config store.
    pub fn with_registry(mut self, store: &'a ConfigStore) -> Self {
        self.registry = Some(store);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn validate(&self, path: &Path) -> Result<ValidationResult, WorkspaceError> {
        validate::validate_workspace(path)
    }

    pub fn detect_missing_dependencies(
        &self,
        path: &Path,
        services: &dyn ServiceManager,
    ) -> Result<DependencyReport, WorkspaceError> {
        deps::detect_missing_dependencies(path, services)
    }

    /// Turn user input into a target directory and a workspace name.
    ///
    /// Empty input means the base directory itself; a bare name is created
    /// under the base directory; anything path-like is taken as a path.
    pub fn resolve_target(&self, input: &str) -> Result<(PathBuf, String), WorkspaceError> {
        let input = input.trim();
        if input.is_empty() {
            let path = self.base_dir.clone();
            let name = default_name(&path);
            return Ok((path, name));
        }

        let path_like = input.contains(['/', '\\'])
            || input.starts_with('~')
            || input.starts_with('.')
            || Path::new(input).is_absolute();
        if path_like {
            let path = parse_path_input(input).map_err(|reason| WorkspaceError::InvalidName {
                name: input.to_string(),
                reason,
            })?;
            let path = if path.is_absolute() {
                path
            } else {
                self.base_dir.join(path)
            };
            let name = default_name(&path);
            return Ok((path, name));
        }

        validate_name(input).map_err(|reason| WorkspaceError::InvalidName {
            name: input.to_string(),
            reason,
        })?;
        Ok((self.base_dir.join(input), input.to_string()))
    }

    pub fn initialize_new(&self, name_or_path: &str) -> Result<WorkspaceResult, WorkspaceError> {
        let (path, name) = self.resolve_target(name_or_path)?;
        self.initialize_at(&path, &name)
    }

    /// Create a fresh workspace at `path`. Partial work is removed on failure.
    pub fn initialize_at(&self, path: &Path, name: &str) -> Result<WorkspaceResult, WorkspaceError> {
        validate_name(name).map_err(|reason| WorkspaceError::InvalidName {
            name: name.to_string(),
            reason,
        })?;
        if path.exists() {
            if !path.is_dir() {
                return Err(WorkspaceError::NotADirectory(path.to_path_buf()));
            }
            if MARKERS.iter().any(|marker| path.join(marker).exists()) {
                return Err(WorkspaceError::AlreadyInitialized(path.to_path_buf()));
            }
        }

        let env_vars = self.env_vars(name)?;
        let manifest_vars = self.manifest_vars(name);
        let mut tx = InstallationTransaction::new(format!("init {}", path.display()));
        let mut created_files = Vec::new();

        if !path.exists() {
            if !tx.execute_operation(dir_operation(path.to_path_buf())) {
                return Err(transaction_error(path, &tx));
            }
            created_files.push(path.to_path_buf());
        }
        let ops = [
            dir_operation(path.join(STATE_DIR)),
            dir_operation(path.join(DATA_DIR)),
            self.render_operation(Template::WorkspaceConfig, path, manifest_vars),
            self.render_operation(Template::EnvFile, path, env_vars),
        ];
        created_files.extend(MARKERS.iter().map(|m| path.join(m)));

        for op in ops {
            if !tx.execute_operation(op) {
                break;
            }
        }
        if tx.is_poisoned() {
            return Err(transaction_error(path, &tx));
        }
        tx.commit();

        info!(path = %path.display(), name, "workspace initialised");
        Ok(WorkspaceResult {
            path: path.to_path_buf(),
            name: name.to_string(),
            created_files,
        })
    }

    /// Add missing markers to an existing directory and repair broken config
    /// files, keeping a `.bak` copy of each file it replaces.
    pub fn convert_existing(
        &self,
        path: &Path,
        consent: bool,
    ) -> Result<ConversionResult, WorkspaceError> {
        let validation = self.validate(path)?;
        if validation.is_valid {
            return Ok(ConversionResult {
                path: path.to_path_buf(),
                ..ConversionResult::default()
            });
        }
        if !consent {
            return Err(WorkspaceError::ConsentRequired(path.to_path_buf()));
        }
        if let Some(blocker) = validation.invalid_configs.iter().find(|c| !c.repairable) {
            return Err(WorkspaceError::Io {
                path: blocker.file.clone(),
                message: blocker.error.clone(),
            });
        }

        let name = deps::read_manifest(path)
            .ok()
            .map(|m| m.workspace.name)
            .filter(|n| validate_name(n).is_ok())
            .unwrap_or_else(|| default_name(path));

        let mut tx = InstallationTransaction::new(format!("convert {}", path.display()));
        let mut result = ConversionResult {
            path: path.to_path_buf(),
            ..ConversionResult::default()
        };

        let mut ops = Vec::new();
        for missing in &validation.missing_files {
            ops.push(self.marker_operation(path, missing, &name)?);
            result.added.push(missing.clone());
        }
        for invalid in &validation.invalid_configs {
            let backup = backup_path(&invalid.file);
            ops.push(backup_operation(invalid.file.clone(), backup.clone()));
            ops.push(self.marker_operation(path, &invalid.file, &name)?);
            result.regenerated.push(invalid.file.clone());
            result.backups.push(backup);
        }

        for op in ops {
            if !tx.execute_operation(op) {
                return Err(transaction_error(path, &tx));
            }
        }
        tx.commit();

        info!(
            path = %path.display(),
            added = result.added.len(),
            regenerated = result.regenerated.len(),
            "workspace converted"
        );
        Ok(result)
    }

    /// Record `path` as the active workspace, when a registry is attached.
    pub(crate) fn register_active(&self, path: &Path) -> Result<(), WorkspaceError> {
        let Some(store) = self.registry else {
            return Ok(());
        };
        store
            .set_active_workspace(path)
            .map_err(|err| WorkspaceError::Io {
                path: store.config_path().to_path_buf(),
                message: format!("{err:#}"),
            })
    }

    fn marker_operation(
        &self,
        root: &Path,
        marker: &Path,
        name: &str,
    ) -> Result<Operation<'a>, WorkspaceError> {
        let file_name = marker
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(match file_name.as_str() {
            WORKSPACE_FILE => {
                self.render_operation(Template::WorkspaceConfig, root, self.manifest_vars(name))
            }
            ENV_FILE => self.render_operation(Template::EnvFile, root, self.env_vars(name)?),
            _ => dir_operation(marker.to_path_buf()),
        })
    }

    fn render_operation(
        &self,
        template: Template,
        dir: &Path,
        vars: BTreeMap<String, String>,
    ) -> Operation<'a> {
        let renderer = self.renderer;
        let dir = dir.to_path_buf();
        let target = dir.join(template.file_name());
        Operation::new(
            format!("render {}", template.file_name()),
            move || renderer.render(template, &dir, &vars).map(|_| ()),
            move || remove_path_if_exists(&target).map(|_| ()),
        )
    }

    fn manifest_vars(&self, name: &str) -> BTreeMap<String, String> {
        let components = self
            .dependencies
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ");
        BTreeMap::from([
            ("name".to_string(), name.to_string()),
            ("created_at".to_string(), Utc::now().to_rfc3339()),
            ("components".to_string(), format!("[{components}]")),
            ("tools".to_string(), "[]".to_string()),
        ])
    }

    fn env_vars(&self, name: &str) -> Result<BTreeMap<String, String>, WorkspaceError> {
        let database_url = self
            .secrets
            .connection_string(Component::Workspace)
            .map_err(|err| WorkspaceError::Service(format!("{err:#}")))?;
        Ok(BTreeMap::from([
            ("database_url".to_string(), database_url),
            ("name".to_string(), name.to_string()),
        ]))
    }
}

fn default_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "workspace".to_string())
}

fn backup_path(file: &Path) -> PathBuf {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    file.with_file_name(format!("{name}.bak"))
}

fn dir_operation<'a>(dir: PathBuf) -> Operation<'a> {
    let undo = dir.clone();
    Operation::new(
        format!("create {}", dir.display()),
        move || {
            fs::create_dir_all(&dir)?;
            Ok(())
        },
        move || remove_path_if_exists(&undo).map(|_| ()),
    )
}

/// Copy `file` aside; undo moves the copy back.
fn backup_operation<'a>(file: PathBuf, backup: PathBuf) -> Operation<'a> {
    let (restore_file, restore_backup) = (file.clone(), backup.clone());
    Operation::new(
        format!("back up {}", file.display()),
        move || {
            debug!(file = %file.display(), backup = %backup.display(), "backing up");
            fs::copy(&file, &backup)?;
            Ok(())
        },
        move || {
            fs::rename(&restore_backup, &restore_file)?;
            Ok(())
        },
    )
}

fn transaction_error(path: &Path, tx: &InstallationTransaction<'_>) -> WorkspaceError {
    let message = tx
        .report()
        .failure
        .as_ref()
        .map(|f| format!("{}: {}", f.operation, f.message))
        .unwrap_or_else(|| "operation failed".to_string());
    WorkspaceError::Io {
        path: path.to_path_buf(),
        message,
    }
}
