//! Workspace recognition by marker files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{DATA_DIR, ENV_FILE, STATE_DIR, WORKSPACE_FILE, WorkspaceManifest};
use crate::error::WorkspaceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidConfig {
    pub file: PathBuf,
    pub error: String,
    /// Conversion can back the file up and regenerate it.
    pub repairable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Share of passed marker checks; a half-broken marker counts half.
    pub confidence: f64,
    pub missing_files: Vec<PathBuf>,
    pub invalid_configs: Vec<InvalidConfig>,
    pub suggestions: Vec<String>,
    pub auto_fixable: bool,
}

impl ValidationResult {
    /// Whether any marker exists at all.
    pub fn has_markers(&self) -> bool {
        self.missing_files.len() < MARKER_COUNT
    }
}

const MARKER_COUNT: usize = 4;

enum Check {
    Passed,
    Missing(PathBuf),
    Invalid(InvalidConfig),
}

/// Inspect `path` without modifying it.
pub fn validate_workspace(path: &Path) -> Result<ValidationResult, WorkspaceError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(WorkspaceError::DirectoryNotFound(path.to_path_buf()));
        }
        Err(err) => {
            return Err(WorkspaceError::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            });
        }
    };
    if !metadata.is_dir() {
        return Err(WorkspaceError::NotADirectory(path.to_path_buf()));
    }

    let checks = [
        check_manifest(&path.join(WORKSPACE_FILE)),
        check_env(&path.join(ENV_FILE)),
        check_dir(&path.join(STATE_DIR)),
        check_dir(&path.join(DATA_DIR)),
    ];

    let mut score = 0.0;
    let mut missing_files = Vec::new();
    let mut invalid_configs = Vec::new();
    for check in checks {
        match check {
            Check::Passed => score += 1.0,
            Check::Missing(file) => missing_files.push(file),
            Check::Invalid(invalid) => {
                score += 0.5;
                invalid_configs.push(invalid);
            }
        }
    }

    let is_valid = missing_files.is_empty() && invalid_configs.is_empty();
    let auto_fixable = !is_valid && invalid_configs.iter().all(|c| c.repairable);
    let suggestions = suggestions(path, &missing_files, &invalid_configs, auto_fixable);

    Ok(ValidationResult {
        is_valid,
        confidence: score / MARKER_COUNT as f64,
        missing_files,
        invalid_configs,
        suggestions,
        auto_fixable,
    })
}

fn check_manifest(file: &Path) -> Check {
    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(_) if !file.exists() => return Check::Missing(file.to_path_buf()),
        Err(err) => return invalid(file, err.to_string(), !file.is_dir()),
    };
    match toml::from_str::<WorkspaceManifest>(&content) {
        Ok(manifest) if manifest.workspace.name.trim().is_empty() => {
            invalid(file, "[workspace] name is empty".to_string(), true)
        }
        Ok(_) => Check::Passed,
        Err(err) => invalid(file, err.message().to_string(), true),
    }
}

fn check_env(file: &Path) -> Check {
    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(_) if !file.exists() => return Check::Missing(file.to_path_buf()),
        Err(err) => return invalid(file, err.to_string(), !file.is_dir()),
    };
    let has_url = content.lines().any(|line| {
        line.trim_start()
            .strip_prefix("DATABASE_URL=")
            .is_some_and(|value| !value.trim().is_empty())
    });
    if has_url {
        Check::Passed
    } else {
        invalid(file, "DATABASE_URL is not set".to_string(), true)
    }
}

fn check_dir(dir: &Path) -> Check {
    if dir.is_dir() {
        Check::Passed
    } else if dir.exists() {
        invalid(dir, "expected a directory, found a file".to_string(), false)
    } else {
        Check::Missing(dir.to_path_buf())
    }
}

fn invalid(file: &Path, error: String, repairable: bool) -> Check {
    Check::Invalid(InvalidConfig {
        file: file.to_path_buf(),
        error,
        repairable,
    })
}

fn suggestions(
    path: &Path,
    missing: &[PathBuf],
    invalid: &[InvalidConfig],
    auto_fixable: bool,
) -> Vec<String> {
    let mut suggestions = Vec::new();
    if missing.len() == MARKER_COUNT {
        suggestions.push(format!(
            "{} is not a workspace; run `stagehand workspace init {}` to create one",
            path.display(),
            path.display()
        ));
        return suggestions;
    }
    for file in missing {
        suggestions.push(format!("Create {}", file.display()));
    }
    for config in invalid {
        if config.repairable {
            suggestions.push(format!(
                "Regenerate {} ({}); the current file is kept as .bak",
                config.file.display(),
                config.error
            ));
        } else {
            suggestions.push(format!(
                "Move {} out of the way ({})",
                config.file.display(),
                config.error
            ));
        }
    }
    if auto_fixable {
        suggestions.push("Accept conversion to repair the workspace automatically".to_string());
    }
    suggestions
}
