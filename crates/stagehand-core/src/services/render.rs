//! `{{key}}` placeholder renderer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::{Template, TemplateRenderer};
use crate::fs::write_atomic;

#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl PlaceholderRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateRenderer for PlaceholderRenderer {
    fn render(
        &self,
        template: Template,
        target_dir: &Path,
        vars: &BTreeMap<String, String>,
    ) -> anyhow::Result<PathBuf> {
        let content = substitute(template.body(), vars)
            .with_context(|| format!("Failed to render {}", template.file_name()))?;
        let path = target_dir.join(template.file_name());
        write_atomic(&path, content.as_bytes())?;
        Ok(path)
    }
}

/// Replace every `{{key}}`; unknown keys are an error rather than left in place.
pub fn substitute(body: &str, vars: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let mut out = String::with_capacity(body.len());
    let mut missing = Vec::new();
    let mut rest = body;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            anyhow::bail!("Unterminated placeholder near '{}'", &rest[open..]);
        };
        let key = after[..close].trim();
        match vars.get(key) {
            Some(value) => out.push_str(value),
            None => missing.push(key.to_string()),
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);

    if !missing.is_empty() {
        anyhow::bail!("Missing template values: {}", missing.join(", "));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_all_keys() {
        let out = substitute("a={{ a }} b={{b}}", &vars(&[("a", "1"), ("b", "2")])).unwrap();
        assert_eq!(out, "a=1 b=2");
    }

    #[test]
    fn reports_every_missing_key() {
        let err = substitute("{{x}} {{y}}", &vars(&[])).unwrap_err().to_string();
        assert!(err.contains("x") && err.contains("y"));
    }

    #[test]
    fn renders_env_file_into_directory() {
        let temp = TempDir::new().unwrap();
        let path = PlaceholderRenderer
            .render(
                Template::EnvFile,
                temp.path(),
                &vars(&[("database_url", "postgresql://db"), ("name", "demo")]),
            )
            .unwrap();

        assert_eq!(path, temp.path().join(".env"));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("DATABASE_URL=postgresql://db"));
    }
}
