//! TOML parser with helpful error messages

use std::path::Path;

use anyhow::{Context, Result};

use super::schema::StagehandConfig;

/// Parse stagehand.toml from disk.
pub fn parse_config(path: &Path) -> Result<StagehandConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse stagehand.toml content and validate it.
pub fn parse_config_str(content: &str) -> Result<StagehandConfig> {
    let config: StagehandConfig =
        toml::from_str(content).map_err(|e| annotate_toml_error(e, content))?;
    config.validate()?;
    Ok(config)
}

pub fn to_toml(config: &StagehandConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration to TOML")
}

/// Attach the offending lines to a TOML error when a span is available.
fn annotate_toml_error(error: toml::de::Error, content: &str) -> anyhow::Error {
    let message = error.message().to_string();
    let Some(span) = error.span() else {
        return anyhow::anyhow!("TOML parsing error: {}", message);
    };

    let line = content[..span.start.min(content.len())]
        .chars()
        .filter(|c| *c == '\n')
        .count()
        + 1;
    anyhow::anyhow!(
        "TOML parsing error at line {}:\n{}\n\nError: {}",
        line,
        excerpt(content, line),
        message
    )
}

fn excerpt(content: &str, line: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let first = line.saturating_sub(2).max(1);
    let last = (line + 1).min(lines.len());

    (first..=last)
        .filter_map(|n| lines.get(n - 1).map(|text| (n, text)))
        .map(|(n, text)| {
            let marker = if n == line { ">>>" } else { "   " };
            format!("{} {:4} | {}", marker, n, text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
