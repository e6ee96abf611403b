//! Line-based prompt abstraction for the interactive workspace flow.
//!
//! The flow is a synchronous read-validate-reprompt loop. Frontends provide a
//! [`Prompter`] (the CLI wraps dialoguer); tests use [`ScriptedPrompter`].

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::error::PromptError;

pub trait Prompter {
    /// Show a line of output.
    fn say(&mut self, line: &str) -> Result<(), PromptError>;

    /// Ask for one line of input; the returned text is untrimmed.
    fn ask(&mut self, prompt: &str) -> Result<String, PromptError>;
}

/// Prompter fed from a fixed list of answers, recording everything shown.
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    transcript: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    /// Whether any shown line contains `needle`.
    pub fn saw(&self, needle: &str) -> bool {
        self.transcript.iter().any(|line| line.contains(needle))
    }
}

impl Prompter for ScriptedPrompter {
    fn say(&mut self, line: &str) -> Result<(), PromptError> {
        self.transcript.push(line.to_string());
        Ok(())
    }

    fn ask(&mut self, prompt: &str) -> Result<String, PromptError> {
        self.transcript.push(format!("? {prompt}"));
        self.answers.pop_front().ok_or(PromptError::Closed)
    }
}

#[derive(Debug, Clone)]
pub struct MenuOption {
    pub label: &'static str,
    pub help: &'static str,
}

/// Numbered single-character menu with a `?` help toggle.
///
/// Returns the zero-based index of the chosen option. Invalid input is
/// reported and the menu is shown again.
pub fn select(
    prompter: &mut dyn Prompter,
    title: &str,
    options: &[MenuOption],
) -> Result<usize, PromptError> {
    let mut show_help = false;
    loop {
        prompter.say(title)?;
        for (index, option) in options.iter().enumerate() {
            prompter.say(&format!("  {}) {}", index + 1, option.label))?;
            if show_help {
                prompter.say(&format!("       {}", option.help))?;
            }
        }

        let answer = prompter.ask(&format!("Select [1-{}, ? for help]", options.len()))?;
        let answer = answer.trim();
        if answer == "?" || answer.eq_ignore_ascii_case("h") {
            show_help = !show_help;
            continue;
        }

        let mut chars = answer.chars();
        let choice = match (chars.next(), chars.next()) {
            (Some(c), None) => c.to_digit(10).map(|d| d as usize),
            _ => None,
        };
        match choice {
            Some(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
            _ => prompter.say(&format!(
                "Invalid choice '{}'. Enter a number between 1 and {}.",
                answer,
                options.len()
            ))?,
        }
    }
}

/// Yes/no question; empty input takes `default`.
pub fn confirm(
    prompter: &mut dyn Prompter,
    question: &str,
    default: bool,
) -> Result<bool, PromptError> {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    loop {
        let answer = prompter.ask(&format!("{question} {hint}"))?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "" => return Ok(default),
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            other => prompter.say(&format!("Please answer 'y' or 'n' (got '{other}')."))?,
        }
    }
}

const ILLEGAL_PATH_CHARS: &[char] = &['<', '>', '"', '|', '?', '*'];

/// Validate a free-form path entry: non-empty, no control or reserved characters.
/// A leading `~/` expands to the home directory.
pub fn parse_path_input(input: &str) -> Result<PathBuf, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("path must not be empty".to_string());
    }
    if let Some(c) = trimmed
        .chars()
        .find(|c| c.is_control() || ILLEGAL_PATH_CHARS.contains(c))
    {
        return Err(format!("path contains an illegal character {c:?}"));
    }
    if let Some(rest) = trimmed.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return Ok(home.join(rest));
    }
    Ok(PathBuf::from(trimmed))
}

/// Validate a workspace name used as a single directory component.
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name == "." || name == ".." {
        return Err("name must not be '.' or '..'".to_string());
    }
    if name.len() > 255 {
        return Err("name is longer than 255 bytes".to_string());
    }
    if let Some(c) = name.chars().find(|c| {
        c.is_control() || ILLEGAL_PATH_CHARS.contains(c) || matches!(c, '/' | '\\' | ':')
    }) {
        return Err(format!("name contains an illegal character {c:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<MenuOption> {
        vec![
            MenuOption {
                label: "First",
                help: "the first one",
            },
            MenuOption {
                label: "Second",
                help: "the second one",
            },
        ]
    }

    #[test]
    fn select_reprompts_until_valid() {
        let mut prompter = ScriptedPrompter::new(["9", "abc", "", "2"]);
        let choice = select(&mut prompter, "Pick", &options()).unwrap();

        assert_eq!(choice, 1);
        assert!(prompter.saw("Invalid choice '9'"));
        assert!(prompter.saw("Invalid choice 'abc'"));
        assert_eq!(prompter.remaining(), 0);
    }

    #[test]
    fn help_toggle_shows_descriptions() {
        let mut prompter = ScriptedPrompter::new(["?", "1"]);
        select(&mut prompter, "Pick", &options()).unwrap();
        assert!(prompter.saw("the first one"));
    }

    #[test]
    fn select_fails_when_input_closes() {
        let mut prompter = ScriptedPrompter::new(["x"]);
        assert_eq!(
            select(&mut prompter, "Pick", &options()),
            Err(PromptError::Closed)
        );
    }

    #[test]
    fn confirm_uses_default_and_reprompts() {
        let mut prompter = ScriptedPrompter::new(["maybe", ""]);
        assert!(confirm(&mut prompter, "Go?", true).unwrap());
        assert!(prompter.saw("Please answer"));
    }

    #[test]
    fn path_input_rules() {
        assert!(parse_path_input("   ").is_err());
        assert!(parse_path_input("bad|path").is_err());
        assert_eq!(
            parse_path_input(" ./ws ").unwrap(),
            PathBuf::from("./ws")
        );
    }

    #[test]
    fn name_rules() {
        assert!(validate_name("my-workspace_1.0").is_ok());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("what?").is_err());
    }
}
