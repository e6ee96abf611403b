//! Terminal prompter and styled status lines.

use std::io;

use console::{Emoji, style};
use dialoguer::{Input, theme::ColorfulTheme};

use stagehand_core::error::PromptError;
use stagehand_core::prompt::Prompter;
use stagehand_core::workflow::Interrupt;

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static STEP_ICON: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_step(msg: &str) {
    println!("{} {}", STEP_ICON, style(msg).bold());
}

pub fn print_hint(msg: &str) {
    eprintln!("   {} {}", style("hint:").cyan(), msg);
}

/// [`Prompter`] on stdin/stdout through dialoguer.
pub struct TerminalPrompter {
    theme: ColorfulTheme,
    interrupt: Interrupt,
}

impl TerminalPrompter {
    pub fn new(interrupt: Interrupt) -> Self {
        Self {
            theme: ColorfulTheme::default(),
            interrupt,
        }
    }
}

impl Prompter for TerminalPrompter {
    fn say(&mut self, line: &str) -> Result<(), PromptError> {
        println!("{line}");
        Ok(())
    }

    fn ask(&mut self, prompt: &str) -> Result<String, PromptError> {
        if self.interrupt.is_triggered() {
            return Err(PromptError::Interrupted);
        }
        let answer = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
            .map_err(prompt_error)?;
        // Ctrl-C is caught by the signal thread, so the read itself may succeed.
        if self.interrupt.is_triggered() {
            return Err(PromptError::Interrupted);
        }
        Ok(answer)
    }
}

fn prompt_error(err: dialoguer::Error) -> PromptError {
    let dialoguer::Error::IO(err) = err;
    match err.kind() {
        io::ErrorKind::Interrupted => PromptError::Interrupted,
        io::ErrorKind::UnexpectedEof => PromptError::Closed,
        _ => PromptError::Io(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_prompt_errors() {
        let err = |kind| dialoguer::Error::IO(io::Error::new(kind, "x"));
        assert_eq!(
            prompt_error(err(io::ErrorKind::Interrupted)),
            PromptError::Interrupted
        );
        assert_eq!(
            prompt_error(err(io::ErrorKind::UnexpectedEof)),
            PromptError::Closed
        );
        assert!(matches!(
            prompt_error(err(io::ErrorKind::PermissionDenied)),
            PromptError::Io(_)
        ));
    }

    #[test]
    fn triggered_interrupt_short_circuits_prompts() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let mut prompter = TerminalPrompter::new(interrupt);
        assert_eq!(prompter.ask("name"), Err(PromptError::Interrupted));
    }
}
