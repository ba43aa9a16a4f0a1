use dialoguer::console::Term;
use dialoguer::{Confirm, Input, MultiSelect, Password, Select};

use crate::error::{Result, StreamError};

/// Interactive "ask the user" collaborator.
///
/// Every decision the preparation pipeline cannot make on its own goes
/// through this trait, so the decision core can be driven by scripted
/// answers in tests.
#[cfg_attr(test, mockall::automock)]
pub trait Prompt: Send + Sync {
    /// Pick exactly one option; returns its zero-based index
    fn select_one(&self, message: &str, options: &[String]) -> Result<usize>;

    /// Pick any number of options. Submitting without changes returns `defaults`.
    fn select_many(&self, message: &str, options: &[String], defaults: &[usize]) -> Result<Vec<usize>>;

    fn confirm(&self, message: &str, default: bool) -> Result<bool>;

    fn prompt_text(&self, message: &str) -> Result<String>;

    /// Hidden input (sudo password)
    fn prompt_secret(&self, message: &str) -> Result<String>;
}

/// Terminal prompt backed by dialoguer, drawing on stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Prompt for TerminalPrompt {
    fn select_one(&self, message: &str, options: &[String]) -> Result<usize> {
        if options.is_empty() {
            return Err(StreamError::Prompt(format!("Nothing to select: {}", message)));
        }
        if options.len() == 1 {
            return Ok(0);
        }
        let choice = Select::new()
            .with_prompt(message)
            .items(options)
            .default(0)
            .interact_on(&Term::stderr())?;
        Ok(choice)
    }

    fn select_many(&self, message: &str, options: &[String], defaults: &[usize]) -> Result<Vec<usize>> {
        let checked: Vec<bool> = (0..options.len()).map(|i| defaults.contains(&i)).collect();
        let selected = MultiSelect::new()
            .with_prompt(message)
            .items(options)
            .defaults(&checked)
            .interact_on(&Term::stderr())?;
        Ok(selected)
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        let answer = Confirm::new()
            .with_prompt(message)
            .default(default)
            .interact_on(&Term::stderr())?;
        Ok(answer)
    }

    fn prompt_text(&self, message: &str) -> Result<String> {
        let answer: String = Input::new()
            .with_prompt(message)
            .interact_text_on(&Term::stderr())?;
        Ok(answer.trim().to_string())
    }

    fn prompt_secret(&self, message: &str) -> Result<String> {
        let answer = Password::new()
            .with_prompt(message)
            .interact_on(&Term::stderr())?;
        Ok(answer.trim().to_string())
    }
}

/// Ask for a language tag, lowercased (eng, spa, ...)
pub fn prompt_language(prompt: &dyn Prompt, what: &str) -> Result<String> {
    loop {
        let answer = prompt.prompt_text(&format!("Enter language for {} (eng, spa, ...)", what))?;
        let answer = answer.trim().to_lowercase();
        if !answer.is_empty() {
            return Ok(answer);
        }
    }
}
