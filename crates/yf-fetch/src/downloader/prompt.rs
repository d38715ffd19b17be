use anyhow::{anyhow, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input};
use std::collections::VecDeque;

/// Source of interactive answers.
pub trait Prompter {
    /// Free text. Blank answers are allowed; `default` is what a blank
    /// answer means, when there is one.
    fn text(&mut self, prompt: &str, default: Option<&str>) -> Result<String>;

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool>;

    /// Shows text without expecting an answer.
    fn notice(&mut self, _message: &str) {}
}

#[derive(Default)]
pub struct TermPrompter {
    theme: ColorfulTheme,
}

impl Prompter for TermPrompter {
    fn text(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true);
        if let Some(value) = default {
            input = input.default(value.to_string());
        }
        Ok(input.interact_text()?)
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        Ok(Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()?)
    }

    fn notice(&mut self, message: &str) {
        println!("{}", message);
    }
}

/// Answers prompts from a fixed list, in order. `y`/`yes` confirms.
/// For tests; not part of the supported API.
#[doc(hidden)]
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// Prompts seen so far.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    fn next(&mut self, prompt: &str) -> Result<String> {
        self.asked.push(prompt.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted answer for '{}'", prompt))
    }
}

impl Prompter for ScriptedPrompter {
    fn text(&mut self, prompt: &str, default: Option<&str>) -> Result<String> {
        let answer = self.next(prompt)?;
        match default {
            Some(value) if answer.trim().is_empty() => Ok(value.to_string()),
            _ => Ok(answer),
        }
    }

    fn confirm(&mut self, prompt: &str, default: bool) -> Result<bool> {
        let answer = self.next(prompt)?;
        Ok(match answer.trim().to_ascii_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        })
    }
}
