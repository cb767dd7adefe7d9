//! Choosing between scripts that share a name, and yes/no decisions.
//!
//! Interaction goes through two small capabilities so that the same logic
//! runs against a terminal, a fixed automation policy, or a test double:
//!
//! - [`Selector`] answers "which of these N candidates?" with raw text
//! - [`Confirmer`] answers yes/no questions such as "stash and retry?"
//!
//! [`ConflictResolver`] validates the selector's answer. Out-of-range or
//! non-numeric answers are rejected and asked again, never clamped.

use anyhow::Result;
use colored::Colorize;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use tracing::debug;

use crate::core::CachetError;
use crate::scripts::ScriptEntry;

/// How many answers a selector gets before resolution fails.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// What a [`Selector`] is asked.
#[derive(Debug, Clone, Copy)]
pub struct SelectionPrompt<'a> {
    /// Script name being resolved
    pub script: &'a str,
    /// Candidates, in the order the 1-based answer refers to
    pub candidates: &'a [ScriptEntry],
    /// Why the previous answer was rejected, if this is a re-prompt
    pub rejected: Option<&'a str>,
}

/// Raw answer from a [`Selector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorResponse {
    /// Text that should hold a 1-based index
    Input(String),
    /// The user backed out
    Cancelled,
}

/// Source of a 1-based candidate selection.
pub trait Selector {
    /// Asks for a selection.
    fn select(&mut self, prompt: &SelectionPrompt<'_>) -> Result<SelectorResponse>;
}

/// Source of yes/no decisions.
pub trait Confirmer {
    /// Asks `question`.
    ///
    /// # Errors
    ///
    /// [`CachetError::Cancelled`] if the user aborts the prompt.
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// Picks between same-named scripts.
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    max_attempts: u32,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

fn parse_choice(input: &str, count: usize) -> Result<usize, String> {
    let trimmed = input.trim();
    let index: usize = trimmed.parse().map_err(|_| format!("'{trimmed}' is not a number"))?;
    if (1..=count).contains(&index) {
        Ok(index - 1)
    } else {
        Err(format!("{index} is not between 1 and {count}"))
    }
}

impl ConflictResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of answers accepted before giving up.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Returns the chosen candidate.
    ///
    /// A single candidate is returned without consulting `selector`.
    ///
    /// # Errors
    ///
    /// - [`CachetError::Cancelled`] when the selector reports cancellation
    /// - [`CachetError::Validation`] when `candidates` is empty or no valid
    ///   answer arrives within the attempt limit
    pub fn resolve(&self, candidates: &[ScriptEntry], selector: &mut dyn Selector) -> Result<ScriptEntry> {
        let Some(first) = candidates.first() else {
            return Err(CachetError::validation("candidates", "no scripts to choose from").into());
        };
        if candidates.len() == 1 {
            return Ok(first.clone());
        }

        let mut rejected: Option<String> = None;
        for attempt in 1..=self.max_attempts {
            let prompt = SelectionPrompt {
                script: &first.name,
                candidates,
                rejected: rejected.as_deref(),
            };
            match selector.select(&prompt)? {
                SelectorResponse::Cancelled => return Err(CachetError::Cancelled.into()),
                SelectorResponse::Input(answer) => match parse_choice(&answer, candidates.len()) {
                    Ok(index) => {
                        let chosen = &candidates[index];
                        debug!(
                            "Resolved '{}' to {}/{} on attempt {}",
                            chosen.name, chosen.repository, chosen.relative_path, attempt
                        );
                        return Ok(chosen.clone());
                    }
                    Err(reason) => rejected = Some(reason),
                },
            }
        }

        Err(CachetError::validation(
            "selection",
            format!(
                "no valid choice after {} attempts: {}",
                self.max_attempts,
                rejected.unwrap_or_default()
            ),
        )
        .into())
    }
}

fn map_prompt_error(error: dialoguer::Error) -> anyhow::Error {
    let dialoguer::Error::IO(io) = error;
    match io.kind() {
        std::io::ErrorKind::Interrupted | std::io::ErrorKind::UnexpectedEof => CachetError::Cancelled.into(),
        _ => io.into(),
    }
}

/// Numbered terminal prompt.
#[derive(Debug, Default)]
pub struct TerminalSelector;

impl Selector for TerminalSelector {
    fn select(&mut self, prompt: &SelectionPrompt<'_>) -> Result<SelectorResponse> {
        match prompt.rejected {
            Some(reason) => eprintln!("{} {}", "Invalid selection:".red(), reason),
            None => {
                eprintln!(
                    "{} '{}' is provided by {} repositories:",
                    "Multiple scripts named".yellow(),
                    prompt.script,
                    prompt.candidates.len()
                );
                for (i, entry) in prompt.candidates.iter().enumerate() {
                    eprintln!("  {}) {} ({})", i + 1, entry.repository.bold(), entry.relative_path);
                }
            }
        }

        let answer: Result<String, _> = Input::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Select [1-{}]", prompt.candidates.len()))
            .interact_text();
        match answer {
            Ok(text) => Ok(SelectorResponse::Input(text)),
            Err(e) => match map_prompt_error(e) {
                e if crate::core::is_cancelled(&e) => Ok(SelectorResponse::Cancelled),
                e => Err(e),
            },
        }
    }
}

/// Always answers with the same text; `FixedSelector::first()` picks the
/// first candidate for non-interactive use.
#[derive(Debug, Clone)]
pub struct FixedSelector(pub String);

impl FixedSelector {
    #[must_use]
    pub fn first() -> Self {
        Self("1".to_string())
    }
}

impl Selector for FixedSelector {
    fn select(&mut self, _prompt: &SelectionPrompt<'_>) -> Result<SelectorResponse> {
        Ok(SelectorResponse::Input(self.0.clone()))
    }
}

/// Terminal yes/no prompt.
#[derive(Debug, Default)]
pub struct TerminalConfirmer;

impl Confirmer for TerminalConfirmer {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(false)
            .interact()
            .map_err(map_prompt_error)
    }
}

/// Answers every question with a fixed value.
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirmer(pub bool);

impl Confirmer for FixedConfirmer {
    fn confirm(&mut self, question: &str) -> Result<bool> {
        debug!("Auto-answering '{}' with {}", question, self.0);
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted {
        answers: VecDeque<SelectorResponse>,
        calls: usize,
        rejections: Vec<String>,
    }

    impl Scripted {
        fn new(answers: &[&str]) -> Self {
            Self {
                answers: answers.iter().map(|a| SelectorResponse::Input((*a).to_string())).collect(),
                calls: 0,
                rejections: Vec::new(),
            }
        }
    }

    impl Selector for Scripted {
        fn select(&mut self, prompt: &SelectionPrompt<'_>) -> Result<SelectorResponse> {
            self.calls += 1;
            if let Some(reason) = prompt.rejected {
                self.rejections.push(reason.to_string());
            }
            Ok(self.answers.pop_front().unwrap_or(SelectorResponse::Cancelled))
        }
    }

    fn deploys() -> Vec<ScriptEntry> {
        vec![
            ScriptEntry::new("deploy", "bin/deploy.sh", "alpha"),
            ScriptEntry::new("deploy", "deploy.sh", "beta"),
        ]
    }

    #[test]
    fn test_selection_two_returns_beta() {
        let mut selector = Scripted::new(&["2"]);
        let chosen = ConflictResolver::new().resolve(&deploys(), &mut selector).unwrap();
        assert_eq!(chosen.repository, "beta");
        assert_eq!(selector.calls, 1);
    }

    #[test]
    fn test_single_candidate_never_asks() {
        let mut selector = Scripted::new(&[]);
        let only = vec![ScriptEntry::new("lint", "lint.sh", "alpha")];
        let chosen = ConflictResolver::new().resolve(&only, &mut selector).unwrap();
        assert_eq!(chosen, only[0]);
        assert_eq!(selector.calls, 0);
    }

    #[test]
    fn test_invalid_answers_are_reprompted_not_clamped() {
        let mut selector = Scripted::new(&["0", "3", "two", " 1 "]);
        let chosen = ConflictResolver::new().resolve(&deploys(), &mut selector).unwrap();
        assert_eq!(chosen.repository, "alpha");
        assert_eq!(selector.calls, 4);
        assert_eq!(selector.rejections.len(), 3);
        assert!(selector.rejections[1].contains("between 1 and 2"));
    }

    #[test]
    fn test_cancellation_is_distinct() {
        let mut selector = Scripted::new(&[]);
        let err = ConflictResolver::new().resolve(&deploys(), &mut selector).unwrap_err();
        assert!(crate::core::is_cancelled(&err));
    }

    #[test]
    fn test_attempt_limit() {
        let mut selector = FixedSelector("9".to_string());
        let err = ConflictResolver::new()
            .with_max_attempts(3)
            .resolve(&deploys(), &mut selector)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CachetError>(),
            Some(CachetError::Validation { .. })
        ));
    }

    #[test]
    fn test_empty_candidates_rejected() {
        let mut selector = FixedSelector::first();
        assert!(ConflictResolver::new().resolve(&[], &mut selector).is_err());
    }

    #[test]
    fn test_fixed_confirmer() {
        assert!(FixedConfirmer(true).confirm("stash?").unwrap());
        assert!(!FixedConfirmer(false).confirm("stash?").unwrap());
    }
}
