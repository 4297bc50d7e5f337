//! Interactive device selection.

use std::io::{self, IsTerminal};

use dialoguer::{Select, theme::ColorfulTheme};
use indicatif::ProgressBar;
use tracing::warn;

use tankfill_core::{Candidate, DevicePicker, StrongestSignal};

/// Asks the operator which sensor to use when more than one matches.
///
/// Falls back to the strongest signal when there is no terminal to ask on.
/// Pressing Escape dismisses the prompt, which cancels the connection.
#[derive(Default)]
pub struct PromptPicker {
    spinner: Option<ProgressBar>,
}

impl PromptPicker {
    /// Hide `spinner` while the prompt is on screen.
    pub fn with_spinner(spinner: Option<ProgressBar>) -> Self {
        Self { spinner }
    }
}

impl DevicePicker for PromptPicker {
    fn pick(&self, candidates: &[Candidate]) -> Option<usize> {
        if candidates.len() <= 1 || !io::stdin().is_terminal() || !io::stderr().is_terminal() {
            return StrongestSignal.pick(candidates);
        }

        let items: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        let prompt = || {
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt("Select a sensor (Esc to cancel)")
                .items(&items)
                .default(0)
                .interact_opt()
        };
        let answer = match &self.spinner {
            Some(spinner) => spinner.suspend(prompt),
            None => prompt(),
        };
        match answer {
            Ok(choice) => choice,
            Err(e) => {
                warn!("Device prompt failed: {}", e);
                None
            }
        }
    }
}
