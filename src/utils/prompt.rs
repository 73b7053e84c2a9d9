//! User prompt utilities using dialoguer

use crate::utils::error::{LayoutError, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, FuzzySelect, MultiSelect, Select};

fn prompt_failed(e: dialoguer::Error) -> LayoutError {
    LayoutError::Io(std::io::Error::other(e.to_string()))
}

/// Prompt for yes/no confirmation
pub fn prompt_confirm(prompt: &str, default: bool) -> Result<bool> {
    let theme = ColorfulTheme::default();
    Confirm::with_theme(&theme)
        .with_prompt(prompt)
        .default(default)
        .interact_opt()
        .map_err(prompt_failed)?
        .ok_or(LayoutError::UserCancelled)
}

/// Prompt for selection from a list
pub fn prompt_select<T: ToString>(prompt: &str, items: &[T], default: usize) -> Result<usize> {
    let theme = ColorfulTheme::default();
    Select::with_theme(&theme)
        .with_prompt(prompt)
        .items(items)
        .default(default)
        .interact_opt()
        .map_err(prompt_failed)?
        .ok_or(LayoutError::UserCancelled)
}

/// Prompt for fuzzy selection from a list
pub fn prompt_fuzzy_select<T: ToString>(prompt: &str, items: &[T], default: usize) -> Result<usize> {
    let theme = ColorfulTheme::default();
    FuzzySelect::with_theme(&theme)
        .with_prompt(prompt)
        .items(items)
        .default(default)
        .interact_opt()
        .map_err(prompt_failed)?
        .ok_or(LayoutError::UserCancelled)
}

/// Prompt for any number of entries; returns their indices
pub fn prompt_multi_select<T: ToString>(prompt: &str, items: &[T]) -> Result<Vec<usize>> {
    let theme = ColorfulTheme::default();
    MultiSelect::with_theme(&theme)
        .with_prompt(prompt)
        .items(items)
        .interact_opt()
        .map_err(prompt_failed)?
        .ok_or(LayoutError::UserCancelled)
}

/// Display a warning and ask for confirmation
pub fn warn_confirm(warning: &str) -> Result<bool> {
    println!("\nWARNING: {}\n", warning);
    prompt_confirm("Continue?", false)
}
