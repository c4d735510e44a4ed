//! Interactive prompts using dialoguer

use std::path::Path;

use anyhow::Result;
use dialoguer::Confirm;

/// Prompt user to confirm proceeding with an action
pub fn confirm_step(message: &str) -> Result<bool> {
    let confirmed = Confirm::new()
        .with_prompt(message)
        .default(true)
        .interact()?;
    Ok(confirmed)
}

/// Ask before overwriting existing export files.
///
/// Returns true straight away when none of `paths` exist or `no_confirm` is
/// set.
pub fn confirm_overwrite(paths: &[&Path], no_confirm: bool) -> Result<bool> {
    let existing: Vec<&&Path> = paths.iter().filter(|p| p.exists()).collect();
    if existing.is_empty() || no_confirm {
        return Ok(true);
    }

    let message = if existing.len() == 1 {
        format!("Overwrite {}?", existing[0].display())
    } else {
        format!("Overwrite {} existing export files?", existing.len())
    };
    confirm_step(&message)
}
