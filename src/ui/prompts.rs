//! Confirmation prompt with CI fallback

use super::context::UiContext;
use crate::error::{PitwallError, PitwallResult};

/// Ask a yes/no question.
///
/// `--yes` approves without asking; a non-interactive session gets
/// `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> PitwallResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }

    if !ctx.is_interactive() {
        return Ok(default);
    }

    let message = message.to_string();
    let answer = tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message).initial_value(default).interact()
    })
    .await
    .map_err(|e| PitwallError::Internal(format!("prompt task failed: {}", e)))?;

    answer.map_err(|e| PitwallError::User(format!("Prompt failed: {}", e)))
}
