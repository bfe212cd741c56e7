/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint:

- `users`       -- account listing and the approval workflow
- `sessions`    -- chat sessions and messages
- `maintenance` -- startup, stats, health, cleanup, integrity, reset
- `serve`       -- the HTTP command proxy

Handlers print tables by default and JSON with `--json`.
*/

use colored::Colorize;
use serde::Serialize;

use crate::error::{ChatKvError, Result};
use crate::repository::ActionResult;

pub mod maintenance;
pub mod serve;
pub mod sessions;
pub mod users;

/// Print any serializable value as pretty JSON.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Report an [`ActionResult`]. A refusal becomes an error so the process
/// exits non-zero.
pub(crate) fn report_action<T: Serialize>(result: &ActionResult<T>, json: bool) -> Result<()> {
    if json {
        print_json(result)?;
    } else if result.success {
        println!("{}", result.message.green());
    }

    if result.success {
        Ok(())
    } else {
        Err(ChatKvError::Validation(result.message.clone()).into())
    }
}

/// Shorten `text` to at most `max` characters for table cells.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text.to_string()
    }
}

pub(crate) fn yes_no(flag: bool) -> String {
    if flag {
        "yes".green().to_string()
    } else {
        "no".dimmed().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Refusal;

    #[test]
    fn test_truncate_long_text() {
        assert_eq!(truncate("hello world", 8), "hello...");
        assert_eq!(truncate("short", 8), "short");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("héllo wörld", 6), "hél...");
    }

    #[test]
    fn test_report_refusal_is_error() {
        let refused: ActionResult = ActionResult::refused(Refusal::NotFound, "User not found");
        let err = report_action(&refused, false).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: User not found");

        let ok: ActionResult = ActionResult::ok("done");
        assert!(report_action(&ok, false).is_ok());
    }
}
