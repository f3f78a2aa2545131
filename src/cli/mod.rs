pub mod actions;
pub mod commands;
pub mod dispatch;
pub mod globals;

mod start;
pub use self::start::start;

use crate::cli::actions::{request, reset, Action};
use crate::cli::globals::GlobalArgs;
use anyhow::Result;

/// Execute the provided action.
// This is the single dispatch point for all CLI actions.
// To add a new action, add a new `Action::*` variant and a corresponding `*::execute` call here.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(globals: GlobalArgs, action: Action) -> Result<()> {
    match action {
        Action::Request(args) => request::execute(&globals, args).await,
        Action::Reset(args) => reset::execute(&globals, args).await,
    }
}
