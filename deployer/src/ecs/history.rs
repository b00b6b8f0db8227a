//! `history` subcommand

use super::load_stack;
use crate::{history::History, Error};
use std::path::Path;
use tracing::info;

/// Lists recorded rollouts of the stack, newest first
pub fn history(config: &Path) -> Result<(), Error> {
    let stack = load_stack(config)?;
    let history = History::open(&stack.name)?;
    let records = history.load()?;
    if records.is_empty() {
        info!(directory = ?history.directory(), "no rollouts recorded");
        return Ok(());
    }
    for record in records {
        info!(
            tag = record.tag.as_str(),
            state = %record.state,
            started_at = record.started_at,
            duration = record.finished_at.saturating_sub(record.started_at),
            task_definition = record.task_definition.as_deref(),
            error = record.error.as_deref(),
            "rollout"
        );
    }
    Ok(())
}
