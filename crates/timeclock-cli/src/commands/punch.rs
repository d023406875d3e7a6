use timeclock_core::{LogEntry, LogKind};

use crate::commands::common::{format_log_lines, open_session, CommandContext};
use crate::error::CliError;

/// Record a punch, print the updated history, then wait for the store write.
pub async fn run_punch(kind: LogKind, context: &CommandContext) -> Result<(), CliError> {
    let session = open_session(context).await?;
    let pending = session.tracker.record_time(kind)?;
    let entry = pending.entry().clone();

    for line in format_log_lines(&session.tracker.logs()) {
        println!("{line}");
    }

    let written = pending.wait().await;
    session.close();
    written.map_err(|error| punch_not_saved(&entry, &error))?;

    println!("Saved {}", entry.display_line());
    Ok(())
}

pub fn punch_not_saved(entry: &LogEntry, error: &timeclock_core::Error) -> CliError {
    CliError::PunchNotSaved {
        kind: entry.kind.to_string(),
        timestamp: entry.timestamp_local(),
        reason: error.to_string(),
    }
}
