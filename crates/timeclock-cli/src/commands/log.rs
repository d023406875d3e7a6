use crate::commands::common::{
    format_log_lines, limit_entries, log_to_list_item, open_session, CommandContext, LogListItem,
};
use crate::error::CliError;

pub async fn run_log(
    limit: Option<usize>,
    as_json: bool,
    context: &CommandContext,
) -> Result<(), CliError> {
    let session = open_session(context).await?;
    let logs = session.tracker.logs();
    session.close();

    let shown = limit_entries(&logs, limit);
    if as_json {
        let json_items = shown
            .iter()
            .map(log_to_list_item)
            .collect::<Vec<LogListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_log_lines(shown) {
            println!("{line}");
        }
    }

    Ok(())
}
