use crate::commands::common::{format_pending_lines, pending_to_item, CliContext, PendingItem};
use crate::error::CliError;

pub fn run_pending(as_json: bool, ctx: &CliContext) -> Result<(), CliError> {
    let service = ctx.open_service()?;
    let entries = service.pending_changes()?;
    let retry_ceiling = ctx.config.sync.retry_ceiling;

    if as_json {
        let json_items = entries
            .iter()
            .map(|entry| pending_to_item(entry, retry_ceiling))
            .collect::<Vec<PendingItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if entries.is_empty() {
        println!("Everything is synced");
    } else {
        for line in format_pending_lines(&entries, retry_ceiling) {
            println!("{line}");
        }
    }

    Ok(())
}
