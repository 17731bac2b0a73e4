use crate::commands::common::{format_note_detail, resolve_note, CliContext};
use crate::error::CliError;

pub fn run_show(id: &str, as_json: bool, ctx: &CliContext) -> Result<(), CliError> {
    let service = ctx.open_service()?;
    let note = resolve_note(&service, id)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&note)?);
        return Ok(());
    }

    let pending = service
        .pending_changes()?
        .iter()
        .filter(|entry| entry.note_id == note.id)
        .count();
    for line in format_note_detail(&note, pending) {
        println!("{line}");
    }
    Ok(())
}
