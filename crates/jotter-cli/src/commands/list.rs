use crate::commands::common::{format_note_lines, note_to_list_item, CliContext, NoteListItem};
use crate::error::CliError;

pub fn run_list(limit: usize, as_json: bool, ctx: &CliContext) -> Result<(), CliError> {
    let service = ctx.open_service()?;
    let mut notes = service.list_notes()?;
    notes.truncate(limit);

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
