use jotter_core::NotePatch;

use crate::commands::common::{capture_editor_input_with_initial, resolve_note, CliContext};
use crate::error::CliError;

pub fn run_edit(
    id: &str,
    title: Option<&str>,
    content: Option<&str>,
    ctx: &CliContext,
) -> Result<(), CliError> {
    let service = ctx.open_service()?;
    let note = resolve_note(&service, id)?;

    let mut patch = NotePatch::default();
    if let Some(title) = title {
        patch = patch.title(title.trim());
    }
    if let Some(content) = content {
        patch = patch.content(content.trim());
    }

    if patch.is_empty() {
        let Some(edited_content) = capture_editor_input_with_initial(&note.content)? else {
            return Err(CliError::EmptyEditedContent);
        };
        patch = patch.content(edited_content);
    }

    if !patch.changes(&note) {
        println!("{}", note.id);
        return Ok(());
    }

    let updated = service.update_note(&note.id, patch)?;
    println!("{}", updated.id);
    Ok(())
}
