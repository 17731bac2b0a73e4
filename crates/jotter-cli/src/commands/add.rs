use crate::commands::common::{normalize_content, read_piped_stdin, resolve_note_content, CliContext};
use crate::error::CliError;

pub fn run_add(
    title: Option<&str>,
    content_parts: &[String],
    ctx: &CliContext,
) -> Result<(), CliError> {
    let title = title.and_then(normalize_content);
    let content = match &title {
        // A titled note may have an empty body, so skip the editor fallback
        Some(_) => match normalize_content(&content_parts.join(" ")) {
            Some(content) => content,
            None => read_piped_stdin()?.unwrap_or_default(),
        },
        None => resolve_note_content(content_parts)?,
    };

    let service = ctx.open_service()?;
    let note = service.create_note(title.unwrap_or_default(), content)?;

    println!("{}", note.id);
    Ok(())
}
