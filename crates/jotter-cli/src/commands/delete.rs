use crate::commands::common::{resolve_note, CliContext};
use crate::error::CliError;

pub fn run_delete(id: &str, ctx: &CliContext) -> Result<(), CliError> {
    let service = ctx.open_service()?;
    let note = resolve_note(&service, id)?;

    service.delete_note(&note.id)?;
    println!("{}", note.id);
    Ok(())
}
