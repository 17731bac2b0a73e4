use crate::commands::common::{resolve_note, CliContext};
use crate::error::CliError;

pub fn run_attach(id: &str, reference: &str, ctx: &CliContext) -> Result<(), CliError> {
    let service = ctx.open_service()?;
    let note = resolve_note(&service, id)?;

    let updated = service.attach_picture(&note.id, reference)?;
    println!("{}", updated.id);
    Ok(())
}
