use crate::commands::common::{
    format_sync_conflict_lines, format_sync_report, sync_conflict_to_item, CliContext,
    SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(as_json: bool, ctx: &CliContext) -> Result<(), CliError> {
    let (remote, session) = ctx.remote()?;
    let service = ctx.open_service()?;
    let engine = service.sync_engine(remote, session, ctx.config.sync.clone());

    let report = engine.run_full_cycle().await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_sync_report(&report));
    }
    Ok(())
}

pub fn run_sync_conflicts(limit: usize, as_json: bool, ctx: &CliContext) -> Result<(), CliError> {
    let service = ctx.open_service()?;
    let conflicts = service.list_conflicts(limit)?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
