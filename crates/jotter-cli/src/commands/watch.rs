use tokio::sync::broadcast::error::RecvError;

use crate::commands::common::{format_event, CliContext};
use crate::error::CliError;

/// Run the background worker and print its events until Ctrl-C.
pub async fn run_watch(ctx: &CliContext) -> Result<(), CliError> {
    let (remote, session) = ctx.remote()?;
    let service = ctx.open_service()?;
    let mut events = service.subscribe();
    let handle = service.spawn_sync(remote, session, ctx.config.sync.clone());

    eprintln!("Watching for changes; press Ctrl-C to stop");
    let outcome = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => break signal.map_err(CliError::from),
            event = events.recv() => match event {
                Ok(event) => println!("{}", format_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {skipped} sync events");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    handle.shutdown().await;
    outcome
}
