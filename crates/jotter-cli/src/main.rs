//! Jotter CLI - local-first notes from the command line
//!
//! Notes are written to the local database immediately; `jotter sync` and
//! `jotter watch` reconcile them with the configured server.

mod cli;
mod commands;
mod error;

#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};
use tracing_subscriber::filter::{Directive, LevelFilter};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::attach::run_attach;
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::run_list;
use crate::commands::pending::run_pending;
use crate::commands::show::run_show;
use crate::commands::sync::{run_sync, run_sync_conflicts};
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let command = match cli.command {
        Some(command) => command,
        None if cli.note.is_empty() => {
            Cli::command().print_help()?;
            return Ok(());
        }
        None => Commands::Add {
            title: None,
            content: cli.note,
        },
    };

    let context = || CliContext::load(cli.db_path.clone(), cli.config.clone());
    match command {
        Commands::Add { title, content } => run_add(title.as_deref(), &content, &context()?),
        Commands::List { limit, json } => run_list(limit, json, &context()?),
        Commands::Show { id, json } => run_show(&id, json, &context()?),
        Commands::Edit { id, title, content } => {
            run_edit(&id, title.as_deref(), content.as_deref(), &context()?)
        }
        Commands::Attach { id, reference } => run_attach(&id, &reference, &context()?),
        Commands::Delete { id } => run_delete(&id, &context()?),
        Commands::Pending { json } => run_pending(json, &context()?),
        Commands::Sync { command, json } => match command {
            Some(SyncCommands::Conflicts { limit, json }) => {
                run_sync_conflicts(limit, json, &context()?)
            }
            None => run_sync(json, &context()?).await,
        },
        Commands::Watch => run_watch(&context()?).await,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let filter = match "jotter=info".parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
