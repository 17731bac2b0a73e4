use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;
use jotter_core::config::AppConfig;
use jotter_core::models::{ChangeLogEntry, ChangeOperation, SyncConflict};
use jotter_core::sync::SyncReport;
use jotter_core::{Note, NoteEvent, NoteId, NotePatch};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use crate::cli::{Cli, Commands, SyncCommands};
use crate::commands::add::run_add;
use crate::commands::attach::run_attach;
use crate::commands::common::{
    format_event, format_note_detail, format_pending_lines, format_relative_time,
    format_sync_conflict_lines, format_sync_report, format_sync_timestamp, normalize_content,
    normalize_note_identifier, note_preview, pending_to_item, resolve_db_path, resolve_note,
    CliContext,
};
use crate::commands::completions::{render_completions, run_completions};
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::sync::{run_sync, run_sync_conflicts};
use crate::error::CliError;

fn temp_context() -> (TempDir, CliContext) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("jotter.db");
    (dir, CliContext::new(db_path, AppConfig::default()))
}

fn pending_entry(local_seq: i64, attempts: u32) -> ChangeLogEntry {
    ChangeLogEntry {
        local_seq,
        note_id: "11111111-1111-7111-8111-111111111111".parse().unwrap(),
        operation: ChangeOperation::Update,
        payload: NotePatch::default().title("Groceries"),
        version: 3,
        attempts,
        created_at: chrono::Utc::now().timestamp_millis(),
    }
}

#[test]
fn format_relative_time_units() {
    let now = 1_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 3_600_000, now), "3h ago");
    assert_eq!(format_relative_time(now - 2 * 86_400_000, now), "2d ago");
    assert_eq!(format_relative_time(now - 14 * 86_400_000, now), "2w ago");
    assert_eq!(format_relative_time(now - 60 * 86_400_000, now), "2mo ago");
    assert_eq!(format_relative_time(now - 800 * 86_400_000, now), "2y ago");
    assert_eq!(format_relative_time(now + 5_000, now), "just now");
}

#[test]
fn normalize_content_trims_and_rejects_empty() {
    assert_eq!(normalize_content("  hello \n"), Some("hello".to_string()));
    assert_eq!(normalize_content(" \n\t "), None);
}

#[test]
fn normalize_note_identifier_rejects_blank() {
    assert_eq!(normalize_note_identifier(" abc ").unwrap(), "abc");
    assert!(matches!(
        normalize_note_identifier("   "),
        Err(CliError::EmptyNoteId)
    ));
}

#[test]
fn note_preview_truncates_with_ellipsis() {
    let note = Note::new("", "This is a very long sentence that should be shortened");
    assert_eq!(note_preview(&note, 20), "This is a very lo...");
}

#[test]
fn note_preview_prefers_title_and_collapses_whitespace() {
    let note = Note::new("  Weekly   plan ", "ignored body");
    assert_eq!(note_preview(&note, 40), "Weekly plan");
}

#[test]
fn format_note_detail_lists_fields_and_body() {
    let mut note = Note::new("Trip", "Pack bags\nBook taxi");
    note.picture = Some("https://img.example.com/map.png".to_string());

    let lines = format_note_detail(&note, 2);
    assert!(lines.iter().any(|line| line == "title:    Trip"));
    assert!(lines.iter().any(|line| line.contains("map.png")));
    assert!(lines.iter().any(|line| line == "pending:  2 unsynced change(s)"));
    assert_eq!(lines.last().map(String::as_str), Some("Book taxi"));
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn format_sync_conflict_lines_include_key_fields() {
    let conflicts = vec![
        SyncConflict {
            id: 1,
            note_id: "11111111-1111-7111-8111-111111111111".to_string(),
            local_version: 5,
            remote_version: 6,
            resolved_at: 300,
            strategy: "server-wins".to_string(),
        },
        SyncConflict {
            id: 2,
            note_id: "22222222-2222-7222-8222-222222222222".to_string(),
            local_version: 2,
            remote_version: 0,
            resolved_at: 400,
            strategy: "server-wins".to_string(),
        },
    ];

    let rendered = format_sync_conflict_lines(&conflicts);
    assert_eq!(rendered.len(), 2);
    assert!(rendered[0].contains("server-wins"));
    assert!(rendered[0].contains("note=11111111-1111-7111-8111-111111111111"));
    assert!(rendered[0].contains("local=v5 remote=v6"));
    assert!(rendered[1].contains("remote=deleted"));
}

#[test]
fn format_pending_lines_flag_stalled_entries() {
    let entries = vec![pending_entry(1, 0), pending_entry(2, 5)];

    let rendered = format_pending_lines(&entries, 5);
    assert!(rendered[0].starts_with("#1"));
    assert!(rendered[0].contains("update"));
    assert!(!rendered[0].contains("(stalled)"));
    assert!(rendered[1].ends_with("(stalled)"));

    assert!(pending_to_item(&entries[1], 5).stalled);
    assert!(!pending_to_item(&entries[1], 6).stalled);
}

#[test]
fn format_sync_report_summarizes_outcome() {
    assert_eq!(
        format_sync_report(&SyncReport::default()),
        "synced: pushed 0"
    );

    let paused = SyncReport {
        paused: true,
        ..SyncReport::default()
    };
    assert_eq!(
        format_sync_report(&paused),
        "offline: sync paused, no valid session"
    );

    let busy = SyncReport {
        pushed: 2,
        pulled: Some(7),
        conflicts: 1,
        remaining: 3,
        ..SyncReport::default()
    };
    assert_eq!(
        format_sync_report(&busy),
        "syncing: pushed 2, pulled 7, 1 conflict(s) resolved by server, 3 pending"
    );
}

#[test]
fn format_event_describes_conflicts_and_stalls() {
    let note_id: NoteId = "11111111-1111-7111-8111-111111111111".parse().unwrap();

    let replaced = format_event(&NoteEvent::ConflictResolved {
        note_id,
        local_version: 3,
        remote_version: Some(5),
    });
    assert!(replaced.contains("replaced by server v5"));

    let deleted = format_event(&NoteEvent::ConflictResolved {
        note_id,
        local_version: 3,
        remote_version: None,
    });
    assert!(deleted.contains("deleted on server"));

    let stalled = format_event(&NoteEvent::SyncStalled {
        note_id,
        local_seq: 9,
        attempts: 5,
    });
    assert!(stalled.contains("change=#9 after 5 attempts"));

    assert!(format_event(&NoteEvent::SessionLost).contains("JOTTER_SESSION_TOKEN"));
}

#[test]
fn resolve_db_path_prefers_flag_then_config() {
    let config = AppConfig {
        database_path: Some(PathBuf::from("/from/config.db")),
        ..AppConfig::default()
    };

    assert_eq!(
        resolve_db_path(Some(PathBuf::from("/from/flag.db")), &config).unwrap(),
        PathBuf::from("/from/flag.db")
    );
    assert_eq!(
        resolve_db_path(None, &config).unwrap(),
        PathBuf::from("/from/config.db")
    );
}

#[test]
fn cli_parses_sync_conflicts_and_quick_capture() {
    let cli = Cli::try_parse_from(["jotter", "sync", "conflicts", "--limit", "5"]).unwrap();
    assert!(matches!(
        cli.command,
        Some(Commands::Sync {
            command: Some(SyncCommands::Conflicts { limit: 5, json: false }),
            json: false,
        })
    ));

    let cli = Cli::try_parse_from(["jotter", "buy", "milk"]).unwrap();
    assert!(cli.command.is_none());
    assert_eq!(cli.note, vec!["buy".to_string(), "milk".to_string()]);
}

#[test]
fn run_add_creates_titled_note_in_fresh_directory() {
    let (_dir, ctx) = temp_context();

    run_add(Some("  Groceries "), &["Milk,".to_string(), "Eggs".to_string()], &ctx).unwrap();

    let service = ctx.open_service().unwrap();
    let notes = service.list_notes().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Groceries");
    assert_eq!(notes[0].content, "Milk, Eggs");
    assert_eq!(service.pending_changes().unwrap().len(), 1);
}

#[test]
fn run_edit_and_attach_update_the_resolved_note() {
    let (_dir, ctx) = temp_context();
    let note = ctx
        .open_service()
        .unwrap()
        .create_note("Draft", "first")
        .unwrap();
    let id = note.id.to_string();

    run_edit(&id, Some("Final"), None, &ctx).unwrap();
    run_attach(&id, " https://img.example.com/a.png ", &ctx).unwrap();

    let service = ctx.open_service().unwrap();
    let updated = service.get_note(&note.id).unwrap();
    assert_eq!(updated.title, "Final");
    assert_eq!(updated.content, "first");
    assert_eq!(
        updated.picture.as_deref(),
        Some("https://img.example.com/a.png")
    );
    assert_eq!(updated.version, 3);
}

#[test]
fn run_edit_without_changes_keeps_the_version() {
    let (_dir, ctx) = temp_context();
    let note = ctx
        .open_service()
        .unwrap()
        .create_note("Same", "body")
        .unwrap();

    run_edit(&note.id.to_string(), Some("Same"), None, &ctx).unwrap();

    let service = ctx.open_service().unwrap();
    assert_eq!(service.get_note(&note.id).unwrap().version, 1);
}

#[test]
fn run_delete_removes_note_by_exact_and_prefix_id() {
    let (_dir, ctx) = temp_context();
    let service = ctx.open_service().unwrap();
    let note_a = service.create_note("Keep me", "").unwrap();
    let note_b = service.create_note("Delete me", "").unwrap();
    drop(service);

    let prefix = note_b.id.to_string()[..32].to_string();
    run_delete(&prefix, &ctx).unwrap();

    let service = ctx.open_service().unwrap();
    assert!(service.get_note(&note_b.id).is_err());
    assert!(service.get_note(&note_a.id).is_ok());

    run_delete(&note_a.id.to_string(), &ctx).unwrap();
    assert!(ctx.open_service().unwrap().list_notes().unwrap().is_empty());
}

#[test]
fn resolve_note_reports_missing_and_empty_ids() {
    let (_dir, ctx) = temp_context();
    let service = ctx.open_service().unwrap();

    assert!(matches!(
        resolve_note(&service, "  "),
        Err(CliError::EmptyNoteId)
    ));
    assert!(matches!(
        resolve_note(&service, "ffffffff"),
        Err(CliError::NoteNotFound(query)) if query == "ffffffff"
    ));
    assert!(matches!(
        resolve_note(&service, "11111111-1111-7111-8111-111111111111"),
        Err(CliError::NoteNotFound(_))
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn run_sync_requires_sync_configuration() {
    let (_dir, ctx) = temp_context();

    let error = run_sync(false, &ctx).await.unwrap_err();
    assert!(matches!(error, CliError::SyncNotConfigured));
}

#[test]
fn run_sync_conflicts_works_without_remote() {
    let (_dir, ctx) = temp_context();
    run_sync_conflicts(10, true, &ctx).unwrap();
}

#[test]
fn run_completions_writes_bash_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("jotter.bash");

    run_completions(Shell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_jotter()"));
    assert!(script.contains("complete -F _jotter"));
}

#[test]
fn completions_cover_sync_subcommands() {
    let script = String::from_utf8(render_completions(Shell::Fish)).unwrap();
    assert!(script.contains("conflicts"));
    assert!(script.contains("watch"));
}
