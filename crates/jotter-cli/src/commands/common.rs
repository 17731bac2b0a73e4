use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use jotter_core::auth::{SessionProvider, StaticSession};
use jotter_core::config::{session_token_from_env, AppConfig};
use jotter_core::db::SharedDatabase;
use jotter_core::models::{ChangeLogEntry, SyncConflict};
use jotter_core::remote::{GraphQlRemote, RemoteApi};
use jotter_core::sync::SyncReport;
use jotter_core::{Note, NoteEvent, NoteService};
use serde::Serialize;

use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

/// Resolved database path and settings shared by every command
#[derive(Debug, Clone)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub config: AppConfig,
}

impl CliContext {
    pub const fn new(db_path: PathBuf, config: AppConfig) -> Self {
        Self { db_path, config }
    }

    /// Config file (explicit path or the default location), then `JOTTER_*`
    /// overrides, then `--db-path`.
    pub fn load(
        cli_db_path: Option<PathBuf>,
        cli_config_path: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let config = match cli_config_path.or_else(default_config_path) {
            Some(path) => AppConfig::load_from_path(&path)?,
            None => AppConfig::default(),
        }
        .apply_env()?;
        let db_path = resolve_db_path(cli_db_path, &config)?;
        Ok(Self::new(db_path, config))
    }

    pub fn open_service(&self) -> Result<NoteService, CliError> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = SharedDatabase::open(&self.db_path)?;
        Ok(NoteService::new(db))
    }

    /// GraphQL client plus the session it authenticates with.
    pub fn remote(&self) -> Result<(Arc<dyn RemoteApi>, Arc<dyn SessionProvider>), CliError> {
        let Some(endpoint) = self.config.remote.graphql_url.as_deref() else {
            return Err(CliError::SyncNotConfigured);
        };
        let token = session_token_from_env().ok_or(CliError::MissingSession)?;
        let session: Arc<dyn SessionProvider> = Arc::new(StaticSession::new(token));
        let remote: Arc<dyn RemoteApi> = Arc::new(GraphQlRemote::new(
            endpoint,
            self.config.remote.request_timeout(),
            Arc::clone(&session),
        )?);
        Ok((remote, session))
    }
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub picture: Option<String>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct PendingItem {
    pub local_seq: i64,
    pub note_id: String,
    pub operation: String,
    pub version: i64,
    pub attempts: u32,
    pub stalled: bool,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub note_id: String,
    pub local_version: i64,
    pub remote_version: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

/// Resolve a full id or unique prefix to a live note.
pub fn resolve_note(service: &NoteService, input: &str) -> Result<Note, CliError> {
    let query = normalize_note_identifier(input)?;
    let id = service
        .resolve_id(&query)
        .map_err(|error| CliError::from_lookup(&query, error))?;
    service
        .get_note(&id)
        .map_err(|error| CliError::from_lookup(&query, error))
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let short_id = short_id(&note.id.to_string());
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at, now_ms);

            if note.picture.is_some() {
                format!("{short_id:<13}  {preview:<40}  {relative_time:<10}  [picture]")
            } else {
                format!("{short_id:<13}  {preview:<40}  {relative_time}")
            }
        })
        .collect()
}

pub fn format_note_detail(note: &Note, pending: usize) -> Vec<String> {
    let mut lines = vec![
        format!("id:       {}", note.id),
        format!("title:    {}", note.title),
        format!("version:  {}", note.version),
        format!("created:  {}", format_sync_timestamp(note.created_at)),
        format!("updated:  {}", format_sync_timestamp(note.updated_at)),
    ];
    if let Some(picture) = &note.picture {
        lines.push(format!("picture:  {picture}"));
    }
    if pending > 0 {
        lines.push(format!("pending:  {pending} unsynced change(s)"));
    }
    if !note.content.is_empty() {
        lines.push(String::new());
        lines.extend(note.content.lines().map(str::to_string));
    }
    lines
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        picture: note.picture.clone(),
        version: note.version,
        created_at: note.created_at,
        updated_at: note.updated_at,
        relative_time: format_relative_time(note.updated_at, now_ms),
    }
}

pub fn pending_to_item(entry: &ChangeLogEntry, retry_ceiling: u32) -> PendingItem {
    PendingItem {
        local_seq: entry.local_seq,
        note_id: entry.note_id.to_string(),
        operation: entry.operation.as_str().to_string(),
        version: entry.version,
        attempts: entry.attempts,
        stalled: entry.attempts >= retry_ceiling,
        created_at: entry.created_at,
    }
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        note_id: conflict.note_id.clone(),
        local_version: conflict.local_version,
        remote_version: conflict.remote_version,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

/// Title (or first content line) with whitespace collapsed, truncated with an ellipsis.
pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let source = note.title_preview(usize::MAX);
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_pending_lines(entries: &[ChangeLogEntry], retry_ceiling: u32) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    entries
        .iter()
        .map(|entry| {
            let short_id = short_id(&entry.note_id.to_string());
            let relative_time = format_relative_time(entry.created_at, now_ms);
            let line = format!(
                "#{:<5} {:<6}  {short_id:<13}  v{:<4}  attempts={}  {relative_time}",
                entry.local_seq,
                entry.operation.as_str(),
                entry.version,
                entry.attempts
            );
            if entry.attempts >= retry_ceiling {
                format!("{line}  (stalled)")
            } else {
                line
            }
        })
        .collect()
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let remote = if conflict.remote_version == 0 {
                "deleted".to_string()
            } else {
                format!("v{}", conflict.remote_version)
            };
            format!(
                "{}  {}  note={}  local=v{} remote={remote}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.note_id,
                conflict.local_version,
            )
        })
        .collect()
}

/// One-line cycle summary, e.g. `synced: pushed 2, pulled 5`.
pub fn format_sync_report(report: &SyncReport) -> String {
    let state = report.state().as_str();
    if report.paused {
        return format!("{state}: sync paused, no valid session");
    }

    let mut parts = vec![format!("pushed {}", report.pushed)];
    if let Some(pulled) = report.pulled {
        parts.push(format!("pulled {pulled}"));
    }
    if report.conflicts > 0 {
        parts.push(format!("{} conflict(s) resolved by server", report.conflicts));
    }
    if report.purged > 0 {
        parts.push(format!("removed {}", report.purged));
    }
    if report.failed > 0 {
        parts.push(format!("{} failed", report.failed));
    }
    if report.remaining > 0 {
        parts.push(format!("{} pending", report.remaining));
    }
    if report.stalled > 0 {
        parts.push(format!("{} stalled", report.stalled));
    }
    if let Some(error) = &report.pull_error {
        parts.push(format!("pull failed: {error}"));
    }
    format!("{state}: {}", parts.join(", "))
}

pub fn format_event(event: &NoteEvent) -> String {
    match event {
        NoteEvent::NotesChanged => "notes changed".to_string(),
        NoteEvent::SyncStalled {
            note_id,
            local_seq,
            attempts,
        } => format!("stalled: note={note_id} change=#{local_seq} after {attempts} attempts"),
        NoteEvent::ConflictResolved {
            note_id,
            local_version,
            remote_version,
        } => match remote_version {
            Some(remote_version) => format!(
                "conflict: note={note_id} local=v{local_version} replaced by server v{remote_version}"
            ),
            None => format!("conflict: note={note_id} local=v{local_version} deleted on server"),
        },
        NoteEvent::CycleFinished(report) => format_sync_report(report),
        NoteEvent::SessionLost => {
            "session rejected by server; set a fresh JOTTER_SESSION_TOKEN".to_string()
        }
    }
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

/// Content from arguments, then piped stdin, then `$EDITOR`.
pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial("")? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let status = match Command::new(editor).arg(file_path).status() {
        Ok(status) => status,
        // `EDITOR="code --wait"` style values carry arguments
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut parts = editor.split_whitespace();
            let Some(program) = parts.next() else {
                return Err(CliError::EditorFailed("empty EDITOR command".into()));
            };
            Command::new(program).args(parts).arg(file_path).status()?
        }
        Err(err) => return Err(CliError::Io(err)),
    };

    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

pub fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("jotter-note-{}-{now}.md", std::process::id()))
}

/// `--db-path`, then the config's database path (already env-overridden), then the data dir.
pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    config: &AppConfig,
) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| config.database_path.clone()) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("jotter").join("jotter.db"))
        .ok_or(CliError::NoDataDir)
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("jotter").join("config.json"))
}
