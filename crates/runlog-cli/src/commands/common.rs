use std::env;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use runlog_core::auth::{AuthSession, SessionPersistence};
use runlog_core::db::Database;
use runlog_core::remote::HttpRunsClient;
use runlog_core::sync::FullSyncReport;
use runlog_core::{Run, RunId, SyncContext, SyncEngine};
use serde::Serialize;

use crate::config_profiles::{CliProfilesConfig, DEFAULT_PROFILE};
use crate::error::CliError;
use crate::session_store::KeyringSessionStore;

/// Flags shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub db_path: Option<PathBuf>,
    pub profile: Option<String>,
    pub offline: bool,
}

/// Everything a command needs, built once per invocation
pub struct App {
    pub engine: SyncEngine<Database, HttpRunsClient>,
    pub context: SyncContext,
    pub profile_name: String,
    pub session: Option<AuthSession>,
    pub api_base_url: String,
    pub db_path: PathBuf,
}

pub fn open_app(options: &GlobalOptions) -> Result<App, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(options.profile.as_deref());
    let client_config = config
        .client_config(&profile_name)
        .map_err(CliError::Config)?;
    let session = KeyringSessionStore::for_profile(&profile_name).load_session()?;

    let db_path = resolve_db_path(options.db_path.clone(), &profile_name)?;
    let database = Database::open(&db_path)?;
    tracing::debug!("Opened {} for profile '{profile_name}'", db_path.display());

    let api_base_url = client_config.api_base_url.clone();
    let remote = HttpRunsClient::new(client_config)?;
    let credential = session.as_ref().and_then(AuthSession::credential);

    Ok(App {
        engine: SyncEngine::new(database, remote),
        context: SyncContext::new(credential, !options.offline),
        profile_name,
        session,
        api_base_url,
        db_path,
    })
}

/// `--db-path`, then `RUNLOG_DB_PATH`, then a per-profile file in the data dir
pub fn resolve_db_path(cli_db_path: Option<PathBuf>, profile_name: &str) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("RUNLOG_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    let data_dir = dirs::data_dir()
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))?;
    Ok(data_dir.join("runlog").join(default_db_file_name(profile_name)))
}

pub fn default_db_file_name(profile_name: &str) -> String {
    if profile_name == DEFAULT_PROFILE {
        "runlog.db".to_string()
    } else {
        format!("runlog-{}.db", escape_file_component(profile_name))
    }
}

/// Keep ASCII alphanumerics and `-`; every other byte becomes `_xx` (hex),
/// so distinct profile names always map to distinct file names
pub fn escape_file_component(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            escaped.push(char::from(byte));
        } else {
            escaped.push_str(&format!("_{byte:02x}"));
        }
    }
    escaped
}

/// Accepts RFC 3339 timestamps or a bare `YYYY-MM-DD` (midnight UTC)
pub fn parse_run_date(raw: Option<&str>, now: DateTime<Utc>) -> Result<DateTime<Utc>, CliError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(now);
    };

    if let Ok(date_time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(date_time.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|date_time| date_time.and_utc())
        .ok_or_else(|| CliError::InvalidDate(raw.to_string()))
}

pub fn normalize_run_identifier(raw: &str) -> Result<String, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRunId)
    } else {
        Ok(trimmed.to_ascii_lowercase())
    }
}

/// Find a run by full id or unique id prefix
pub fn resolve_run(query: &str, runs: &[Run]) -> Result<Run, CliError> {
    if let Ok(id) = query.parse::<RunId>() {
        if let Some(run) = runs.iter().find(|run| run.id == id) {
            return Ok(run.clone());
        }
    }

    let matches: Vec<&Run> = runs
        .iter()
        .filter(|run| run.id.as_str().starts_with(query))
        .collect();

    match matches.as_slice() {
        [] => Err(CliError::RunNotFound(query.to_string())),
        [run] => Ok((*run).clone()),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|run| short_id(&run.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousRunId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

pub fn short_id(id: &RunId) -> String {
    id.as_str().chars().take(13).collect()
}

/// Minutes per kilometre as `m:ss`
pub fn format_pace(pace: f64) -> String {
    if !pace.is_finite() || pace <= 0.0 {
        return "-:--".to_string();
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total_seconds = (pace * 60.0).round() as u64;
    format!("{}:{:02}", total_seconds / 60, total_seconds % 60)
}

pub fn format_timestamp(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M UTC").to_string()
}

pub fn format_run_lines(runs: &[Run]) -> Vec<String> {
    runs.iter()
        .map(|run| {
            format!(
                "{:<13}  {}  {:>7.2} km  {:>7.1} min  {:>6} /km  {}",
                short_id(&run.id),
                format_timestamp(run.date),
                run.distance_km,
                run.time_minutes,
                format_pace(run.pace()),
                run.status
            )
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct RunListItem {
    pub id: String,
    pub date: String,
    pub distance_km: f64,
    pub time_minutes: f64,
    pub pace: f64,
    pub status: String,
}

pub fn run_to_list_item(run: &Run) -> RunListItem {
    RunListItem {
        id: run.id.to_string(),
        date: run.date.to_rfc3339(),
        distance_km: run.distance_km,
        time_minutes: run.time_minutes,
        pace: run.pace(),
        status: run.status.to_string(),
    }
}

pub fn format_sync_report(report: &FullSyncReport) -> Vec<String> {
    let mut lines = Vec::new();

    let deletes = &report.tombstones;
    if deletes.confirmed > 0 || !deletes.failed.is_empty() {
        lines.push(format!(
            "Deletes: {} sent, {} failed",
            deletes.confirmed,
            deletes.failed.len()
        ));
        for failure in &deletes.failed {
            lines.push(format!("  {}  {}", short_id(&failure.id), failure.error));
        }
    }

    let merge = &report.merge;
    lines.push(format!(
        "Download: {} on server, {} new, {} matched local runs, {} duplicates skipped",
        merge.fetched, merge.inserted, merge.absorbed, merge.remote_duplicates
    ));

    let upload = &report.upload;
    lines.push(format!(
        "Upload: {} uploaded, {} already on server, {} failed",
        upload.uploaded,
        upload.discarded_duplicates,
        upload.failed.len()
    ));
    for failure in &upload.failed {
        lines.push(format!("  {}  {}", short_id(&failure.id), failure.error));
    }

    lines
}

/// Full sync for commands that sync as a side effect; failures are printed, not raised
pub async fn sync_and_report(app: &App) {
    match app.engine.full_sync(&app.context).await {
        Ok(report) => {
            for line in format_sync_report(&report) {
                println!("{line}");
            }
        }
        Err(error) => eprintln!("Sync failed: {error}"),
    }
}
