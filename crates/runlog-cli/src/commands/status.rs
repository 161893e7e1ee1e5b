use crate::commands::common::{format_timestamp, open_app, GlobalOptions};
use crate::error::CliError;

pub async fn run_status(options: &GlobalOptions) -> Result<(), CliError> {
    let app = open_app(options)?;
    let summary = app.engine.summary().await?;

    match &app.session {
        Some(session) => println!(
            "Profile:    {} (signed in as {})",
            app.profile_name, session.email
        ),
        None => println!("Profile:    {} (not signed in)", app.profile_name),
    }
    println!("Server:     {}", app.api_base_url);
    println!("Database:   {}", app.db_path.display());
    println!(
        "Runs:       {} ({} pending upload, {} synced)",
        summary.total, summary.pending, summary.synced
    );
    println!("Deletes:    {} waiting for the server", summary.tombstones.len());
    for tombstone in summary.tombstones.iter().filter(|tombstone| tombstone.attempts > 0) {
        println!(
            "  {}  {} attempt(s), last error: {}",
            tombstone.id,
            tombstone.attempts,
            tombstone.last_error.as_deref().unwrap_or("unknown")
        );
    }
    println!(
        "Last sync:  {}",
        summary
            .last_sync_at
            .map_or_else(|| "never".to_string(), format_timestamp)
    );
    Ok(())
}
