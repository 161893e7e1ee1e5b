use runlog_core::remote::RemoteError;
use runlog_core::sync::SyncEvent;

use crate::commands::common::{normalize_run_identifier, open_app, resolve_run, GlobalOptions};
use crate::error::CliError;

pub async fn run_delete(id: &str, options: &GlobalOptions) -> Result<(), CliError> {
    let query = normalize_run_identifier(id)?;
    let app = open_app(options)?;
    let run = resolve_run(&query, &app.engine.runs().await?)?;

    let mut events = app.engine.subscribe();
    let outcome = app.engine.delete_record(&run.id, &app.context).await?;
    println!("{}", run.id);

    // Drain the background delete before the process exits
    app.engine.wait_for_background().await;
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::RemoteDeleteFailed { id, error } = event {
            if error == RemoteError::NotFound {
                continue;
            }
            eprintln!("Removed locally; server delete of {id} failed: {error}");
        }
    }

    if outcome.tombstoned && !outcome.remote_attempted {
        println!("It will be removed from the server on the next sync.");
    }
    Ok(())
}
