use chrono::Utc;
use runlog_core::Run;

use crate::commands::common::{format_pace, open_app, parse_run_date, GlobalOptions};
use crate::error::CliError;

pub async fn run_add(
    distance_km: f64,
    time_minutes: f64,
    date: Option<&str>,
    options: &GlobalOptions,
) -> Result<(), CliError> {
    let date = parse_run_date(date, Utc::now())?;
    let candidate = Run::new(date, distance_km, time_minutes)?;

    let app = open_app(options)?;
    let outcome = app.engine.save_record(candidate, &app.context).await?;

    if outcome.deduplicated {
        println!("Already logged as {}", outcome.run.id);
        return Ok(());
    }

    println!(
        "{}  {:.2} km in {:.1} min ({} /km)",
        outcome.run.id,
        outcome.run.distance_km,
        outcome.run.time_minutes,
        format_pace(outcome.run.pace())
    );
    if let Some(error) = outcome.remote_error {
        eprintln!("Saved locally; upload failed: {error}");
        if error.is_unauthorized() {
            eprintln!("Run `runlog auth login` to sign in again.");
        } else if error.is_transient() {
            eprintln!("It will be uploaded on the next `runlog sync`.");
        }
    }
    Ok(())
}
