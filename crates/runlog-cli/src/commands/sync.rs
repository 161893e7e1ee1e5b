use crate::commands::common::{format_sync_report, open_app, GlobalOptions};
use crate::error::CliError;

pub async fn run_sync(options: &GlobalOptions) -> Result<(), CliError> {
    let app = open_app(options)?;
    if !app.context.is_online() {
        return Err(CliError::Offline);
    }
    if !app.context.is_authenticated() {
        return Err(CliError::NotSignedIn);
    }

    let report = app
        .engine
        .full_sync(&app.context)
        .await
        .map_err(|error| {
            if error.is_unauthorized() {
                CliError::SessionExpired
            } else {
                error.into()
            }
        })?;

    for line in format_sync_report(&report) {
        println!("{line}");
    }
    Ok(())
}
