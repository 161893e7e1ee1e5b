use crate::commands::common::{
    format_run_lines, open_app, run_to_list_item, GlobalOptions, RunListItem,
};
use crate::error::CliError;

pub async fn run_list(limit: usize, as_json: bool, options: &GlobalOptions) -> Result<(), CliError> {
    let app = open_app(options)?;
    let runs = app
        .engine
        .runs()
        .await?
        .into_iter()
        .take(limit)
        .collect::<Vec<_>>();

    if as_json {
        let json_items = runs
            .iter()
            .map(run_to_list_item)
            .collect::<Vec<RunListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if runs.is_empty() {
        println!("No runs logged yet.");
    } else {
        for line in format_run_lines(&runs) {
            println!("{line}");
        }
    }

    Ok(())
}
