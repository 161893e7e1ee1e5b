use std::env;

use runlog_core::config::{normalize_base_url, normalize_text_option};
use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::commands::common::{resolve_db_path, GlobalOptions};
use crate::config_profiles::{default_config_path, CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, options: &GlobalOptions) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_url,
            timeout_secs,
            no_activate,
        } => run_config_init(options, api_url, timeout_secs, no_activate),
        ConfigCommands::Show => run_config_show(options),
    }
}

pub fn run_config_init(
    options: &GlobalOptions,
    api_url: Option<String>,
    timeout_secs: Option<u64>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(options.profile.as_deref());
    let existing_profile = config.profile(&profile_name).cloned().unwrap_or_default();

    let profile = merge_profile(
        &existing_profile,
        normalize_text_option(api_url)
            .or_else(|| normalize_text_option(env::var("RUNLOG_API_URL").ok())),
        timeout_secs,
    )?;
    *config.profile_mut_or_default(&profile_name) = profile;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );
    println!("Run `runlog auth login --email <email> --password <password>` to enable sync.");
    Ok(())
}

/// Apply explicit values over an existing profile, validating the URL
pub fn merge_profile(
    existing: &CliProfile,
    api_url: Option<String>,
    timeout_secs: Option<u64>,
) -> Result<CliProfile, CliError> {
    let api_base_url = api_url
        .or_else(|| existing.api_base_url.clone())
        .map(normalize_base_url)
        .transpose()
        .map_err(|error| CliError::Config(error.to_string()))?;

    let request_timeout_secs = match timeout_secs {
        Some(0) => {
            return Err(CliError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ))
        }
        Some(secs) => Some(secs),
        None => existing.request_timeout_secs,
    };

    Ok(CliProfile {
        api_base_url,
        request_timeout_secs,
    })
}

#[derive(Debug, Serialize)]
struct ResolvedConfig {
    config_path: String,
    profile: String,
    api_base_url: String,
    request_timeout_secs: u64,
    db_path: String,
}

fn run_config_show(options: &GlobalOptions) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(options.profile.as_deref());
    let client_config = config
        .client_config(&profile_name)
        .map_err(CliError::Config)?;

    let resolved = ResolvedConfig {
        config_path: default_config_path()
            .map_err(CliError::Config)?
            .display()
            .to_string(),
        api_base_url: client_config.api_base_url,
        request_timeout_secs: client_config.request_timeout.as_secs(),
        db_path: resolve_db_path(options.db_path.clone(), &profile_name)?
            .display()
            .to_string(),
        profile: profile_name,
    };
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}
