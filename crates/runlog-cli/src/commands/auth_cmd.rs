use runlog_core::auth::{AuthClient, AuthSession, Registration, SessionPersistence};

use crate::cli::AuthCommands;
use crate::commands::common::{open_app, sync_and_report, GlobalOptions};
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;
use crate::session_store::KeyringSessionStore;

pub async fn run_auth(command: AuthCommands, options: &GlobalOptions) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(options.profile.as_deref());
    let store = KeyringSessionStore::for_profile(&profile_name);

    match command {
        AuthCommands::Login { email, password } => {
            let client = auth_client(&config, &profile_name, store)?;
            let session = client.login(&email, &password).await?;
            println!("Signed in profile '{profile_name}' as {}", session.email);
            sync_after_sign_in(options).await
        }
        AuthCommands::Register {
            email,
            password,
            first_name,
            last_name,
        } => {
            let client = auth_client(&config, &profile_name, store)?;
            let session = client
                .register(&Registration {
                    email,
                    password,
                    first_name,
                    last_name,
                })
                .await?;
            println!(
                "Registered {} and signed in profile '{profile_name}'",
                session.email
            );
            sync_after_sign_in(options).await
        }
        AuthCommands::Logout => {
            store.clear_session()?;
            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
        AuthCommands::Status => {
            match store.load_session()? {
                Some(session) => println!("{}", describe_session(&profile_name, &session)),
                None => println!("Profile '{profile_name}' is not signed in."),
            }
            Ok(())
        }
    }
}

fn auth_client(
    config: &CliProfilesConfig,
    profile_name: &str,
    store: KeyringSessionStore,
) -> Result<AuthClient<KeyringSessionStore>, CliError> {
    let client_config = config
        .client_config(profile_name)
        .map_err(CliError::Config)?;
    Ok(AuthClient::new(client_config, store)?)
}

/// Pull the account's runs and push anything logged while signed out
async fn sync_after_sign_in(options: &GlobalOptions) -> Result<(), CliError> {
    if options.offline {
        return Ok(());
    }
    let app = open_app(options)?;
    sync_and_report(&app).await;
    Ok(())
}

pub fn describe_session(profile_name: &str, session: &AuthSession) -> String {
    let name = session.display_name();
    if name == session.email {
        format!("Profile '{profile_name}' is signed in as {}", session.email)
    } else {
        format!(
            "Profile '{profile_name}' is signed in as {name} <{}>",
            session.email
        )
    }
}
