use crate::auth::{
    clear_stored_session, load_stored_session, provider_for_profile, ProfileAuthProvider,
};
use crate::cli::AuthCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        AuthCommands::Login {
            profile,
            email,
            password,
        } => {
            let config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let profile_config = config.profile(&profile_name).ok_or_else(|| {
                CliError::Config(format!(
                    "Profile '{profile_name}' is not configured. Run `timeclock config init --profile {profile_name}` first."
                ))
            })?;
            let provider = provider_for(&profile_name, profile_config)?.ok_or_else(|| {
                CliError::Config(format!(
                    "Profile '{profile_name}' missing Supabase auth config. Set SUPABASE_URL and SUPABASE_ANON_KEY via `timeclock config init`."
                ))
            })?;
            let session = provider
                .sign_in(&email, &password)
                .await
                .map_err(|error| CliError::Auth(error.to_string()))?;
            let email_label = session.user.email.as_deref().unwrap_or("(no email)");
            println!(
                "Signed in profile '{profile_name}' as {email_label} (uid {})",
                session.user.id
            );
            Ok(())
        }
        AuthCommands::Status { profile } => {
            let config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));
            let Some(profile) = config.profile(&profile_name) else {
                println!("Profile '{profile_name}' is not configured.");
                return Ok(());
            };

            let session = if let Some(provider) = provider_for(&profile_name, profile)? {
                provider
                    .restore_session()
                    .await
                    .map_err(|error| CliError::Auth(error.to_string()))?
            } else {
                load_stored_session(&profile_name)
                    .map_err(|error| CliError::Auth(error.to_string()))?
            };

            if let Some(session) = session {
                let email_label = session.user.email.as_deref().unwrap_or("(no email)");
                println!(
                    "Profile '{}' is signed in as {} (uid {}, expires_at={})",
                    profile_name, email_label, session.user.id, session.expires_at
                );
            } else {
                println!("Profile '{profile_name}' is not signed in.");
            }
            Ok(())
        }
        AuthCommands::Logout { profile } => {
            let config = CliProfilesConfig::load().map_err(CliError::Config)?;
            let profile_name = config.resolve_profile_name(profile.as_deref().or(global_profile));

            let provider = match config.profile(&profile_name) {
                Some(profile) => provider_for(&profile_name, profile)?,
                None => None,
            };

            if let Some(provider) = provider {
                // Expired sessions are refreshed first so the revoke can authenticate.
                provider
                    .restore_session()
                    .await
                    .map_err(|error| CliError::Auth(error.to_string()))?;
                provider
                    .sign_out()
                    .await
                    .map_err(|error| CliError::Auth(error.to_string()))?;
            } else {
                clear_stored_session(&profile_name)
                    .map_err(|error| CliError::Auth(error.to_string()))?;
            }

            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
    }
}

fn provider_for(
    profile_name: &str,
    profile: &CliProfile,
) -> Result<Option<ProfileAuthProvider>, CliError> {
    let client = profile.client_config().with_env_overrides();
    provider_for_profile(profile_name, &client)
}
