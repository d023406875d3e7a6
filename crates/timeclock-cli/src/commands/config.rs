use std::env;
use std::path::PathBuf;

use timeclock_core::config::{ENV_DATABASE_URL, ENV_SUPABASE_ANON_KEY, ENV_SUPABASE_URL};
use timeclock_core::util::normalize_text_option;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            supabase_url,
            supabase_anon_key,
            database_url,
            database_path,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileUpdate {
                supabase_url,
                supabase_anon_key,
                database_url,
                database_path,
            },
            no_activate,
        ),
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

/// Values given on the command line for `config init`
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub database_url: Option<String>,
    pub database_path: Option<PathBuf>,
}

pub fn run_config_init(
    profile_name: Option<&str>,
    update: ProfileUpdate,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();
    let merged = merge_profile(existing, update, |name| env::var(name).ok());
    merged.validate().map_err(CliError::Config)?;

    *config.profile_mut_or_default(&profile_name) = merged;
    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );
    if let Some(profile) = config.profile(&profile_name) {
        print_profile(profile);
    }
    Ok(())
}

pub fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let active = config.active_profile.as_deref() == Some(profile_name.as_str());

    match config.profile(&profile_name) {
        Some(profile) => {
            println!(
                "Profile '{profile_name}'{}",
                if active { " (active)" } else { "" }
            );
            print_profile(profile);
        }
        None => println!("Profile '{profile_name}' is not configured."),
    }
    Ok(())
}

/// Explicit values win, then the environment, then what the profile already had.
pub fn merge_profile(
    existing: CliProfile,
    update: ProfileUpdate,
    lookup: impl Fn(&str) -> Option<String>,
) -> CliProfile {
    CliProfile {
        supabase_url: normalize_text_option(update.supabase_url)
            .or_else(|| normalize_text_option(lookup(ENV_SUPABASE_URL)))
            .or_else(|| existing.supabase_url()),
        supabase_anon_key: normalize_text_option(update.supabase_anon_key)
            .or_else(|| normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY)))
            .or_else(|| existing.supabase_anon_key()),
        database_url: normalize_text_option(update.database_url)
            .or_else(|| normalize_text_option(lookup(ENV_DATABASE_URL)))
            .or_else(|| existing.database_url()),
        database_path: update.database_path.or(existing.database_path),
    }
}

fn print_profile(profile: &CliProfile) {
    println!(
        "  supabase_url: {}",
        profile.supabase_url().as_deref().unwrap_or("(not set)")
    );
    println!(
        "  supabase_anon_key: {}",
        if profile.supabase_anon_key().is_some() {
            "(set)"
        } else {
            "(not set)"
        }
    );
    println!(
        "  database_url: {}",
        profile.database_url().as_deref().unwrap_or("(not set)")
    );
    println!(
        "  database_path: {}",
        profile
            .database_path
            .as_ref()
            .map_or_else(|| "(default)".to_string(), |path| path.display().to_string())
    );
}
