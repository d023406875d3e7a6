//! Timeclock CLI - Time-In / Time-Out punches from the terminal
//!
//! Each data command mounts a session for the signed-in user, waits for the
//! user's log to load, and acts on it.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;


use clap::{CommandFactory, Parser};
use timeclock_core::LogKind;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::common::CommandContext;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::log::run_log;
use crate::commands::punch::run_punch;
use crate::commands::users::run_users;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "timeclock=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();

    match cli.command {
        Some(Commands::TimeIn) => {
            let context = CommandContext::resolve(profile, cli.db_path, cli.uid)?;
            run_punch(LogKind::In, &context).await?;
        }
        Some(Commands::TimeOut) => {
            let context = CommandContext::resolve(profile, cli.db_path, cli.uid)?;
            run_punch(LogKind::Out, &context).await?;
        }
        Some(Commands::Log { limit, json }) => {
            let context = CommandContext::resolve(profile, cli.db_path, cli.uid)?;
            run_log(limit, json, &context).await?;
        }
        Some(Commands::Users { command }) => {
            let context = CommandContext::resolve(profile, cli.db_path, cli.uid)?;
            run_users(command, &context).await?;
        }
        Some(Commands::Config { command }) => run_config(command, profile)?,
        Some(Commands::Auth { command }) => run_auth(command, profile).await?,
        Some(Commands::Completions { shell, output }) => {
            run_completions(shell, output.as_deref())?;
        }
        None => {
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
