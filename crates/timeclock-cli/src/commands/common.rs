use std::env;
use std::path::PathBuf;

use serde::Serialize;
use timeclock_core::config::ClientConfig;
use timeclock_core::store::LibSqlDocumentStore;
use timeclock_core::util::normalize_text_option;
use timeclock_core::auth::AuthListener;
use timeclock_core::{
    AttendanceLogStore, AuthProvider, AuthStateNotifier, Identity, LogEntry, SessionTracker,
    Subscription,
};

use crate::auth::{provider_for_profile, ProfileAuthProvider};
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

const DB_PATH_ENV: &str = "TIMECLOCK_DB_PATH";

/// Everything a data command needs, resolved from flags, profile and environment
#[derive(Clone)]
pub struct CommandContext {
    pub profile_name: String,
    pub client: ClientConfig,
    pub uid_override: Option<String>,
}

impl CommandContext {
    pub fn resolve(
        profile: Option<&str>,
        db_path: Option<PathBuf>,
        uid: Option<String>,
    ) -> Result<Self, CliError> {
        let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
        let profile_name = profiles.resolve_profile_name(profile);
        let mut client = profiles
            .profile(&profile_name)
            .map(CliProfile::client_config)
            .unwrap_or_default()
            .with_env_overrides();
        client.database_path = Some(resolve_db_path(db_path, client.database_path.take())?);

        Ok(Self {
            profile_name,
            client,
            uid_override: normalize_text_option(uid),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct LogListItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
    pub local_time: String,
}

/// `--db-path`, then `TIMECLOCK_DB_PATH`, then the profile's path, then the data dir default.
pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    profile_db_path: Option<PathBuf>,
) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path {
        return Ok(path);
    }
    if let Some(path) = env::var_os(DB_PATH_ENV).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    if let Some(path) = profile_db_path {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("timeclock").join("timeclock.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))
}

pub async fn open_document_store(client: &ClientConfig) -> Result<LibSqlDocumentStore, CliError> {
    let store = LibSqlDocumentStore::open(client.database()).await?;
    Ok(store)
}

/// Where a data command's signed-in identity comes from
pub enum SessionAuth {
    /// `--uid`: a fixed identity, already signed in
    Fixed(AuthStateNotifier),
    /// The profile's restored Supabase session
    Supabase(ProfileAuthProvider),
}

impl SessionAuth {
    pub fn identity(&self) -> Option<Identity> {
        match self {
            Self::Fixed(notifier) => notifier.current(),
            Self::Supabase(provider) => provider.current_identity(),
        }
    }
}

impl AuthProvider for SessionAuth {
    fn subscribe(&self, listener: AuthListener) -> Subscription {
        match self {
            Self::Fixed(notifier) => notifier.subscribe(listener),
            Self::Supabase(provider) => provider.subscribe(listener),
        }
    }
}

/// Auth for data commands: `--uid` when given, otherwise the stored Supabase session.
pub async fn resolve_auth(context: &CommandContext) -> Result<SessionAuth, CliError> {
    if let Some(uid) = &context.uid_override {
        return Ok(fixed_auth(Identity::new(uid.clone())?));
    }

    let provider = provider_for_profile(&context.profile_name, &context.client)?
        .ok_or(CliError::NotSignedIn)?;
    provider
        .restore_session()
        .await
        .map_err(|error| CliError::Auth(error.to_string()))?
        .ok_or(CliError::NotSignedIn)?;
    Ok(SessionAuth::Supabase(provider))
}

fn fixed_auth(identity: Identity) -> SessionAuth {
    let notifier = AuthStateNotifier::new();
    notifier.sign_in(identity);
    SessionAuth::Fixed(notifier)
}

/// A tracker mounted on the command's auth with its initial fetch applied
pub struct OpenSession {
    pub tracker: SessionTracker<LibSqlDocumentStore>,
    pub auth: SessionAuth,
}

impl OpenSession {
    pub fn close(self) {
        let Self { tracker, auth } = self;
        tracker.unmount();
        if let Some(identity) = auth.identity() {
            tracing::debug!("Closed session for {}", identity.label());
        }
    }
}

pub async fn open_session(context: &CommandContext) -> Result<OpenSession, CliError> {
    let auth = resolve_auth(context).await?;
    let documents = open_document_store(&context.client).await?;
    mount_session(auth, AttendanceLogStore::new(documents)).await
}

pub async fn open_session_with(
    identity: Identity,
    store: AttendanceLogStore<LibSqlDocumentStore>,
) -> Result<OpenSession, CliError> {
    mount_session(fixed_auth(identity), store).await
}

async fn mount_session(
    auth: SessionAuth,
    store: AttendanceLogStore<LibSqlDocumentStore>,
) -> Result<OpenSession, CliError> {
    let tracker = SessionTracker::mount(&auth, store)?;
    tracker.wait_until_loaded().await;
    Ok(OpenSession { tracker, auth })
}

pub fn log_to_list_item(entry: &LogEntry) -> LogListItem {
    LogListItem {
        id: entry.id.clone(),
        kind: entry.kind.to_string(),
        timestamp: entry.timestamp.clone(),
        local_time: entry.timestamp_local(),
    }
}

pub fn format_log_lines(entries: &[LogEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec!["No logs available".to_string()];
    }
    entries.iter().map(LogEntry::display_line).collect()
}

pub fn limit_entries(entries: &[LogEntry], limit: Option<usize>) -> &[LogEntry] {
    match limit {
        Some(limit) => &entries[..limit.min(entries.len())],
        None => entries,
    }
}
