//! Client configuration shared by every Timeclock front end.
//!
//! A `ClientConfig` names where the attendance documents live (a local libSQL
//! file, a Turso remote, or an embedded replica of one) and, optionally, the
//! Supabase project used to authenticate users.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, is_remote_database_url, normalize_text_option};

/// Environment variable overriding the remote database URL
pub const ENV_DATABASE_URL: &str = "TIMECLOCK_DATABASE_URL";
/// Environment variable overriding the remote database auth token
pub const ENV_AUTH_TOKEN: &str = "TIMECLOCK_AUTH_TOKEN";
/// Environment variable overriding the Supabase project URL
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
/// Environment variable overriding the Supabase anon key
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Where attendance documents are stored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Local database file; `None` keeps everything in memory (or remote-only)
    pub path: Option<PathBuf>,
    /// Remote database URL (e.g., `libsql://attendance.turso.io`)
    pub remote_url: Option<String>,
    /// Authentication token for the remote database
    pub auth_token: Option<String>,
    /// Automatic replica sync interval
    pub sync_interval: Option<Duration>,
}

impl DatabaseConfig {
    /// Local-only database file at `path`
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// In-memory database (useful for testing)
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Attach a remote database; with a local path this becomes an embedded replica
    #[must_use]
    pub fn with_remote(mut self, url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self.auth_token = Some(auth_token.into());
        self.sync_interval = Some(Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS));
        self
    }

    /// Set the automatic sync interval
    #[must_use]
    pub const fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Disable automatic sync (manual sync only)
    #[must_use]
    pub const fn without_auto_sync(mut self) -> Self {
        self.sync_interval = None;
        self
    }

    /// Check if a remote database is configured
    pub const fn is_remote_configured(&self) -> bool {
        self.remote_url.is_some() && self.auth_token.is_some()
    }

    /// Reject half-configured remotes and malformed URLs
    pub fn validate(&self) -> Result<()> {
        match (&self.remote_url, &self.auth_token) {
            (None, None) => Ok(()),
            (Some(url), Some(_)) if is_remote_database_url(url) => Ok(()),
            (Some(url), Some(_)) => Err(Error::InvalidInput(format!(
                "remote database URL '{url}' must use libsql://, wss://, http:// or https://"
            ))),
            (Some(_), None) => Err(Error::InvalidInput(
                "remote database URL is set but the auth token is missing".to_string(),
            )),
            (None, Some(_)) => Err(Error::InvalidInput(
                "remote database auth token is set but the URL is missing".to_string(),
            )),
        }
    }
}

/// Full client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub database_auth_token: Option<String>,
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
}

impl ClientConfig {
    /// Overlay values from the environment (or any other lookup) on top of this config.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = normalize_text_option(lookup(ENV_DATABASE_URL)) {
            self.database_url = Some(url);
        }
        if let Some(token) = normalize_text_option(lookup(ENV_AUTH_TOKEN)) {
            self.database_auth_token = Some(token);
        }
        if let Some(url) = normalize_text_option(lookup(ENV_SUPABASE_URL)) {
            self.supabase_url = Some(url);
        }
        if let Some(key) = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY)) {
            self.supabase_anon_key = Some(key);
        }
        self
    }

    /// Overlay values from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Database settings derived from this config
    pub fn database(&self) -> DatabaseConfig {
        let base = self
            .database_path
            .clone()
            .map_or_else(DatabaseConfig::in_memory, DatabaseConfig::local);
        match (
            normalize_text_option(self.database_url.clone()),
            normalize_text_option(self.database_auth_token.clone()),
        ) {
            (Some(url), Some(token)) => base.with_remote(url, token),
            (url, token) => DatabaseConfig {
                remote_url: url,
                auth_token: token,
                ..base
            },
        }
    }

    /// Supabase `(url, anon_key)` if auth is configured
    pub fn supabase(&self) -> Result<Option<(String, String)>> {
        let url = normalize_text_option(self.supabase_url.clone());
        let anon_key = normalize_text_option(self.supabase_anon_key.clone());
        match (url, anon_key) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) if is_http_url(&url) => Ok(Some((url, anon_key))),
            (Some(_), Some(_)) => Err(Error::InvalidInput(
                "Supabase URL must include http:// or https://".to_string(),
            )),
            _ => Err(Error::InvalidInput(
                "Supabase URL and anon key must be configured together".to_string(),
            )),
        }
    }
}
