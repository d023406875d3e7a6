//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use timeclock_core::config::ClientConfig;
use timeclock_core::util::{is_http_url, is_remote_database_url, normalize_text_option};

const CONFIG_FILE_NAME: &str = "cli-config.json";
const PROFILE_ENV: &str = "TIMECLOCK_PROFILE";
const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

/// One named set of auth and database settings.
///
/// The database auth token is never written here; it comes from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join("timeclock").join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Explicit name, then `TIMECLOCK_PROFILE`, then the active profile, then `default`.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        self.resolve_profile_name_with(explicit, |name| std::env::var(name).ok())
    }

    pub fn resolve_profile_name_with(
        &self,
        explicit: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(lookup(PROFILE_ENV).as_deref()))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    pub fn supabase_url(&self) -> Option<String> {
        normalize_text_option(self.supabase_url.clone())
    }

    pub fn supabase_anon_key(&self) -> Option<String> {
        normalize_text_option(self.supabase_anon_key.clone())
    }

    pub fn database_url(&self) -> Option<String> {
        normalize_text_option(self.database_url.clone())
    }

    /// Client settings for this profile, before environment overrides
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            database_path: self.database_path.clone(),
            database_url: self.database_url(),
            database_auth_token: None,
            supabase_url: self.supabase_url(),
            supabase_anon_key: self.supabase_anon_key(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(url) = self.supabase_url() {
            if !is_http_url(&url) {
                return Err(format!(
                    "Supabase URL '{url}' must include http:// or https://"
                ));
            }
        }
        if let Some(url) = self.database_url() {
            if !is_remote_database_url(&url) {
                return Err(format!(
                    "Database URL '{url}' must use libsql://, wss://, https:// or http://"
                ));
            }
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.supabase_url = normalize_text_option(self.supabase_url.clone());
        self.supabase_anon_key = normalize_text_option(self.supabase_anon_key.clone());
        self.database_url = normalize_text_option(self.database_url.clone());
        self.database_path = self
            .database_path
            .take()
            .filter(|path| !path.as_os_str().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn temp_config_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "timeclock-cli-config-{label}-{}.json",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |duration| duration.as_nanos())
        ))
    }

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
        assert_eq!(normalize_profile_name(Some(" work ")), Some("work".to_string()));
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let path = temp_config_path("roundtrip");

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some(" default ".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "default".to_string(),
            CliProfile {
                supabase_url: Some(" https://project.supabase.co ".to_string()),
                supabase_anon_key: Some(" anon-key ".to_string()),
                database_url: Some("libsql://attendance.turso.io".to_string()),
                database_path: None,
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("default"));
        let profile = loaded.profile("default").unwrap();
        assert_eq!(
            profile.supabase_url.as_deref(),
            Some("https://project.supabase.co")
        );
        assert_eq!(profile.supabase_anon_key.as_deref(), Some("anon-key"));
        assert_eq!(
            profile.database_url.as_deref(),
            Some("libsql://attendance.turso.io")
        );

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_config_file_loads_default() {
        let path = temp_config_path("missing");
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded, CliProfilesConfig::default());
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_env_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        let no_env = |_: &str| None;
        let with_env = |name: &str| (name == PROFILE_ENV).then(|| "night-shift".to_string());

        assert_eq!(
            config.resolve_profile_name_with(Some("personal"), with_env),
            "personal"
        );
        assert_eq!(config.resolve_profile_name_with(None, with_env), "night-shift");
        assert_eq!(config.resolve_profile_name_with(None, no_env), "work");
        assert_eq!(
            CliProfilesConfig::default().resolve_profile_name_with(None, no_env),
            "default"
        );
    }

    #[test]
    fn client_config_never_carries_a_stored_token() {
        let profile = CliProfile {
            supabase_url: Some("https://project.supabase.co".to_string()),
            supabase_anon_key: Some("anon".to_string()),
            database_url: Some("libsql://attendance.turso.io".to_string()),
            database_path: Some(PathBuf::from("/tmp/timeclock.db")),
        };
        let config = profile.client_config();
        assert_eq!(config.database_auth_token, None);
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/tmp/timeclock.db"))
        );
        assert_eq!(
            config.supabase().unwrap(),
            Some((
                "https://project.supabase.co".to_string(),
                "anon".to_string()
            ))
        );
    }

    #[test]
    fn validate_rejects_bad_urls() {
        let bad_supabase = CliProfile {
            supabase_url: Some("project.supabase.co".to_string()),
            ..CliProfile::default()
        };
        assert!(bad_supabase.validate().is_err());

        let bad_database = CliProfile {
            database_url: Some("postgres://db".to_string()),
            ..CliProfile::default()
        };
        assert!(bad_database.validate().is_err());

        assert!(CliProfile::default().validate().is_ok());
    }
}
