use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use kiroku_api::paging::{DEFAULT_MAX_OFFSET, DEFAULT_MAX_PAGES, DEFAULT_PAGE_DELAY};
use kiroku_api::traits::Provider;
use serde::{Deserialize, Serialize};

use crate::error::KirokuError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

/// Floor for `sync.min_interval_secs`; trackers rate-limit below this.
pub const MIN_SYNC_INTERVAL_SECS: u64 = 5;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub sync: SyncConfig,
    pub crossref: CrossRefConfig,
    pub services: ServicesConfig,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub log_filter: String,
    #[serde(default)]
    pub log_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub rewatch_completed: bool,
    pub plan_to_watch_only: bool,
    pub min_interval_secs: u64,
    pub page_delay_ms: u64,
    pub max_pages: u32,
    pub max_offset: u32,
}

impl SyncConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossRefConfig {
    pub url: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub simkl_client_id: String,
    pub user_agent: String,
}

/// A local user and the tracker accounts their playback syncs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub id: String,
    #[serde(default)]
    pub trackers: Vec<TrackerAccount>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TrackerAccount {
    pub provider: String,
    pub token: String,
}

impl std::fmt::Debug for TrackerAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackerAccount")
            .field("provider", &self.provider)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl TrackerAccount {
    pub fn provider(&self) -> Result<Provider, KirokuError> {
        self.provider.parse().map_err(KirokuError::Config)
    }
}

impl AppConfig {
    /// Load config: the user file if it exists, otherwise built-in defaults.
    pub fn load() -> Result<Self, KirokuError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            Self::load_from(&user_path)
        } else {
            Self::parse(DEFAULT_CONFIG)
        }
    }

    /// Load and validate a specific config file.
    pub fn load_from(path: &Path) -> Result<Self, KirokuError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| KirokuError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, KirokuError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| KirokuError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the sync loop misbehave.
    pub fn validate(&self) -> Result<(), KirokuError> {
        let sync = &self.sync;
        if sync.min_interval_secs < MIN_SYNC_INTERVAL_SECS {
            return Err(KirokuError::Config(format!(
                "sync.min_interval_secs must be at least {MIN_SYNC_INTERVAL_SECS}"
            )));
        }
        if sync.page_delay() < DEFAULT_PAGE_DELAY {
            return Err(KirokuError::Config(format!(
                "sync.page_delay_ms must be at least {}",
                DEFAULT_PAGE_DELAY.as_millis()
            )));
        }
        if !(1..=DEFAULT_MAX_PAGES).contains(&sync.max_pages) {
            return Err(KirokuError::Config(format!(
                "sync.max_pages must be between 1 and {DEFAULT_MAX_PAGES}"
            )));
        }
        if !(1..=DEFAULT_MAX_OFFSET).contains(&sync.max_offset) {
            return Err(KirokuError::Config(format!(
                "sync.max_offset must be between 1 and {DEFAULT_MAX_OFFSET}"
            )));
        }
        if url::Url::parse(&self.crossref.url).is_err() {
            return Err(KirokuError::Config(format!(
                "crossref.url '{}' is not a URL",
                self.crossref.url
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for user in &self.users {
            if user.id.trim().is_empty() {
                return Err(KirokuError::Config("users[].id must not be empty".into()));
            }
            if !seen.insert(user.id.as_str()) {
                return Err(KirokuError::Config(format!("duplicate user '{}'", user.id)));
            }
            for account in &user.trackers {
                let provider = account.provider()?;
                if provider == Provider::Simkl && self.services.simkl_client_id.is_empty() {
                    return Err(KirokuError::Config(format!(
                        "user '{}' uses simkl but services.simkl_client_id is empty",
                        user.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Where the cross-reference snapshot is stored.
    pub fn crossref_path(&self) -> PathBuf {
        if !self.crossref.path.is_empty() {
            return PathBuf::from(&self.crossref.path);
        }
        Self::project_dirs()
            .map(|d| d.data_dir().join("anime-list-full.json"))
            .unwrap_or_else(|| PathBuf::from("anime-list-full.json"))
    }

    pub fn user(&self, id: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.id == id)
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "kiroku")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}
