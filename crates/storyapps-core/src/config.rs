use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::models::{CoreError, CoreErrorKind};

pub const DEFAULT_API_BASE_URL: &str = "https://story-api.dicoding.dev/v1";

const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub cache: CacheConfig,
    pub push: PushDefaults,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("storyapps-data").join("storyapps.sqlite3"),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: 15,
            cache: CacheConfig::default(),
            push: PushDefaults::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON file at `path` if given, then `STORYAPPS_*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let raw = fs::read_to_string(path).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("cannot read config file '{}': {error}", path.display()),
            )
        })?;
        serde_json::from_str(&raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("invalid config file '{}': {error}", path.display()),
            )
        })
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("STORYAPPS_DB_PATH").filter(|value| !value.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("STORYAPPS_API_BASE_URL").filter(|value| !value.is_empty()) {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(generation) =
            lookup("STORYAPPS_CACHE_GENERATION").filter(|value| !value.is_empty())
        {
            self.cache.generation = generation;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
pub struct CacheBounds {
    pub max_entries: usize,
    pub max_age_secs: u64,
}

impl CacheBounds {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub prefix: String,
    pub generation: String,
    /// Base the app shell and precache paths are resolved against.
    pub scope_url: String,
    pub app_shell: String,
    pub precache: Vec<String>,
    pub network_timeout_ms: Option<u64>,
    pub pages: CacheBounds,
    pub assets: CacheBounds,
    pub images: CacheBounds,
    pub api: CacheBounds,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "db-StoryApps".to_string(),
            generation: "v1".to_string(),
            scope_url: "http://localhost:9000/".to_string(),
            app_shell: "./index.html".to_string(),
            precache: vec![
                "./".to_string(),
                "./index.html".to_string(),
                "./manifest.json".to_string(),
                "./public/icons/favicon-192x192.png".to_string(),
                "./public/icons/favicon-152x152.png".to_string(),
                "./public/icons/favicon-96x96.png".to_string(),
            ],
            network_timeout_ms: Some(3_000),
            pages: CacheBounds {
                max_entries: 50,
                max_age_secs: 30 * DAY_SECS,
            },
            assets: CacheBounds {
                max_entries: 60,
                max_age_secs: 30 * DAY_SECS,
            },
            images: CacheBounds {
                max_entries: 60,
                max_age_secs: 30 * DAY_SECS,
            },
            api: CacheBounds {
                max_entries: 100,
                max_age_secs: 5 * 60,
            },
        }
    }
}

impl CacheConfig {
    pub fn network_timeout(&self) -> Option<Duration> {
        self.network_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct PushDefaults {
    pub title: String,
    /// Title used when the payload could not be read as structured data.
    pub fallback_title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub target_url: String,
}

impl Default for PushDefaults {
    fn default() -> Self {
        Self {
            title: "New Notification".to_string(),
            fallback_title: "Notification".to_string(),
            body: "You have received a notification.".to_string(),
            icon: "public/icons/favicon-192x192.png".to_string(),
            badge: "public/icons/favicon-72x72.png".to_string(),
            target_url: "/".to_string(),
        }
    }
}
