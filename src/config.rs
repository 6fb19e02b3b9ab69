use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub credentials_path: String,
    #[serde(default)]
    pub polling: Polling,
    #[serde(default)]
    pub window: Window,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Polling {
    /// Pause between two scheduled passes over all users.
    pub interval_secs: u64,
    /// Upper bound for one call to the messaging service.
    pub messaging_timeout_secs: u64,
    pub max_concurrent_threads: usize,
    /// The scheduled pass skips users checked more recently than this.
    pub min_recheck_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Window {
    pub lookback_days: i64,
    pub fallback_period_count: usize,
}

impl Default for Polling {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            messaging_timeout_secs: 20,
            max_concurrent_threads: 4,
            min_recheck_secs: 60,
        }
    }
}

impl Default for Window {
    fn default() -> Self {
        Self {
            lookback_days: 90,
            fallback_period_count: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:timeoff.db?mode=rwc".to_string(),
            credentials_path: "credentials.json".to_string(),
            polling: Polling::default(),
            window: Window::default(),
        }
    }
}

impl Polling {
    pub fn messaging_timeout(&self) -> Duration {
        Duration::from_secs(self.messaging_timeout_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn min_recheck(&self) -> Duration {
        Duration::from_secs(self.min_recheck_secs)
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from("settings.toml")
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        use std::fs;
        if let Ok(content) = fs::read_to_string(path.as_ref()) {
            match toml::from_str(&content) {
                Ok(config) => return config,
                Err(e) => tracing::warn!(error = %e, "ignoring invalid settings file"),
            }
        }
        Self::default()
    }
}
