use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::FreehoundError;

pub const DEFAULT_API_BASE: &str = "https://api.m-team.io/api";
pub const DEFAULT_SITE_URL: &str = "https://kp.m-team.cc";

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub tracker: TrackerConfig,
    pub refresh: RefreshConfig,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub api_base: String,
    pub site_url: String,
    /// Static credential token. Empty means unconfigured: every refresh
    /// cycle publishes an error snapshot instead of fetching.
    pub api_key: String,
    pub user_id: String,
    /// Optional comparison peer whose profile is fetched alongside ours.
    pub rival_user_id: String,
    /// Spacing between consecutive remote calls, clamped to [0.5, 10].
    pub api_delay_secs: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            api_key: String::new(),
            user_id: String::new(),
            rival_user_id: String::new(),
            api_delay_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds between refresh cycles, clamped to [60, 86400].
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_secs: 600 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// PushPlus token. Empty disables the alert engine entirely.
    pub pushplus_token: String,
    /// "Expiring" fires when less than this many minutes of free time
    /// remain on an incomplete download.
    pub threshold_minutes: u64,
    /// Minimum seconds between two alerts for the same (torrent, condition).
    pub cooldown_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            pushplus_token: String::new(),
            threshold_minutes: 10,
            cooldown_secs: 1800,
        }
    }
}

impl AppConfig {
    /// Load config: optional TOML file (given path or the per-user default)
    /// merged with environment overrides, then clamped.
    pub fn load(path: Option<&Path>) -> Result<Self, FreehoundError> {
        let path = path.map(PathBuf::from).unwrap_or_else(Self::config_path);
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str(&raw).map_err(|e| FreehoundError::Config(e.to_string()))?
        } else {
            Self::default()
        };
        config.apply_env();
        config.clamp();
        Ok(config)
    }

    /// Environment overrides, matching the names the deployment scripts use.
    fn apply_env(&mut self) {
        let overrides: [(&str, &mut String); 5] = [
            ("MT_TOKEN", &mut self.tracker.api_key),
            ("MT_SITE_URL", &mut self.tracker.site_url),
            ("MT_USER_ID", &mut self.tracker.user_id),
            ("RIVAL_USER_ID", &mut self.tracker.rival_user_id),
            ("PUSHPLUS_TOKEN", &mut self.alerts.pushplus_token),
        ];
        for (name, slot) in overrides {
            if let Ok(value) = std::env::var(name) {
                if !value.is_empty() {
                    *slot = value;
                }
            }
        }

        if let Some(interval) = env_parse::<u64>("REFRESH_INTERVAL") {
            self.refresh.interval_secs = interval;
        }
        if let Some(delay) = env_parse::<f64>("API_DELAY") {
            self.tracker.api_delay_secs = delay;
        }
    }

    pub fn clamp(&mut self) {
        self.refresh.interval_secs = self.refresh.interval_secs.clamp(60, 86_400);
        if !self.tracker.api_delay_secs.is_finite() {
            self.tracker.api_delay_secs = 1.0;
        }
        self.tracker.api_delay_secs = self.tracker.api_delay_secs.clamp(0.5, 10.0);
    }

    pub fn has_credential(&self) -> bool {
        !self.tracker.api_key.trim().is_empty()
    }

    pub fn api_delay(&self) -> Duration {
        Duration::from_secs_f64(self.tracker.api_delay_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_secs)
    }

    /// Path to the user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("", "", "freehound")
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.tracker.api_base, DEFAULT_API_BASE);
        assert_eq!(config.refresh.interval_secs, 600);
        assert_eq!(config.alerts.threshold_minutes, 10);
        assert_eq!(config.alerts.cooldown_secs, 1800);
        assert!(!config.has_credential());
    }

    #[test]
    fn test_clamping() {
        let mut config = AppConfig::default();
        config.refresh.interval_secs = 10;
        config.tracker.api_delay_secs = 0.1;
        config.clamp();
        assert_eq!(config.refresh.interval_secs, 60);
        assert_eq!(config.tracker.api_delay_secs, 0.5);

        config.refresh.interval_secs = 1_000_000;
        config.tracker.api_delay_secs = 99.0;
        config.clamp();
        assert_eq!(config.refresh.interval_secs, 86_400);
        assert_eq!(config.tracker.api_delay_secs, 10.0);

        config.tracker.api_delay_secs = f64::NAN;
        config.clamp();
        assert_eq!(config.tracker.api_delay_secs, 1.0);
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("MT_TOKEN", "env-token");
        std::env::set_var("MT_SITE_URL", "https://next.m-team.cc");

        let mut config = AppConfig::default();
        config.apply_env();

        std::env::remove_var("MT_TOKEN");
        std::env::remove_var("MT_SITE_URL");

        assert_eq!(config.tracker.api_key, "env-token");
        assert_eq!(config.tracker.site_url, "https://next.m-team.cc");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let raw = r#"
            [tracker]
            api_key = "secret"
            user_id = "302000"

            [refresh]
            interval_secs = 300
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert!(config.has_credential());
        assert_eq!(config.tracker.user_id, "302000");
        assert_eq!(config.refresh.interval_secs, 300);
        // Unspecified sections keep their defaults.
        assert_eq!(config.tracker.site_url, DEFAULT_SITE_URL);
        assert_eq!(config.alerts.cooldown_secs, 1800);
    }
}
