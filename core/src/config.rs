//! Operator configuration, loaded from a TOML file.

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::diff::DiffStrategy;
use crate::http::Headers;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("missing configuration value: {0}")]
    Missing(&'static str),
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForumSyncConfig {
    pub suggestion: SuggestionSettings,
    pub emoji: EmojiConfig,
    pub categories: Vec<CategoryConfig>,
    pub watchers: Vec<WatcherConfig>,
    pub feeds: Vec<FeedConfig>,
    pub schedule: ScheduleConfig,
    /// Evaluate and log, but never mutate the platform or the store.
    pub read_only: bool,
}

impl ForumSyncConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn category(&self, id: u64) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Checks the values the suggestion jobs cannot run without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.emoji.require_votes()?;
        if self.categories.is_empty() {
            return Err(ConfigError::Missing("categories"));
        }
        if self.suggestion.greenlit_tag.trim().is_empty() {
            return Err(ConfigError::Missing("suggestion.greenlit_tag"));
        }
        if !(0.0..=100.0).contains(&self.suggestion.greenlit_ratio) {
            return Err(ConfigError::Invalid {
                field: "suggestion.greenlit_ratio",
                reason: format!("{} is outside 0..=100", self.suggestion.greenlit_ratio),
            });
        }
        if self.schedule.reconcile_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "schedule.reconcile_interval_secs",
                reason: "reconciliation would never run".to_string(),
            });
        }
        if self.schedule.curate_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "schedule.curate_interval_secs",
                reason: "curation would never run".to_string(),
            });
        }
        for watcher in &self.watchers {
            if watcher.interval_secs == 0 {
                return Err(ConfigError::Invalid {
                    field: "watchers.interval_secs",
                    reason: format!("{} polls every 0 seconds", watcher.url),
                });
            }
        }
        for feed in &self.feeds {
            if feed.interval_secs == 0 {
                return Err(ConfigError::Invalid {
                    field: "feeds.interval_secs",
                    reason: format!("{} polls every 0 seconds", feed.url),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionSettings {
    pub greenlit_tag: String,
    pub reviewed_tag: String,
    pub greenlit_threshold: u32,
    pub greenlit_ratio: f64,
    pub archive_on_greenlit: bool,
    pub lock_on_greenlit: bool,
    pub auto_archive_threshold_hours: Option<u64>,
    pub auto_lock_threshold_hours: Option<u64>,
}

impl Default for SuggestionSettings {
    fn default() -> Self {
        Self {
            greenlit_tag: "Greenlit".to_string(),
            reviewed_tag: "Reviewed".to_string(),
            greenlit_threshold: 20,
            greenlit_ratio: 75.0,
            archive_on_greenlit: false,
            lock_on_greenlit: false,
            auto_archive_threshold_hours: Some(168),
            auto_lock_threshold_hours: None,
        }
    }
}

/// Custom emoji ids used for voting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmojiConfig {
    pub agree: String,
    pub neutral: String,
    pub disagree: String,
}

impl EmojiConfig {
    pub fn require_votes(&self) -> Result<(), ConfigError> {
        if self.agree.is_empty() {
            return Err(ConfigError::Missing("emoji.agree"));
        }
        if self.neutral.is_empty() {
            return Err(ConfigError::Missing("emoji.neutral"));
        }
        if self.disagree.is_empty() {
            return Err(ConfigError::Missing("emoji.disagree"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKindConfig {
    #[default]
    Normal,
    Alpha,
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoTagConfig {
    pub default_tag: String,
    pub review_tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub id: u64,
    #[serde(default)]
    pub kind: CategoryKindConfig,
    #[serde(default)]
    pub auto_tag: Option<AutoTagConfig>,
    #[serde(default)]
    pub auto_archive_threshold_hours: Option<u64>,
    #[serde(default)]
    pub auto_lock_threshold_hours: Option<u64>,
}

impl CategoryConfig {
    pub fn archive_threshold_hours(&self, defaults: &SuggestionSettings) -> Option<u64> {
        self.auto_archive_threshold_hours
            .or(defaults.auto_archive_threshold_hours)
    }

    pub fn lock_threshold_hours(&self, defaults: &SuggestionSettings) -> Option<u64> {
        self.auto_lock_threshold_hours
            .or(defaults.auto_lock_threshold_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub diff: DiffStrategy,
}

impl WatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub initial_sequence: u64,
    #[serde(default)]
    pub format: FeedFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    #[default]
    Rss,
    Json,
}

impl FeedConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub reconcile_interval_secs: u64,
    pub curate_interval_secs: u64,
    pub curate_initial_delay_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 3600,
            curate_interval_secs: 3600,
            curate_initial_delay_secs: 30,
        }
    }
}

impl ScheduleConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn curate_interval(&self) -> Duration {
        Duration::from_secs(self.curate_interval_secs)
    }

    pub fn curate_initial_delay(&self) -> Duration {
        Duration::from_secs(self.curate_initial_delay_secs)
    }
}

fn default_poll_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
read_only = true

[suggestion]
greenlit_threshold = 10
auto_lock_threshold_hours = 720

[emoji]
agree = "111"
neutral = "222"
disagree = "333"

[[categories]]
id = 42
kind = "normal"
auto_tag = { default_tag = "Pending", review_tag = "Greenlit" }

[[categories]]
id = 43
kind = "alpha"
auto_archive_threshold_hours = 24

[[watchers]]
url = "https://status.example.com/api.json"
interval_secs = 30
headers = { "user-agent" = "forumsync" }

[[feeds]]
url = "https://forum.example.com/feed.rss"
initial_sequence = 100
"#;

    #[test]
    fn parses_sample_with_defaults() {
        let config = ForumSyncConfig::from_toml_str(SAMPLE).expect("parse");
        assert!(config.read_only);
        assert_eq!(config.suggestion.greenlit_threshold, 10);
        assert_eq!(config.suggestion.greenlit_ratio, 75.0);
        assert_eq!(config.suggestion.greenlit_tag, "Greenlit");
        assert_eq!(config.categories.len(), 2);
        assert_eq!(
            config.categories[0].auto_tag,
            Some(AutoTagConfig {
                default_tag: "Pending".to_string(),
                review_tag: "Greenlit".to_string(),
            })
        );
        assert_eq!(config.categories[1].kind, CategoryKindConfig::Alpha);
        assert_eq!(config.watchers[0].diff, DiffStrategy::Structural);
        assert_eq!(config.watchers[0].interval(), Duration::from_secs(30));
        assert_eq!(config.feeds[0].interval_secs, 60);
        assert_eq!(config.feeds[0].initial_sequence, 100);
        assert_eq!(config.feeds[0].format, FeedFormat::Rss);
        assert_eq!(config.schedule, ScheduleConfig::default());
        config.validate().expect("valid");
    }

    #[test]
    fn category_thresholds_override_defaults() {
        let config = ForumSyncConfig::from_toml_str(SAMPLE).expect("parse");
        let normal = config.category(42).expect("normal");
        let alpha = config.category(43).expect("alpha");
        assert_eq!(normal.archive_threshold_hours(&config.suggestion), Some(168));
        assert_eq!(alpha.archive_threshold_hours(&config.suggestion), Some(24));
        assert_eq!(alpha.lock_threshold_hours(&config.suggestion), Some(720));
    }

    #[test]
    fn validate_reports_missing_emoji() {
        let mut config = ForumSyncConfig::from_toml_str(SAMPLE).expect("parse");
        config.emoji.disagree.clear();
        assert_matches!(
            config.validate(),
            Err(ConfigError::Missing("emoji.disagree"))
        );
    }

    #[test]
    fn validate_reports_missing_categories() {
        let mut config = ForumSyncConfig::from_toml_str(SAMPLE).expect("parse");
        config.categories.clear();
        assert_matches!(config.validate(), Err(ConfigError::Missing("categories")));
    }

    #[test]
    fn validate_rejects_zero_schedule_periods() {
        let mut config = ForumSyncConfig::from_toml_str(SAMPLE).expect("parse");
        config.schedule.reconcile_interval_secs = 0;
        assert_matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "schedule.reconcile_interval_secs",
                ..
            })
        );

        config.schedule.reconcile_interval_secs = 60;
        config.schedule.curate_interval_secs = 0;
        assert_matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                field: "schedule.curate_interval_secs",
                ..
            })
        );
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = ForumSyncConfig::load(&dir.path().join("missing.toml"));
        assert_matches!(result, Err(ConfigError::Read { .. }));
    }
}
