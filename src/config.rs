use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{ConfigError, Result};
use crate::storage::CachePolicy;

const APP_DIR: &str = "stock-news-cache";

/// Longest look-back accepted from configuration.
pub const MAX_ANALYSIS_PERIOD_DAYS: u32 = 3650;

pub const SORT_ORDERS: [&str; 3] = ["relevancy", "popularity", "publishedAt"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralSettings,
    #[serde(default)]
    pub news: CachePolicy,
    #[serde(default)]
    pub news_api: NewsApiSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralSettings {
    /// Days of news looked back from today when no range is given.
    #[serde(default = "default_analysis_period_days")]
    pub analysis_period_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsApiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_sort_by")]
    pub sort_by: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default)]
    pub query_suffix: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Root of the per-symbol record tree. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json_format: bool,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::NotFound(path.as_ref().display().to_string()))?;

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults, then apply
    /// environment overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::load(path)?
        } else {
            tracing::info!(
                "Configuration file not found at {}, using defaults",
                path.as_ref().display()
            );
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.news.validate()?;

        if self.general.analysis_period_days == 0 {
            return Err(ConfigError::Config("Analysis period must be greater than 0".to_string()));
        }
        if self.general.analysis_period_days > MAX_ANALYSIS_PERIOD_DAYS {
            return Err(ConfigError::Config(format!(
                "Analysis period must be at most {} days, got {}",
                MAX_ANALYSIS_PERIOD_DAYS, self.general.analysis_period_days
            )));
        }

        let api = &self.news_api;
        url::Url::parse(&api.base_url)
            .map_err(|_| ConfigError::InvalidUrl(api.base_url.clone()))?;

        if api.language.trim().is_empty() {
            return Err(ConfigError::Config("News API language cannot be empty".to_string()));
        }

        if !SORT_ORDERS.contains(&api.sort_by.as_str()) {
            return Err(ConfigError::Config(format!(
                "Unknown News API sort order '{}', expected one of {}",
                api.sort_by,
                SORT_ORDERS.join(", ")
            )));
        }

        if !(1..=100).contains(&api.page_size) {
            return Err(ConfigError::Config(format!(
                "News API page size must be between 1 and 100, got {}",
                api.page_size
            )));
        }

        if api.timeout == 0 {
            return Err(ConfigError::Config("News API timeout must be greater than 0".to_string()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("NEWS_CACHE_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.storage.data_dir = Some(PathBuf::from(dir));
            }
        }

        if let Ok(level) = std::env::var("NEWS_CACHE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(max_per_day) = std::env::var("NEWS_CACHE_MAX_ARTICLES_PER_DAY") {
            if let Ok(val) = max_per_day.parse() {
                self.news.max_articles_per_day = Some(val);
            }
        }
    }

    /// Directory holding the record tree.
    pub fn news_db_dir(&self) -> Result<PathBuf> {
        match &self.storage.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("news_db")),
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| ConfigError::Config("Could not determine config directory".to_string()))
    }

    pub fn data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| ConfigError::Config("Could not determine data directory".to_string()))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            analysis_period_days: default_analysis_period_days(),
        }
    }
}

impl Default for NewsApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            language: default_language(),
            sort_by: default_sort_by(),
            page_size: default_page_size(),
            query_suffix: String::new(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

fn default_analysis_period_days() -> u32 { 28 }
fn default_base_url() -> String { "https://newsapi.org".to_string() }
fn default_language() -> String { "en".to_string() }
fn default_sort_by() -> String { "relevancy".to_string() }
fn default_page_size() -> u32 { 100 }
fn default_timeout() -> u64 { 30 }
fn default_user_agent() -> String {
    format!("stock-news-cache/{}", env!("CARGO_PKG_VERSION"))
}
fn default_log_level() -> String { "info".to_string() }

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.general.analysis_period_days, 28);
        assert_eq!(config.news.max_articles_total, None);
        assert_eq!(config.news.max_articles_per_day, None);
        assert!(!config.news.refresh_no_news);
        assert!(!config.news.refresh_articles);
        assert_eq!(config.news_api.language, "en");
        assert_eq!(config.news_api.sort_by, "relevancy");
        assert_eq!(config.news_api.page_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            [news]
            max_articles_per_day = 5
            refresh_no_news = true

            [news_api]
            language = "it"
            sort_by = "publishedAt"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.news.max_articles_per_day, Some(5));
        assert!(config.news.refresh_no_news);
        assert!(!config.news.refresh_articles);
        assert_eq!(config.news_api.language, "it");
        assert_eq!(config.news_api.page_size, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.news_api.page_size = 500;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.news_api.sort_by = "newest".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.news.max_articles_per_day = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.analysis_period_days = 200_000_000;
        assert!(matches!(config.validate(), Err(ConfigError::Config(_))));

        let mut config = Config::default();
        config.news_api.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.news.max_articles_total = Some(40);
        config.storage.data_dir = Some(temp_dir.path().join("db"));
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.news.max_articles_total, Some(40));
        assert_eq!(loaded.news_db_dir().unwrap(), temp_dir.path().join("db"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load_with_env(temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.news_api.page_size, 100);

        assert!(matches!(
            Config::load(temp_dir.path().join("absent.toml")),
            Err(ConfigError::NotFound(_))
        ));
    }
}
