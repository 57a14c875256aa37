use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::pagination::PageOrder;

const DEFAULT_ENV_PREFIX: &str = "FEEDSYNC";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    format!("feedsync/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub order: PageOrder,
    #[serde(default = "default_pending_max_age", with = "humantime_serde")]
    pub pending_max_age: Duration,
    #[serde(default = "default_initial_pages")]
    pub initial_pages: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            order: PageOrder::default(),
            pending_max_age: default_pending_max_age(),
            initial_pages: default_initial_pages(),
        }
    }
}

fn default_page_size() -> usize {
    20
}

fn default_pending_max_age() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_initial_pages() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FetchConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

impl Config {
    pub fn controller_options(&self) -> crate::controller::Options {
        crate::controller::Options {
            order: self.feed.order,
            page_size: self.feed.page_size.max(1),
            pending_max_age: self.feed.pending_max_age,
            workers: self.fetch.workers,
        }
    }
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.source.base_url.is_empty() {
        base.source.base_url = other.source.base_url;
    }
    if !other.source.user_agent.is_empty() {
        base.source.user_agent = other.source.user_agent;
    }
    if !other.source.timeout.is_zero() {
        base.source.timeout = other.source.timeout;
    }

    if other.feed.page_size != 0 {
        base.feed.page_size = other.feed.page_size;
    }
    base.feed.order = other.feed.order;
    base.feed.pending_max_age = other.feed.pending_max_age;
    if other.feed.initial_pages != 0 {
        base.feed.initial_pages = other.feed.initial_pages;
    }

    if other.fetch.workers != 0 {
        base.fetch.workers = other.fetch.workers;
    }

    if !other.log.level.is_empty() {
        base.log.level = other.log.level;
    }

    base
}

// Values that fail to parse are ignored.
fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "source.base_url" => cfg.source.base_url = value,
        "source.user_agent" => cfg.source.user_agent = value,
        "source.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.source.timeout = duration;
            }
        }
        "feed.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.page_size = parsed;
            }
        }
        "feed.order" => {
            if let Some(order) = PageOrder::from_key(&value) {
                cfg.feed.order = order;
            }
        }
        "feed.pending_max_age" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.pending_max_age = duration;
            }
        }
        "feed.initial_pages" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.initial_pages = parsed;
            }
        }
        "fetch.workers" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.fetch.workers = parsed;
            }
        }
        "log.level" => cfg.log.level = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("feedsync").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn isolated(prefix: &str, file: Option<PathBuf>) -> LoadOptions {
        LoadOptions {
            config_file: Some(file.unwrap_or_else(|| PathBuf::from("/nonexistent/feedsync.yaml"))),
            env_prefix: Some(prefix.to_string()),
        }
    }

    #[test]
    fn load_defaults_without_files() {
        let cfg = load(isolated("FEEDSYNC_TEST_DEFAULTS", None)).unwrap();
        assert_eq!(cfg.feed.page_size, 20);
        assert_eq!(cfg.feed.order, PageOrder::Newest);
        assert_eq!(cfg.feed.pending_max_age, Duration::from_secs(300));
        assert!(cfg.source.base_url.is_empty());
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "source:\n  base_url: http://localhost:3000/api/\n  timeout: 5s\nfeed:\n  page_size: 10\n  order: oldest\n  pending_max_age: 90s\n",
        )
        .unwrap();

        let cfg = load(isolated("FEEDSYNC_TEST_FILE", Some(path))).unwrap();
        assert_eq!(cfg.source.base_url, "http://localhost:3000/api/");
        assert_eq!(cfg.source.timeout, Duration::from_secs(5));
        assert_eq!(cfg.feed.page_size, 10);
        assert_eq!(cfg.feed.order, PageOrder::Oldest);
        assert_eq!(cfg.feed.pending_max_age, Duration::from_secs(90));
        assert_eq!(cfg.fetch.workers, 4);
    }

    #[test]
    fn env_overrides() {
        env::set_var("FEEDSYNC_TEST_ENV_FEED__PAGE_SIZE", "7");
        env::set_var("FEEDSYNC_TEST_ENV_FEED__ORDER", "oldest");
        env::set_var("FEEDSYNC_TEST_ENV_FETCH__WORKERS", "not-a-number");
        let cfg = load(isolated("FEEDSYNC_TEST_ENV", None)).unwrap();
        assert_eq!(cfg.feed.page_size, 7);
        assert_eq!(cfg.feed.order, PageOrder::Oldest);
        assert_eq!(cfg.fetch.workers, 4);
        env::remove_var("FEEDSYNC_TEST_ENV_FEED__PAGE_SIZE");
        env::remove_var("FEEDSYNC_TEST_ENV_FEED__ORDER");
        env::remove_var("FEEDSYNC_TEST_ENV_FETCH__WORKERS");
    }

    #[test]
    fn controller_options_clamp_page_size() {
        let mut cfg = Config::default();
        cfg.feed.page_size = 0;
        assert_eq!(cfg.controller_options().page_size, 1);
    }
}
