use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{bail, eyre, Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::dispatch::DEFAULT_WORKERS;
use crate::watchers::codinglove::DEFAULT_SOURCE_URL;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Slack bot token (xoxb-...)
    #[serde(default)]
    pub slack_token: String,
    #[serde(default)]
    pub debug: bool,
    /// Dispatcher pool size
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Time allowed for a clean stop after a termination signal
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    #[serde(default)]
    pub codinglove: CodingLoveConfig,
}

/// CodingLove watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodingLoveConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_source_url")]
    pub source_url: String,
    /// Slack channel ID or `@user` to post to
    #[serde(default)]
    pub channel: String,
    /// Dedup database; defaults to `~/.butler/data/posts.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts_db: Option<PathBuf>,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_grace_period_secs() -> u64 {
    5
}

fn default_enabled() -> bool {
    true
}

fn default_source_url() -> String {
    DEFAULT_SOURCE_URL.to_string()
}

fn default_interval_secs() -> u64 {
    600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            slack_token: String::new(),
            debug: false,
            workers: default_workers(),
            grace_period_secs: default_grace_period_secs(),
            codinglove: CodingLoveConfig::default(),
        }
    }
}

impl Default for CodingLoveConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            source_url: default_source_url(),
            channel: String::new(),
            posts_db: None,
            interval_secs: default_interval_secs(),
        }
    }
}

/// Template written by `butler init`
pub const DEFAULT_CONFIG_TOML: &str = r#"# Slack bot token, or set BUTLER_SLACK_TOKEN
slack_token = ""
debug = false
workers = 5
grace_period_secs = 5

[codinglove]
enabled = true
source_url = "http://thecodinglove.com/"
# Channel ID (C0123456) or @username
channel = ""
interval_secs = 600
# posts_db = "/var/lib/butler/posts.db"
"#;

/// `~/.butler`
pub fn butler_home() -> Result<PathBuf> {
    let base_dirs =
        directories::BaseDirs::new().ok_or_else(|| eyre!("cannot determine home directory"))?;
    Ok(base_dirs.home_dir().join(".butler"))
}

/// `~/.butler/data`
pub fn data_dir() -> Result<PathBuf> {
    Ok(butler_home()?.join("data"))
}

/// `~/.butler/logs`
pub fn log_dir() -> Result<PathBuf> {
    Ok(butler_home()?.join("logs"))
}

impl Config {
    /// `~/.butler/config.toml`
    pub fn config_path() -> Result<PathBuf> {
        Ok(butler_home()?.join("config.toml"))
    }

    /// Layered load: defaults, then the TOML file if it exists, then
    /// `BUTLER_*` environment variables (`__` separates nested keys, e.g.
    /// `BUTLER_CODINGLOVE__CHANNEL`).
    pub fn load_from_path(path: &Path) -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("BUTLER_").split("__"))
            .extract()
            .wrap_err_with(|| format!("failed to parse config {}", path.display()))
    }

    /// Write [`DEFAULT_CONFIG_TOML`] to `path` unless a file is already
    /// there. Returns whether a file was written.
    pub fn write_default(path: &Path) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(path, DEFAULT_CONFIG_TOML)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        Ok(true)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Reject settings the bot cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.slack_token.trim().is_empty() {
            bail!("slack_token is missing (set it in the config file, BUTLER_SLACK_TOKEN or --token)");
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.grace_period_secs == 0 {
            bail!("grace_period_secs must be at least 1");
        }
        if self.codinglove.enabled {
            self.codinglove.validate()?;
        }
        Ok(())
    }
}

impl CodingLoveConfig {
    fn validate(&self) -> Result<()> {
        if self.channel.trim().is_empty() {
            bail!("codinglove.channel is required when the watcher is enabled");
        }
        if self.interval_secs == 0 {
            bail!("codinglove.interval_secs must be at least 1");
        }
        let url = url::Url::parse(&self.source_url)
            .wrap_err_with(|| format!("codinglove.source_url is not a URL: {}", self.source_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("codinglove.source_url must be http or https, got {}", url.scheme());
        }
        Ok(())
    }

    pub fn posts_db_path(&self) -> Result<PathBuf> {
        match &self.posts_db {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("posts.db")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            slack_token: "xoxb-test".into(),
            codinglove: CodingLoveConfig {
                channel: "C42".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn default_config_has_sensible_values() {
        let config = Config::default();
        assert_eq!(config.workers, 5);
        assert_eq!(config.grace_period(), Duration::from_secs(5));
        assert!(config.codinglove.enabled);
        assert_eq!(config.codinglove.source_url, "http://thecodinglove.com/");
        assert_eq!(config.codinglove.interval_secs, 600);
        assert!(config.codinglove.posts_db.is_none());
    }

    #[test]
    fn load_from_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let toml_path = tmp.path().join("config.toml");
        std::fs::write(
            &toml_path,
            r#"
slack_token = "xoxb-file"
workers = 3

[codinglove]
channel = "@ttochtermann"
posts_db = "/tmp/posts.db"
interval_secs = 5
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&toml_path).unwrap();
        assert_eq!(config.slack_token, "xoxb-file");
        assert_eq!(config.workers, 3);
        assert_eq!(config.grace_period_secs, 5);
        assert_eq!(config.codinglove.channel, "@ttochtermann");
        assert_eq!(config.codinglove.interval_secs, 5);
        assert_eq!(
            config.codinglove.posts_db_path().unwrap(),
            PathBuf::from("/tmp/posts.db")
        );
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load_from_path(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert!(config.codinglove.enabled);
    }

    #[test]
    fn default_template_parses() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        assert!(Config::write_default(&path).unwrap());
        assert!(!Config::write_default(&path).unwrap());

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.codinglove.source_url, DEFAULT_SOURCE_URL);
        // token and channel are left blank on purpose
        assert!(config.validate().is_err());
    }

    #[test]
    fn write_default_keeps_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "slack_token = \"mine\"\n").unwrap();
        assert!(!Config::write_default(&path).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "slack_token = \"mine\"\n"
        );
    }

    #[test]
    fn validate_requires_token() {
        let mut config = valid();
        config.slack_token = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("slack_token"));
    }

    #[test]
    fn validate_requires_channel_only_when_enabled() {
        let mut config = valid();
        config.codinglove.channel.clear();
        assert!(config.validate().is_err());

        config.codinglove.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_source_url() {
        let mut config = valid();
        config.codinglove.source_url = "ftp://thecodinglove.com/".into();
        assert!(config.validate().is_err());

        config.codinglove.source_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut config = valid();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.codinglove.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.grace_period_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_path_ends_with_butler() {
        let path = Config::config_path().unwrap();
        assert!(path.ends_with(".butler/config.toml"));
    }
}
