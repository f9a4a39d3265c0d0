use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address the HTTP API binds to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Refresh interval in minutes, 0 disables background imports
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_refresh_interval() -> u64 {
    15
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            refresh_interval: default_refresh_interval(),
            storage: StorageConfig::default(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Backend,
    pub url: Option<String>,
}

/// A remote feed imported by the fetcher.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Feed ID the source is stored under
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// A redis URL from the environment overrides the file and selects redis.
    pub fn with_redis_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url {
            self.storage.backend = Backend::Redis;
            self.storage.url = Some(url);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        assert_eq!(default_refresh_interval(), 15);
        assert_eq!(default_listen(), "0.0.0.0:3000");

        let config = Config::default();
        assert_eq!(config.storage.backend, Backend::Memory);
        assert!(config.storage.url.is_none());
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            listen = "127.0.0.1:8080"
            refresh_interval = 30

            [storage]
            backend = "redis"
            url = "redis://127.0.0.1:6379"

            [[sources]]
            id = "hn"
            url = "https://news.ycombinator.com/rss"
            categories = ["Tech"]

            [[sources]]
            id = "blog"
            url = "https://example.org/rss"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.listen, "127.0.0.1:8080");
        assert_eq!(config.refresh_interval, 30);
        assert_eq!(config.storage.backend, Backend::Redis);
        assert_eq!(config.storage.url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].id, "hn");
        assert_eq!(config.sources[0].categories, vec!["Tech"]);
        assert!(config.sources[1].categories.is_empty());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();

        assert_eq!(config.listen, "0.0.0.0:3000");
        assert_eq!(config.refresh_interval, 15);
        assert_eq!(config.storage.backend, Backend::Memory);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config.storage.backend, Backend::Memory);
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_source_missing_url() {
        let content = r#"
            [[sources]]
            id = "hn"
            # Missing url field
        "#;

        let result = Config::from_str(content);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let content = r#"
            [storage]
            backend = "postgres"
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_redis_url_override() {
        let config = Config::default().with_redis_url(Some("redis://cache:6379".into()));
        assert_eq!(config.storage.backend, Backend::Redis);
        assert_eq!(config.storage.url.as_deref(), Some("redis://cache:6379"));

        let config = Config::default().with_redis_url(None);
        assert_eq!(config.storage.backend, Backend::Memory);
    }
}
