use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Queue-ordering strategy. The frontier always orders by the priority
/// tuple; this setting is accepted for config compatibility and has no
/// behavioral branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStrategy {
    Bfs,
    Dfs,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Static,
    Javascript,
    #[default]
    Auto,
}

fn default_crawl_depth() -> usize {
    3
}
fn default_max_pages() -> usize {
    1000
}
fn default_rps() -> f64 {
    2.0
}
fn default_min_delay() -> f64 {
    0.5
}
fn default_max_delay() -> f64 {
    3.0
}
fn default_page_timeout() -> u64 {
    30
}
fn default_render_timeout() -> u64 {
    15
}
fn default_similarity_threshold() -> f64 {
    0.85
}
fn default_output_dir() -> String {
    "./output".to_string()
}
fn default_output_format() -> String {
    "json".to_string()
}
fn default_workers() -> usize {
    4
}
fn default_log_level() -> String {
    "INFO".to_string()
}

/// Main crawl configuration, deserialized from the `crawl` key of the
/// config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    // Target
    pub url: String,
    pub crawl_depth: usize,
    pub max_pages: usize,
    pub follow_external_links: bool,
    pub include_subdomains: bool,

    // Strategy
    pub strategy: CrawlStrategy,
    pub render_mode: RenderMode,

    // Rate limiting
    pub requests_per_second: f64,
    pub min_delay: f64,
    pub max_delay: f64,
    pub adaptive_delay: bool,

    // Timeouts (seconds)
    pub page_timeout: u64,
    pub render_timeout: u64,

    // Content
    pub extract_images: bool,
    pub extract_videos: bool,
    pub extract_files: bool,
    pub extract_entities: bool,
    pub extract_structured_data: bool,
    pub extract_text_content: bool,
    pub store_html: bool,

    // Deduplication
    pub enable_dedup: bool,
    pub similarity_threshold: f64,

    // Anti-blocking
    pub rotate_user_agents: bool,
    pub use_proxies: bool,
    pub respect_robots_txt: bool,

    // Output
    pub output_dir: String,
    pub output_format: String,

    // Intelligence
    pub enable_classification: bool,
    pub enable_summarization: bool,
    pub enable_content_cleaning: bool,
    pub enable_language_detection: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            crawl_depth: default_crawl_depth(),
            max_pages: default_max_pages(),
            follow_external_links: false,
            include_subdomains: true,
            strategy: CrawlStrategy::default(),
            render_mode: RenderMode::default(),
            requests_per_second: default_rps(),
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            adaptive_delay: true,
            page_timeout: default_page_timeout(),
            render_timeout: default_render_timeout(),
            extract_images: true,
            extract_videos: true,
            extract_files: true,
            extract_entities: true,
            extract_structured_data: true,
            extract_text_content: true,
            store_html: false,
            enable_dedup: true,
            similarity_threshold: default_similarity_threshold(),
            rotate_user_agents: true,
            use_proxies: false,
            respect_robots_txt: true,
            output_dir: default_output_dir(),
            output_format: default_output_format(),
            enable_classification: true,
            enable_summarization: false,
            enable_content_cleaning: true,
            enable_language_detection: true,
        }
    }
}

/// Storage backend toggles. Only the JSON writer ships in this build;
/// document-store and search-index sinks plug in through `PageSink`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mongo_enabled: bool,
    pub elastic_enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub proxies: Vec<String>,
}

/// Session state for authenticated crawling: cookies, extra headers, and
/// basic or bearer auth applied to every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookies: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    /// `(username, password)` pair for HTTP basic auth.
    pub basic_auth: Option<(String, String)>,
    pub bearer_token: Option<String>,
}

/// Top-level configuration container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IawicConfig {
    pub crawl: CrawlConfig,
    pub storage: StorageConfig,
    pub proxy: ProxyConfig,
    pub session: SessionConfig,
    pub workers: usize,
    pub log_level: String,
}

impl Default for IawicConfig {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            storage: StorageConfig::default(),
            proxy: ProxyConfig::default(),
            session: SessionConfig::default(),
            workers: default_workers(),
            log_level: default_log_level(),
        }
    }
}

impl IawicConfig {
    /// Load from a JSON file; missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.crawl.requests_per_second <= 0.0 {
            return Err(ConfigError::Invalid(
                "requests_per_second must be positive".into(),
            ));
        }
        if self.crawl.min_delay > self.crawl.max_delay {
            return Err(ConfigError::Invalid(
                "min_delay must not exceed max_delay".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.crawl.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "similarity_threshold must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IawicConfig::default();
        assert_eq!(config.crawl.crawl_depth, 3);
        assert_eq!(config.crawl.max_pages, 1000);
        assert_eq!(config.crawl.requests_per_second, 2.0);
        assert_eq!(config.crawl.render_mode, RenderMode::Auto);
        assert_eq!(config.crawl.strategy, CrawlStrategy::Hybrid);
        assert!(config.crawl.respect_robots_txt);
        assert!(!config.crawl.store_html);
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: IawicConfig = serde_json::from_str(
            r#"{"crawl": {"url": "https://a.test", "crawl_depth": 5, "render_mode": "static"}, "workers": 8}"#,
        )
        .unwrap();
        assert_eq!(config.crawl.url, "https://a.test");
        assert_eq!(config.crawl.crawl_depth, 5);
        assert_eq!(config.crawl.render_mode, RenderMode::Static);
        assert_eq!(config.crawl.max_pages, 1000);
        assert_eq!(config.workers, 8);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = IawicConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = IawicConfig::default();
        config.crawl.min_delay = 5.0;
        config.crawl.max_delay = 1.0;
        assert!(config.validate().is_err());

        let mut config = IawicConfig::default();
        config.crawl.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_parses_all_variants() {
        for (raw, expected) in [
            ("\"bfs\"", CrawlStrategy::Bfs),
            ("\"dfs\"", CrawlStrategy::Dfs),
            ("\"hybrid\"", CrawlStrategy::Hybrid),
        ] {
            let parsed: CrawlStrategy = serde_json::from_str(raw).unwrap();
            assert_eq!(parsed, expected);
        }
    }
}
