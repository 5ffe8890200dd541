use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub content: ContentConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub newsletter: NewsletterConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.mdx".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_min_query_len")]
    pub min_query_len: usize,
    #[serde(default = "default_page_length")]
    pub page_length: f64,
    #[serde(default = "default_term_frequency")]
    pub term_frequency: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            debounce_ms: default_debounce_ms(),
            max_results: default_max_results(),
            min_query_len: default_min_query_len(),
            page_length: default_page_length(),
            term_frequency: default_term_frequency(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("dist/pagefind/search-index.json")
}
fn default_debounce_ms() -> u64 {
    300
}
fn default_max_results() -> usize {
    10
}
fn default_min_query_len() -> usize {
    2
}
fn default_page_length() -> f64 {
    0.5
}
fn default_term_frequency() -> f64 {
    1.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    #[serde(default = "default_site_url")]
    pub url: String,
    #[serde(default = "default_site_title")]
    pub title: String,
    #[serde(default = "default_site_description")]
    pub description: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_author")]
    pub author: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            url: default_site_url(),
            title: default_site_title(),
            description: default_site_description(),
            language: default_language(),
            author: default_author(),
        }
    }
}

fn default_site_url() -> String {
    "https://neurohackingly.com".to_string()
}
fn default_site_title() -> String {
    "Neurohackingly Blog".to_string()
}
fn default_site_description() -> String {
    "Practical strategies and insights on productivity, AI, neuroscience, and personal growth"
        .to_string()
}
fn default_language() -> String {
    "en-us".to_string()
}
pub(crate) fn default_author() -> String {
    "Lukas Zangerl".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:4321".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsletterConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub form_id: Option<String>,
    #[serde(default)]
    pub tag_id: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_hits")]
    pub max_hits: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NewsletterConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            form_id: None,
            tag_id: None,
            api_secret: None,
            api_key: None,
            window_secs: default_window_secs(),
            max_hits: default_max_hits(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.convertkit.com/v3".to_string()
}
fn default_window_secs() -> u64 {
    60
}
fn default_max_hits() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    10
}

impl NewsletterConfig {
    /// Overlays `KIT_*` environment variables on top of the file values.
    pub fn apply_env(&mut self) {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        if let Some(v) = read("KIT_FORM_ID") {
            self.form_id = Some(v);
        }
        if let Some(v) = read("KIT_TAG_ID") {
            self.tag_id = Some(v);
        }
        if let Some(v) = read("KIT_API_SECRET") {
            self.api_secret = Some(v);
        }
        if let Some(v) = read("KIT_API_KEY") {
            self.api_key = Some(v);
        }
    }
}

impl Config {
    /// Configuration used by commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            content: ContentConfig {
                root: PathBuf::from("src/content/blog"),
                include_globs: default_include_globs(),
                exclude_globs: Vec::new(),
            },
            search: SearchConfig::default(),
            site: SiteConfig::default(),
            server: ServerConfig::default(),
            newsletter: NewsletterConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.newsletter.apply_env();

    // Validate search
    if config.search.max_results == 0 {
        anyhow::bail!("search.max_results must be > 0");
    }
    if config.search.min_query_len == 0 {
        anyhow::bail!("search.min_query_len must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.search.page_length) {
        anyhow::bail!("search.page_length must be in [0.0, 1.0]");
    }
    if !(0.0..=1.0).contains(&config.search.term_frequency) {
        anyhow::bail!("search.term_frequency must be in [0.0, 1.0]");
    }

    // Validate newsletter
    if config.newsletter.window_secs == 0 {
        anyhow::bail!("newsletter.window_secs must be > 0");
    }
    if config.newsletter.max_hits == 0 {
        anyhow::bail!("newsletter.max_hits must be > 0");
    }

    if !config.site.url.starts_with("http://") && !config.site.url.starts_with("https://") {
        anyhow::bail!(
            "site.url must be an absolute http(s) URL, got '{}'",
            config.site.url
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("site.toml");
        std::fs::write(&path, body).unwrap();
        (tmp, path)
    }

    #[test]
    fn test_defaults_applied() {
        let (_tmp, path) = write_config("[content]\nroot = \"posts\"\n");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.search.debounce_ms, 300);
        assert_eq!(cfg.search.max_results, 10);
        assert_eq!(cfg.search.min_query_len, 2);
        assert!((cfg.search.page_length - 0.5).abs() < f64::EPSILON);
        assert!((cfg.search.term_frequency - 1.0).abs() < f64::EPSILON);
        assert_eq!(cfg.newsletter.window_secs, 60);
        assert_eq!(cfg.newsletter.max_hits, 5);
        assert_eq!(cfg.site.language, "en-us");
    }

    #[test]
    fn test_rejects_out_of_range_ranking() {
        let (_tmp, path) =
            write_config("[content]\nroot = \"posts\"\n[search]\npage_length = 1.5\n");
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("page_length"));
    }

    #[test]
    fn test_rejects_relative_site_url() {
        let (_tmp, path) = write_config("[content]\nroot = \"posts\"\n[site]\nurl = \"example.com\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = load_config(Path::new("/nonexistent/site.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
