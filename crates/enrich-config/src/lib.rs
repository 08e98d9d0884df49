//! Configuration management for enrich.
//!
//! Parses `enrich.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories. A loaded [`Config`]
//! turns into the immutable [`ProcessorConfig`] the pass runs with via
//! [`Config::processor_config`].
//!
//! ```toml
//! workers = 4
//!
//! [images]
//! crawl_images = true
//! display_max_dimension = 690
//! oversized_threshold = 690
//! base_url = "https://forum.example.com"
//!
//! [embeds]
//! service_url = "${EMBED_SERVICE_URL:-http://localhost:3000/onebox}"
//! classes = ["onebox"]
//!
//! [http]
//! timeout_secs = 10
//! ```
//!
//! ## Environment Variable Expansion
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `images.base_url`
//! - `embeds.service_url`
//! - `http.user_agent`

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use enrich_core::{
    DEFAULT_CONTAINER_CLASSES, DEFAULT_DISPLAY_MAX_DIMENSION, DEFAULT_OVERSIZED_THRESHOLD,
    DEFAULT_PASTED_IMAGE_FILENAME, DEFAULT_WORKERS, EmbedMatcher, EmbedSettings, ImageSettings,
    ProcessorConfig,
};
use serde::Deserialize;

/// Configuration filename to search for.
pub const CONFIG_FILENAME: &str = "enrich.toml";

/// Upper bound for `workers`.
const MAX_WORKERS: usize = 64;

/// Enrichment configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Threads for external lookups; `0` or `1` runs them sequentially.
    pub workers: usize,
    /// Image sizing and lightbox settings.
    pub images: ImagesConfig,
    /// Embedding service settings.
    pub embeds: EmbedsConfig,
    /// Settings shared by outgoing HTTP calls.
    pub http: HttpConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            images: ImagesConfig::default(),
            embeds: EmbedsConfig::default(),
            http: HttpConfig::default(),
            config_path: None,
        }
    }
}

/// `[images]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Fetch remote images whose size is otherwise unknown.
    pub crawl_images: bool,
    /// Images are displayed inside a square of this many pixels.
    pub display_max_dimension: u32,
    /// Images larger than this in either direction get a lightbox or link.
    pub oversized_threshold: u32,
    /// Name shown for clipboard-pasted images.
    pub pasted_image_filename: String,
    /// Site origin for root-relative image paths.
    pub base_url: Option<String>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            crawl_images: true,
            display_max_dimension: DEFAULT_DISPLAY_MAX_DIMENSION,
            oversized_threshold: DEFAULT_OVERSIZED_THRESHOLD,
            pasted_image_filename: DEFAULT_PASTED_IMAGE_FILENAME.to_owned(),
            base_url: None,
        }
    }
}

/// `[embeds]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EmbedsConfig {
    /// Embedding service endpoint. Embedding is disabled when unset.
    pub service_url: Option<String>,
    /// Classes marking embed containers.
    pub classes: Vec<String>,
    /// Embeddable URL patterns (regexes). Unset uses the built-in list;
    /// an empty list accepts every http(s) URL.
    pub patterns: Option<Vec<String>>,
}

impl Default for EmbedsConfig {
    fn default() -> Self {
        Self {
            service_url: None,
            classes: DEFAULT_CONTAINER_CLASSES
                .iter()
                .map(|&class| class.to_owned())
                .collect(),
            patterns: None,
        }
    }
}

/// `[http]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout for a single outgoing call, in seconds.
    pub timeout_secs: u64,
    /// `User-Agent` header. Unset uses the client default.
    pub user_agent: Option<String>,
    /// How much of an image is downloaded to read its size.
    pub max_probe_bytes: u64,
}

impl HttpConfig {
    /// Timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: None,
            max_probe_bytes: 64 * 1024,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`embeds.service_url`").
        field: String,
        /// Error message (e.g., "${`EMBED_URL`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

/// Require a numeric field to be positive.
fn require_positive(value: u64, field: &str) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be greater than 0"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `enrich.toml` in the current directory and its parents, falling
    /// back to defaults when none exists.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist, or if reading,
    /// parsing, expansion or validation fails.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)
        } else {
            Ok(Self::default())
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;
        config.config_path = Some(path.to_path_buf());
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers > MAX_WORKERS {
            return Err(ConfigError::Validation(format!(
                "workers cannot exceed {MAX_WORKERS}"
            )));
        }
        self.validate_images()?;
        self.validate_embeds()?;
        self.validate_http()?;
        Ok(())
    }

    fn validate_images(&self) -> Result<(), ConfigError> {
        let images = &self.images;
        require_positive(
            u64::from(images.display_max_dimension),
            "images.display_max_dimension",
        )?;
        require_positive(
            u64::from(images.oversized_threshold),
            "images.oversized_threshold",
        )?;
        if let Some(ref base_url) = images.base_url {
            require_non_empty(base_url, "images.base_url")?;
            require_http_url(base_url, "images.base_url")?;
        }
        Ok(())
    }

    fn validate_embeds(&self) -> Result<(), ConfigError> {
        if let Some(ref service_url) = self.embeds.service_url {
            require_non_empty(service_url, "embeds.service_url")?;
            require_http_url(service_url, "embeds.service_url")?;
        }
        self.embed_matcher()?;
        Ok(())
    }

    fn validate_http(&self) -> Result<(), ConfigError> {
        require_positive(self.http.timeout_secs, "http.timeout_secs")?;
        require_positive(self.http.max_probe_bytes, "http.max_probe_bytes")?;
        if let Some(ref user_agent) = self.http.user_agent {
            require_non_empty(user_agent, "http.user_agent")?;
        }
        Ok(())
    }

    /// Compile the configured embed patterns.
    fn embed_matcher(&self) -> Result<EmbedMatcher, ConfigError> {
        match self.embeds.patterns {
            None => Ok(EmbedMatcher::default()),
            Some(ref patterns) => EmbedMatcher::new(patterns)
                .map_err(|e| ConfigError::Validation(format!("embeds.patterns: {e}"))),
        }
    }

    /// Settings for a `PostProcessor`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if an embed pattern does not compile.
    pub fn processor_config(&self) -> Result<ProcessorConfig, ConfigError> {
        let images = &self.images;
        Ok(ProcessorConfig {
            images: ImageSettings {
                crawl_images: images.crawl_images,
                display_max_dimension: images.display_max_dimension,
                oversized_threshold: images.oversized_threshold,
                pasted_image_filename: images.pasted_image_filename.clone(),
                base_url: images.base_url.clone(),
            },
            embeds: EmbedSettings {
                container_classes: self.embeds.classes.clone(),
                matcher: self.embed_matcher()?,
            },
            workers: self.workers,
        })
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        expand::expand_opt(&mut self.images.base_url, "images.base_url")?;
        expand::expand_opt(&mut self.embeds.service_url, "embeds.service_url")?;
        expand::expand_opt(&mut self.http.user_agent, "http.user_agent")?;
        Ok(())
    }
}
