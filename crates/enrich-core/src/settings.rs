//! Processor configuration.
//!
//! [`ProcessorConfig`] is an immutable value handed to
//! [`PostProcessor::new`](crate::PostProcessor::new). Loading it from a file
//! is the job of the configuration crate.

use std::sync::LazyLock;

use regex::Regex;

use crate::workers::DEFAULT_WORKERS;

/// Default bound of the inline display square, in pixels.
pub const DEFAULT_DISPLAY_MAX_DIMENSION: u32 = 690;

/// Default natural size above which an image is oversized, in pixels.
pub const DEFAULT_OVERSIZED_THRESHOLD: u32 = 690;

/// Default display name for clipboard-pasted images.
pub const DEFAULT_PASTED_IMAGE_FILENAME: &str = "pasted image";

/// Default classes marking embed markup and pre-embedded links.
pub const DEFAULT_CONTAINER_CLASSES: [&str; 2] = ["onebox", "onebox-result"];

/// Default embeddable link patterns: common video and media hosts.
pub const DEFAULT_EMBED_PATTERNS: &[&str] = &[
    r"^https?://(?:www\.|m\.)?youtube\.com/watch\?",
    r"^https?://youtu\.be/[\w-]+",
    r"^https?://(?:www\.)?vimeo\.com/\d+",
    r"^https?://(?:www\.|mobile\.)?(?:twitter|x)\.com/\w+/status(?:es)?/\d+",
    r"^https?://gist\.github\.com/[\w-]+/[0-9a-f]+",
    r"^https?://(?:www\.)?soundcloud\.com/[\w-]+/[\w-]+",
    r"^https?://(?:www\.)?flickr\.com/photos/",
];

static DEFAULT_MATCHER: LazyLock<EmbedMatcher> = LazyLock::new(|| {
    EmbedMatcher::new(DEFAULT_EMBED_PATTERNS).expect("invalid default embed pattern")
});

/// Image sizing and overlay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSettings {
    /// Whether remote images may be fetched to learn their size.
    pub crawl_images: bool,
    /// Images are displayed inside a square of this many pixels.
    pub display_max_dimension: u32,
    /// Images wider or taller than this are oversized.
    pub oversized_threshold: u32,
    /// Lightbox filename shown for clipboard pastes.
    pub pasted_image_filename: String,
    /// Site origin used to make root-relative image paths absolute.
    pub base_url: Option<String>,
}

impl Default for ImageSettings {
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

/// Embed detection settings.
#[derive(Debug, Clone)]
pub struct EmbedSettings {
    /// Classes of embed containers; images inside keep their presentation.
    /// A link carrying one of them was flagged for embedding by the renderer.
    pub container_classes: Vec<String>,
    /// Which link targets the embedding service is asked about.
    pub matcher: EmbedMatcher,
}

impl EmbedSettings {
    /// Whether the element carries one of the container classes.
    pub(crate) fn is_container(&self, node: &kuchikiki::NodeRef) -> bool {
        self.container_classes
            .iter()
            .any(|class| crate::html::has_class(node, class))
    }
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            container_classes: DEFAULT_CONTAINER_CLASSES
                .iter()
                .map(|&class| class.to_owned())
                .collect(),
            matcher: EmbedMatcher::default(),
        }
    }
}

/// Matches URLs against embeddable-content patterns.
///
/// An empty pattern list matches every `http`/`https` URL.
#[derive(Debug, Clone)]
pub struct EmbedMatcher {
    patterns: Vec<Regex>,
}

impl EmbedMatcher {
    /// Compile `patterns`.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|pattern| Regex::new(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Matcher accepting every http(s) URL.
    pub fn any() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Whether `url` should be sent to the embedding service.
    pub fn matches(&self, url: &str) -> bool {
        if self.patterns.is_empty() {
            return url.starts_with("http://") || url.starts_with("https://");
        }
        self.patterns.iter().any(|pattern| pattern.is_match(url))
    }
}

impl Default for EmbedMatcher {
    fn default() -> Self {
        DEFAULT_MATCHER.clone()
    }
}

/// Everything a [`PostProcessor`](crate::PostProcessor) needs to know.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub images: ImageSettings,
    pub embeds: EmbedSettings,
    /// Threads for external lookups; `0` or `1` runs them sequentially.
    pub workers: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            images: ImageSettings::default(),
            embeds: EmbedSettings::default(),
            workers: DEFAULT_WORKERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matcher_accepts_video_hosts() {
        let matcher = EmbedMatcher::default();
        assert!(matcher.matches("http://www.youtube.com/watch?v=9bZkp7q19f0"));
        assert!(matcher.matches("https://youtu.be/9bZkp7q19f0"));
        assert!(matcher.matches("https://vimeo.com/12345"));
        assert!(matcher.matches("https://twitter.com/someone/status/123"));
        assert!(matcher.matches("https://gist.github.com/someone/0a1b2c"));
    }

    #[test]
    fn test_default_matcher_rejects_other_links() {
        let matcher = EmbedMatcher::default();
        assert!(!matcher.matches("http://example.com/article"));
        assert!(!matcher.matches("https://www.youtube.com/"));
        assert!(!matcher.matches("ftp://youtube.com/watch?v=1"));
    }

    #[test]
    fn test_empty_matcher_accepts_http_only() {
        let matcher = EmbedMatcher::any();
        assert!(matcher.matches("http://example.com/article"));
        assert!(matcher.matches("https://example.com"));
        assert!(!matcher.matches("mailto:someone@example.com"));
        assert!(!matcher.matches("/relative"));
    }

    #[test]
    fn test_custom_patterns() {
        let matcher = EmbedMatcher::new(&[r"^https://video\.example\.com/"]).unwrap();
        assert!(matcher.matches("https://video.example.com/v/1"));
        assert!(!matcher.matches("http://www.youtube.com/watch?v=1"));
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        assert!(EmbedMatcher::new(&["(unclosed"]).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = ProcessorConfig::default();
        assert_eq!(config.images.display_max_dimension, 690);
        assert_eq!(config.images.oversized_threshold, 690);
        assert_eq!(config.images.pasted_image_filename, "pasted image");
        assert!(config.images.crawl_images);
        assert_eq!(config.embeds.container_classes, ["onebox", "onebox-result"]);
        assert_eq!(config.workers, 4);
    }
}
