//! Image dimension resolution.
//!
//! Dimensions come from three sources, tried in order:
//! 1. Caller-supplied [`SizeHints`] for the pass
//! 2. Dimensions recorded on a known [`Attachment`](crate::Attachment)
//! 3. The external [`SizeProber`], for crawlable URLs when crawling is enabled
//!
//! [`SizeCache`] resolves every distinct URL of a pass exactly once, so the
//! prober never sees the same URL twice within one `process` call.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::attachments::AttachmentStore;
use crate::uri::is_valid_image_uri;
use crate::workers::WorkerPool;

/// Pixel size of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either side is larger than `limit`.
    #[must_use]
    pub fn exceeds(self, limit: u32) -> bool {
        self.width > limit || self.height > limit
    }

    /// Scale down to fit a `max` x `max` square, keeping the aspect ratio.
    ///
    /// Sizes already inside the square are returned as is. Scaled sides are
    /// rounded down but never reach zero.
    #[must_use]
    pub fn fit_within(self, max: u32) -> Self {
        if max == 0 || !self.exceeds(max) {
            return self;
        }
        let larger = u64::from(self.width.max(self.height));
        let scale = |side: u32| {
            let scaled = u64::from(side) * u64::from(max) / larger;
            u32::try_from(scaled).unwrap_or(max).max(1)
        };
        Self::new(scale(self.width), scale(self.height))
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Caller-supplied sizes keyed by exact image URL.
pub type SizeHints = HashMap<String, Dimensions>;

/// Failure of the external dimension probe.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Transport failure or unexpected HTTP status.
    #[error("HTTP error: {0}")]
    Http(String),
    /// Reading the response body failed.
    #[error("I/O error: {0}")]
    Io(String),
    /// The fetched bytes are not a recognized image header.
    #[error("unrecognized image format")]
    UnknownFormat,
    /// No prober is configured.
    #[error("size probing is disabled")]
    Disabled,
}

/// External service that measures a remote image.
pub trait SizeProber: Send + Sync {
    /// Fetch enough of `url` to read its pixel size.
    fn probe_size(&self, url: &str) -> Result<Dimensions, ProbeError>;
}

/// Prober that never resolves anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProber;

impl SizeProber for NullProber {
    fn probe_size(&self, _url: &str) -> Result<Dimensions, ProbeError> {
        Err(ProbeError::Disabled)
    }
}

/// Resolves the natural size of an image reference.
pub trait DimensionResolver: Send + Sync {
    /// `None` means no source knows the size; the image is left untouched.
    fn resolve(&self, url: &str, hints: &SizeHints) -> Option<Dimensions>;
}

/// Production resolver: hints, then attachment records, then the prober.
pub struct ChainResolver {
    store: Arc<dyn AttachmentStore>,
    prober: Arc<dyn SizeProber>,
    crawl_images: bool,
    probes: AtomicUsize,
    probe_failures: AtomicUsize,
}

impl ChainResolver {
    #[must_use]
    pub fn new(
        store: Arc<dyn AttachmentStore>,
        prober: Arc<dyn SizeProber>,
        crawl_images: bool,
    ) -> Self {
        Self {
            store,
            prober,
            crawl_images,
            probes: AtomicUsize::new(0),
            probe_failures: AtomicUsize::new(0),
        }
    }

    /// Number of prober calls made so far.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }

    /// Number of prober calls that failed.
    pub fn probe_failures(&self) -> usize {
        self.probe_failures.load(Ordering::Relaxed)
    }

    fn probe(&self, url: &str) -> Option<Dimensions> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        match self.prober.probe_size(url) {
            Ok(dimensions) => {
                tracing::debug!(url = %url, size = %dimensions, "Probed image size");
                Some(dimensions)
            }
            Err(e) => {
                self.probe_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(url = %url, error = %e, "Failed to probe image size");
                None
            }
        }
    }
}

impl fmt::Debug for ChainResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainResolver")
            .field("crawl_images", &self.crawl_images)
            .field("probes", &self.probes())
            .finish_non_exhaustive()
    }
}

impl DimensionResolver for ChainResolver {
    fn resolve(&self, url: &str, hints: &SizeHints) -> Option<Dimensions> {
        if let Some(&dimensions) = hints.get(url) {
            return Some(dimensions);
        }

        if let Some(dimensions) = self
            .store
            .find_by_url(url)
            .and_then(|attachment| attachment.dimensions)
        {
            return Some(dimensions);
        }

        if !self.crawl_images {
            tracing::debug!(url = %url, "Image crawling disabled, size unresolved");
            return None;
        }

        let validity = is_valid_image_uri(url);
        if !validity.is_crawlable() {
            tracing::debug!(url = %url, validity = ?validity, "Image URI not crawlable");
            return None;
        }

        self.probe(url)
    }
}

/// Pass-scoped results of resolving each distinct image URL once.
#[derive(Debug, Default)]
pub struct SizeCache {
    entries: HashMap<String, Option<Dimensions>>,
}

impl SizeCache {
    /// Resolve every distinct URL in `urls` with `resolver`.
    ///
    /// Lookups run on `pool`; each distinct URL reaches the resolver once.
    pub fn resolve_all(
        urls: &[String],
        resolver: &dyn DimensionResolver,
        hints: &SizeHints,
        pool: &WorkerPool,
    ) -> Self {
        let mut seen = HashSet::new();
        let distinct: Vec<&String> = urls.iter().filter(|url| seen.insert(*url)).collect();

        let resolved = pool.map(&distinct, |url| resolver.resolve(url, hints));

        let entries = distinct
            .into_iter()
            .cloned()
            .zip(resolved)
            .collect();
        Self { entries }
    }

    /// Resolved size of `url`; `None` when unresolved or never requested.
    pub fn get(&self, url: &str) -> Option<Dimensions> {
        self.entries.get(url).copied().flatten()
    }

    /// Number of distinct URLs looked up.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
