//! Post-render HTML enrichment.
//!
//! This crate rewrites the rendered HTML of a post after markdown rendering:
//! - Standalone links to embeddable content are replaced by markup from an
//!   external embedding service
//! - Images get `width`/`height` from size hints, attachment records or a
//!   remote probe
//! - Oversized images become links, or lightboxes for local uploads
//! - The document's attachment references are recomputed from the final HTML
//!
//! The pass reports whether the HTML changed so callers only persist real
//! changes. Network access lives behind the [`Embedder`], [`SizeProber`] and
//! [`AttachmentStore`] traits; this crate ships only null implementations and
//! an in-memory store.
//!
//! # Architecture
//!
//! The crate is organized into modules:
//! - [`uri`]: Crawlability check for image references
//! - [`dimensions`]: Size sources, the resolution chain and the per-pass cache
//! - [`attachments`]: Attachment store, per-pass linker and display filenames
//! - [`embeds`]: Embedding service contract and link replacement
//! - [`images`]: Size injection, link conversion and lightbox markup
//! - [`processor`]: `PostProcessor` and the step-wise `Pass`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use enrich_core::{Document, DocumentId, MemoryStore, PostProcessor, ProcessOptions, ProcessorConfig};
//!
//! let store = Arc::new(MemoryStore::new());
//! let processor = PostProcessor::new(ProcessorConfig::default()).store(store);
//!
//! let mut document = Document::new(DocumentId(1), raw, cooked);
//! let options = ProcessOptions::new().with_size_hint("http://a.com/logo.png", 111, 222);
//! let result = processor.process(&mut document, &options);
//! ```

mod attachments;
mod dimensions;
mod document;
mod embeds;
mod html;
mod images;
mod processor;
mod settings;
mod stats;
mod uri;
mod workers;

pub use attachments::{
    Attachment, AttachmentId, AttachmentLinker, AttachmentStore, MemoryStore, NullStore,
    filename_for,
};
pub use dimensions::{
    ChainResolver, DimensionResolver, Dimensions, NullProber, ProbeError, SizeCache, SizeHints,
    SizeProber,
};
pub use document::{Document, DocumentId, ProcessOptions, ProcessingResult};
pub use embeds::{EmbedError, EmbedRequest, Embedder, NullEmbedder};
pub use processor::{Pass, PostProcessor, Stage};
pub use settings::{
    DEFAULT_CONTAINER_CLASSES, DEFAULT_DISPLAY_MAX_DIMENSION, DEFAULT_EMBED_PATTERNS,
    DEFAULT_OVERSIZED_THRESHOLD, DEFAULT_PASTED_IMAGE_FILENAME, EmbedMatcher, EmbedSettings,
    ImageSettings, ProcessorConfig,
};
pub use stats::PassStats;
pub use uri::{UriValidity, absolutize, is_valid_image_uri};
pub use workers::{DEFAULT_WORKERS, WorkerPool};
