//! Post-render HTML enrichment.
//!
//! This crate wires the pieces of the enrichment pass together:
//! - [`enrich_core`]: the pass itself, run by a [`PostProcessor`]
//! - [`enrich_http`]: HTTP image prober and embedding service client
//! - [`enrich_config`]: `enrich.toml` loading and validation
//!
//! [`processor_from_config`] builds a ready [`PostProcessor`] from a loaded
//! [`Config`]; the attachment store is supplied by the caller since it
//! belongs to the host application.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use enrich::{Config, Document, DocumentId, MemoryStore, ProcessOptions};
//!
//! let config = Config::load(None)?;
//! let processor = enrich::processor_from_config(&config, Arc::new(MemoryStore::new()))?;
//!
//! let mut document = Document::new(DocumentId(1), raw, html);
//! let result = processor.process(&mut document, &ProcessOptions::new());
//! if result.dirty {
//!     save(&document);
//! }
//! ```

use std::sync::Arc;

pub use enrich_config::{CONFIG_FILENAME, Config, ConfigError};
pub use enrich_core::{
    Attachment, AttachmentId, AttachmentStore, DimensionResolver, Dimensions, Document,
    DocumentId, EmbedError, EmbedRequest, Embedder, MemoryStore, NullStore, Pass, PassStats,
    PostProcessor, ProbeError, ProcessOptions, ProcessingResult, ProcessorConfig, SizeHints,
    SizeProber, Stage, UriValidity, filename_for, is_valid_image_uri,
};
pub use enrich_http::{HttpEmbedder, HttpProber, create_agent};

/// Build a processor from `config`.
///
/// Images are probed over HTTP with the `[http]` settings. Embedding is only
/// enabled when `embeds.service_url` is set; without it standalone links are
/// left as they are.
///
/// # Errors
///
/// Returns `ConfigError::Validation` if an embed pattern does not compile.
pub fn processor_from_config(
    config: &Config,
    store: Arc<dyn AttachmentStore>,
) -> Result<PostProcessor, ConfigError> {
    let processor_config = config.processor_config()?;
    let agent = create_agent(config.http.timeout());

    let mut prober = HttpProber::new(agent.clone()).with_max_bytes(config.http.max_probe_bytes);
    if let Some(ref user_agent) = config.http.user_agent {
        prober = prober.with_user_agent(user_agent.as_str());
    }

    let mut processor = PostProcessor::new(processor_config)
        .prober(Arc::new(prober))
        .store(store);

    if let Some(ref service_url) = config.embeds.service_url {
        let mut embedder = HttpEmbedder::new(agent, service_url.as_str());
        if let Some(ref user_agent) = config.http.user_agent {
            embedder = embedder.with_user_agent(user_agent.as_str());
        }
        processor = processor.embedder(Arc::new(embedder));
    }

    tracing::debug!(
        config = ?config.config_path,
        embeds = config.embeds.service_url.is_some(),
        crawl_images = config.images.crawl_images,
        workers = config.workers,
        "Created post processor"
    );

    Ok(processor)
}
