//! Post-render enrichment pass.
//!
//! [`PostProcessor`] holds the configuration and the external collaborators.
//! Each call to [`PostProcessor::process`] (or [`PostProcessor::begin`] for
//! step-wise use) runs one independent [`Pass`] over a document:
//!
//! ```text
//! Created -> EmbedsProcessed -> ImagesProcessed -> Serialized
//! ```
//!
//! The HTML tree is owned by the pass and stays on the calling thread.
//! External lookups run on the processor's worker pool and are merged back in
//! document order, so output does not depend on network timing.

use std::sync::Arc;

use kuchikiki::NodeRef;

use crate::attachments::{AttachmentLinker, AttachmentStore, NullStore};
use crate::dimensions::{ChainResolver, DimensionResolver, NullProber, SizeCache, SizeProber};
use crate::document::{Document, DocumentId, ProcessOptions, ProcessingResult};
use crate::embeds::{Embedder, NullEmbedder, embed_links};
use crate::html::{self, HtmlTree};
use crate::images;
use crate::settings::ProcessorConfig;
use crate::stats::PassStats;
use crate::uri::absolutize;
use crate::workers::WorkerPool;

/// Enriches rendered document HTML.
///
/// Defaults to collaborators that resolve nothing; wire real ones with the
/// builder methods.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use enrich_core::{Document, DocumentId, PostProcessor, ProcessOptions, ProcessorConfig};
///
/// let processor = PostProcessor::new(ProcessorConfig::default())
///     .prober(Arc::new(my_prober))
///     .store(Arc::new(my_store));
///
/// let mut document = Document::new(DocumentId(1), raw, html);
/// let result = processor.process(&mut document, &ProcessOptions::default());
/// if result.dirty {
///     save(&document);
/// }
/// ```
pub struct PostProcessor {
    config: ProcessorConfig,
    embedder: Arc<dyn Embedder>,
    prober: Arc<dyn SizeProber>,
    store: Arc<dyn AttachmentStore>,
    resolver: Option<Arc<dyn DimensionResolver>>,
    pool: WorkerPool,
}

impl PostProcessor {
    /// Create a processor with the given configuration.
    pub fn new(config: ProcessorConfig) -> Self {
        let pool = WorkerPool::new(config.workers);
        Self {
            config,
            embedder: Arc::new(NullEmbedder),
            prober: Arc::new(NullProber),
            store: Arc::new(NullStore),
            resolver: None,
            pool,
        }
    }

    /// Set the embedding service client.
    #[must_use]
    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Set the image size prober used by the default resolver.
    #[must_use]
    pub fn prober(mut self, prober: Arc<dyn SizeProber>) -> Self {
        self.prober = prober;
        self
    }

    /// Set the attachment store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn AttachmentStore>) -> Self {
        self.store = store;
        self
    }

    /// Replace the default hints/attachments/prober resolution chain.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn DimensionResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set the number of threads for external lookups.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self.pool = WorkerPool::new(workers);
        self
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Run a complete pass over `document`.
    ///
    /// Updates `document.html` when the pass changed it and records the
    /// attachments the final HTML references.
    pub fn process(&self, document: &mut Document, options: &ProcessOptions) -> ProcessingResult {
        let mut pass = self.begin(document, options);
        pass.process_embeds();
        pass.process_images();
        pass.finish(document)
    }

    /// Start a pass over `document` for step-wise processing.
    pub fn begin<'a>(&'a self, document: &Document, options: &'a ProcessOptions) -> Pass<'a> {
        let tree = HtmlTree::parse(&document.html);
        let baseline = tree.serialize();
        Pass {
            processor: self,
            options,
            document_id: document.id,
            original: document.html.clone(),
            tree,
            baseline,
            embedded: Vec::new(),
            linker: AttachmentLinker::new(self.store.as_ref()),
            stage: Stage::Created,
            dirty: false,
            stats: PassStats::default(),
        }
    }
}

/// Progress of a [`Pass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Created,
    EmbedsProcessed,
    ImagesProcessed,
    Serialized,
}

/// One enrichment pass over one document.
///
/// Steps only move forward; a step whose stage has already been reached is
/// a no-op.
pub struct Pass<'a> {
    processor: &'a PostProcessor,
    options: &'a ProcessOptions,
    document_id: DocumentId,
    original: String,
    tree: HtmlTree,
    /// Serialization of the unmodified input tree.
    baseline: String,
    /// Top-level nodes inserted from embed markup in this pass.
    embedded: Vec<NodeRef>,
    linker: AttachmentLinker<'a>,
    stage: Stage,
    dirty: bool,
    stats: PassStats,
}

impl Pass<'_> {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Whether the pass has changed the HTML so far. Once set, stays set.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Counters for the work done so far.
    pub fn stats(&self) -> &PassStats {
        &self.stats
    }

    /// Current HTML; the input verbatim while the pass is clean.
    pub fn html(&self) -> String {
        if self.dirty {
            self.tree.serialize()
        } else {
            self.original.clone()
        }
    }

    /// Replace embeddable links with embed markup.
    pub fn process_embeds(&mut self) {
        if self.stage >= Stage::EmbedsProcessed {
            tracing::debug!(stage = ?self.stage, "Embeds already processed");
            return;
        }
        let processor = self.processor;
        let outcome = embed_links(
            self.tree.root(),
            &processor.config.embeds,
            processor.embedder.as_ref(),
            self.document_id,
            self.options.invalidate_embeds,
            &processor.pool,
        );
        self.stats.embeds_replaced += outcome.replaced;
        self.stats.embeds_failed += outcome.failed;
        self.stats.embeds_empty += outcome.empty;
        self.embedded.extend(outcome.roots);
        if outcome.replaced > 0 {
            self.update_dirty();
        }
        self.stage = Stage::EmbedsProcessed;
    }

    /// Size images and make oversized ones clickable.
    pub fn process_images(&mut self) {
        if self.stage >= Stage::ImagesProcessed {
            tracing::debug!(stage = ?self.stage, "Images already processed");
            return;
        }
        let processor = self.processor;
        let settings = &processor.config;

        let targets = images::targets(
            self.tree.root(),
            &self.embedded,
            &settings.embeds,
            &mut self.stats,
        );
        let urls: Vec<String> = targets.iter().map(|target| target.src.clone()).collect();

        let chain = ChainResolver::new(
            Arc::clone(&processor.store),
            Arc::clone(&processor.prober),
            settings.images.crawl_images,
        );
        let resolver: &dyn DimensionResolver = processor.resolver.as_deref().unwrap_or(&chain);
        let sizes = SizeCache::resolve_all(&urls, resolver, &self.options.size_hints, &processor.pool);
        self.stats.probes += chain.probes();
        self.stats.probe_failures += chain.probe_failures();

        let modified = images::enrich_images(
            &targets,
            &sizes,
            &settings.images,
            &mut self.linker,
            &mut self.stats,
        );
        if modified {
            self.update_dirty();
        }
        self.stage = Stage::ImagesProcessed;
    }

    /// Serialize, record attachments and update `document`.
    ///
    /// Steps not run yet are skipped, not run.
    pub fn finish(mut self, document: &mut Document) -> ProcessingResult {
        self.stage = Stage::Serialized;

        for node in html::select_all(self.tree.root(), "img[src], a[href]") {
            let reference = html::attr(&node, "src").or_else(|| html::attr(&node, "href"));
            if let Some(url) = reference {
                self.linker.link(&url);
            }
        }

        let first_image = self.first_image();
        let html = self.html();
        if self.dirty {
            document.html.clone_from(&html);
        }
        self.linker.commit(document);

        tracing::info!(
            document = self.document_id.0,
            dirty = self.dirty,
            embeds = self.stats.embeds_replaced,
            images = self.stats.images_sized,
            attachments = document.attachments.len(),
            "Processed document"
        );

        ProcessingResult {
            html,
            dirty: self.dirty,
            first_image,
            stats: self.stats,
        }
    }

    fn first_image(&self) -> Option<String> {
        let embeds = &self.processor.config.embeds;
        let src = html::select_all(self.tree.root(), "img")
            .into_iter()
            .filter(|img| !images::is_embedded(img, &self.embedded, embeds))
            .filter_map(|img| html::attr(&img, "src"))
            .find(|src| !src.trim().is_empty())?;
        Some(absolutize(
            &src,
            self.processor.config.images.base_url.as_deref(),
        ))
    }

    fn update_dirty(&mut self) {
        if !self.dirty && self.tree.serialize() != self.baseline {
            self.dirty = true;
        }
    }
}
