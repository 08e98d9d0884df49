//! Documents and per-pass inputs and outputs.

use crate::attachments::AttachmentId;
use crate::dimensions::{Dimensions, SizeHints};
use crate::stats::PassStats;

/// Identifier of a document (post).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(pub u64);

/// A user-authored document after markup rendering.
///
/// Owned by the caller. A pass updates `html` and `attachments` in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    /// Source markup the HTML was rendered from.
    pub raw: String,
    /// Current rendered HTML.
    pub html: String,
    /// Referenced attachments, by first appearance in `html`.
    pub attachments: Vec<AttachmentId>,
}

impl Document {
    #[must_use]
    pub fn new(id: DocumentId, raw: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            id,
            raw: raw.into(),
            html: html.into(),
            attachments: Vec::new(),
        }
    }
}

/// Options for a single processing pass.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Known image sizes, consulted before any other source.
    pub size_hints: SizeHints,
    /// Ask the embedding service to bypass its cache.
    pub invalidate_embeds: bool,
}

impl ProcessOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a size hint for `url`.
    #[must_use]
    pub fn with_size_hint(mut self, url: impl Into<String>, width: u32, height: u32) -> Self {
        self.size_hints
            .insert(url.into(), Dimensions::new(width, height));
        self
    }

    /// Set whether embed results should be re-fetched.
    #[must_use]
    pub fn with_invalidate_embeds(mut self, invalidate: bool) -> Self {
        self.invalidate_embeds = invalidate;
        self
    }
}

/// Outcome of a processing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingResult {
    /// Final HTML; the input verbatim when nothing changed.
    pub html: String,
    /// Whether `html` differs from the document's HTML before the pass.
    pub dirty: bool,
    /// `src` of the first image outside embed markup.
    pub first_image: Option<String>,
    pub stats: PassStats,
}
