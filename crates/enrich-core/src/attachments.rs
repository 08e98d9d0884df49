//! Document to attachment associations.
//!
//! The [`AttachmentStore`] owns attachment records and the reverse index from
//! documents to the attachments they reference. A pass collects references
//! through an [`AttachmentLinker`] and commits them once, replacing whatever
//! an earlier pass over the same document recorded.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::dimensions::Dimensions;
use crate::document::{Document, DocumentId};

/// Filenames the uploader assigns to clipboard pastes.
const PLACEHOLDER_FILENAMES: [&str; 2] = ["blob", "blob.png"];

/// Identifier of an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(pub u64);

/// An uploaded file referenced from document HTML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    /// URL the file is served from.
    pub url: String,
    /// Name of the file as uploaded; a placeholder for clipboard pastes.
    pub original_filename: String,
    /// Pixel size, when known.
    pub dimensions: Option<Dimensions>,
    /// Size in bytes, when known.
    pub filesize: Option<u64>,
}

impl Attachment {
    #[must_use]
    pub fn new(
        id: AttachmentId,
        url: impl Into<String>,
        original_filename: impl Into<String>,
    ) -> Self {
        Self {
            id,
            url: url.into(),
            original_filename: original_filename.into(),
            dimensions: None,
            filesize: None,
        }
    }

    #[must_use]
    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    #[must_use]
    pub fn with_filesize(mut self, bytes: u64) -> Self {
        self.filesize = Some(bytes);
        self
    }

    /// Whether the filename is the clipboard placeholder.
    pub fn is_pasted(&self) -> bool {
        PLACEHOLDER_FILENAMES
            .iter()
            .any(|placeholder| self.original_filename.eq_ignore_ascii_case(placeholder))
    }
}

/// Storage of attachments and document associations.
pub trait AttachmentStore: Send + Sync {
    /// Find the attachment served from `url`.
    fn find_by_url(&self, url: &str) -> Option<Attachment>;

    /// Make `attachments` the complete list referenced by `document`.
    fn replace_links(&self, document: DocumentId, attachments: &[AttachmentId]);
}

/// Store that knows no attachments and records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl AttachmentStore for NullStore {
    fn find_by_url(&self, _url: &str) -> Option<Attachment> {
        None
    }

    fn replace_links(&self, _document: DocumentId, _attachments: &[AttachmentId]) {}
}

/// In-memory attachment store.
///
/// URL lookups ignore the scheme, so `http://host/a.png`, `https://host/a.png`
/// and `//host/a.png` find the same attachment.
#[derive(Debug, Default)]
pub struct MemoryStore {
    attachments: RwLock<HashMap<String, Attachment>>,
    links: RwLock<HashMap<DocumentId, Vec<AttachmentId>>>,
}

/// Lookup key for a URL: scheme-relative when the URL has an http(s) scheme.
fn url_key(url: &str) -> &str {
    url.strip_prefix("https:")
        .or_else(|| url.strip_prefix("http:"))
        .unwrap_or(url)
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attachment.
    #[must_use]
    pub fn with_attachment(self, attachment: Attachment) -> Self {
        self.insert(attachment);
        self
    }

    /// Add or replace an attachment.
    pub fn insert(&self, attachment: Attachment) {
        self.attachments
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url_key(&attachment.url).to_owned(), attachment);
    }

    /// Attachments currently associated with `document`.
    pub fn links_for(&self, document: DocumentId) -> Vec<AttachmentId> {
        self.links
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&document)
            .cloned()
            .unwrap_or_default()
    }
}

impl AttachmentStore for MemoryStore {
    fn find_by_url(&self, url: &str) -> Option<Attachment> {
        self.attachments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url_key(url))
            .cloned()
    }

    fn replace_links(&self, document: DocumentId, attachments: &[AttachmentId]) {
        let mut links = self.links.write().unwrap_or_else(PoisonError::into_inner);
        if attachments.is_empty() {
            links.remove(&document);
        } else {
            links.insert(document, attachments.to_vec());
        }
    }
}

/// Collects the attachments a document references during one pass.
pub struct AttachmentLinker<'a> {
    store: &'a dyn AttachmentStore,
    found: HashMap<String, Option<Attachment>>,
    linked: Vec<AttachmentId>,
}

impl<'a> AttachmentLinker<'a> {
    pub fn new(store: &'a dyn AttachmentStore) -> Self {
        Self {
            store,
            found: HashMap::new(),
            linked: Vec::new(),
        }
    }

    /// Find the attachment behind `url` without recording a reference.
    pub fn lookup(&mut self, url: &str) -> Option<Attachment> {
        if let Some(found) = self.found.get(url) {
            return found.clone();
        }
        let found = self.store.find_by_url(url);
        self.found.insert(url.to_owned(), found.clone());
        found
    }

    /// Find the attachment behind `url` and record that the document uses it.
    ///
    /// Repeated references to one attachment are recorded once.
    pub fn link(&mut self, url: &str) -> Option<Attachment> {
        let attachment = self.lookup(url)?;
        if !self.linked.contains(&attachment.id) {
            tracing::debug!(url = %url, attachment = attachment.id.0, "Linked attachment");
            self.linked.push(attachment.id);
        }
        Some(attachment)
    }

    /// Attachments recorded so far, in first-reference order.
    pub fn linked(&self) -> &[AttachmentId] {
        &self.linked
    }

    /// Store the recorded references on `document` and in the store.
    pub fn commit(self, document: &mut Document) {
        self.store.replace_links(document.id, &self.linked);
        document.attachments = self.linked;
    }
}

/// Display name for an image, for the lightbox information panel.
///
/// A known attachment gives its original filename, or `pasted_name` for a
/// clipboard paste. Otherwise the last path segment of `fallback_url`.
pub fn filename_for(
    attachment: Option<&Attachment>,
    fallback_url: &str,
    pasted_name: &str,
) -> String {
    match attachment {
        Some(attachment) if attachment.is_pasted() => pasted_name.to_owned(),
        Some(attachment) if !attachment.original_filename.is_empty() => {
            attachment.original_filename.clone()
        }
        _ => basename(fallback_url).to_owned(),
    }
}

fn basename(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let path = path.trim_end_matches('/');
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn upload(id: u64, url: &str, filename: &str) -> Attachment {
        Attachment::new(AttachmentId(id), url, filename)
    }

    #[test]
    fn test_filename_without_upload_is_basename() {
        assert_eq!(
            filename_for(None, "http://cdn.com/uploads/6/4/123.png", "pasted image"),
            "123.png"
        );
        assert_eq!(
            filename_for(None, "//bucket.s3.amazonaws.com/a/b.jpg?v=1#top", "pasted image"),
            "b.jpg"
        );
        assert_eq!(filename_for(None, "plain.gif", "pasted image"), "plain.gif");
    }

    #[test]
    fn test_filename_of_real_upload() {
        let attachment = upload(1, "/uploads/a.png", "holiday.png");
        assert_eq!(
            filename_for(Some(&attachment), "/uploads/a.png", "pasted image"),
            "holiday.png"
        );
    }

    #[test]
    fn test_filename_of_pasted_upload() {
        for placeholder in ["blob", "blob.png", "BLOB.PNG"] {
            let attachment = upload(1, "/uploads/a.png", placeholder);
            assert_eq!(
                filename_for(Some(&attachment), "/uploads/a.png", "pasted image"),
                "pasted image"
            );
        }
    }

    #[test]
    fn test_memory_store_ignores_scheme() {
        let store = MemoryStore::new().with_attachment(upload(
            7,
            "//bucket.s3.amazonaws.com/uploads/6/4/123.png",
            "123.png",
        ));

        for url in [
            "//bucket.s3.amazonaws.com/uploads/6/4/123.png",
            "http://bucket.s3.amazonaws.com/uploads/6/4/123.png",
            "https://bucket.s3.amazonaws.com/uploads/6/4/123.png",
        ] {
            assert_eq!(store.find_by_url(url).map(|a| a.id), Some(AttachmentId(7)));
        }
        assert_eq!(store.find_by_url("/uploads/6/4/123.png"), None);
    }

    #[test]
    fn test_linker_collapses_duplicates() {
        let store = MemoryStore::new()
            .with_attachment(upload(1, "/uploads/a.png", "a.png"))
            .with_attachment(upload(2, "/uploads/b.png", "b.png"));
        let mut linker = AttachmentLinker::new(&store);

        linker.link("/uploads/b.png");
        linker.link("/uploads/a.png");
        linker.link("/uploads/b.png");
        assert_eq!(linker.link("/unknown.png"), None);

        assert_eq!(linker.linked(), [AttachmentId(2), AttachmentId(1)]);
    }

    #[test]
    fn test_lookup_does_not_link() {
        let store = MemoryStore::new().with_attachment(upload(1, "/uploads/a.png", "a.png"));
        let mut linker = AttachmentLinker::new(&store);

        assert!(linker.lookup("/uploads/a.png").is_some());
        assert!(linker.linked().is_empty());
    }

    #[test]
    fn test_commit_replaces_previous_links() {
        let store = MemoryStore::new()
            .with_attachment(upload(1, "/uploads/a.png", "a.png"))
            .with_attachment(upload(2, "/uploads/b.png", "b.png"));
        let mut document = Document::new(DocumentId(3), "", "");

        let mut first = AttachmentLinker::new(&store);
        first.link("/uploads/a.png");
        first.link("/uploads/b.png");
        first.commit(&mut document);
        assert_eq!(store.links_for(DocumentId(3)), [AttachmentId(1), AttachmentId(2)]);

        let mut second = AttachmentLinker::new(&store);
        second.link("/uploads/b.png");
        second.commit(&mut document);

        assert_eq!(store.links_for(DocumentId(3)), [AttachmentId(2)]);
        assert_eq!(document.attachments, [AttachmentId(2)]);
    }

    #[test]
    fn test_commit_empty_clears_links() {
        let store = MemoryStore::new().with_attachment(upload(1, "/uploads/a.png", "a.png"));
        let mut document = Document::new(DocumentId(3), "", "");

        let mut first = AttachmentLinker::new(&store);
        first.link("/uploads/a.png");
        first.commit(&mut document);
        AttachmentLinker::new(&store).commit(&mut document);

        assert!(store.links_for(DocumentId(3)).is_empty());
        assert!(document.attachments.is_empty());
    }
}
