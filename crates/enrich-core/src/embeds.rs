//! Embed enrichment.
//!
//! Standalone links to embeddable content (videos, tweets, gists) are sent to
//! an external embedding service and replaced by the markup it returns.
//!
//! A link is standalone when the renderer flagged it with a container class
//! (`onebox`), or when it is the only content of its paragraph and its text is
//! the bare URL. In the second case the paragraph is replaced as well, so the
//! embed markup is never wrapped in a `<p>`.

use std::collections::HashMap;

use kuchikiki::NodeRef;

use crate::document::DocumentId;
use crate::html;
use crate::settings::EmbedSettings;
use crate::workers::WorkerPool;

/// A request to the embedding service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedRequest {
    /// Link target to embed.
    pub url: String,
    /// Document the link appears in.
    pub document_id: DocumentId,
    /// Bypass the service's own cache.
    pub invalidate: bool,
}

/// Failure of the embedding service.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Transport failure or unexpected HTTP status.
    #[error("HTTP error: {0}")]
    Http(String),
    /// Reading the response failed.
    #[error("I/O error: {0}")]
    Io(String),
    /// The service answered with something that is not UTF-8 text.
    #[error("response is not valid UTF-8")]
    InvalidUtf8,
}

/// External service turning a URL into rich embed markup.
pub trait Embedder: Send + Sync {
    /// Markup for `request.url`, or `None` when the URL cannot be embedded.
    fn embed(&self, request: &EmbedRequest) -> Result<Option<String>, EmbedError>;
}

/// Embedder that never embeds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmbedder;

impl Embedder for NullEmbedder {
    fn embed(&self, _request: &EmbedRequest) -> Result<Option<String>, EmbedError> {
        Ok(None)
    }
}

/// Result of embedding the links of one tree.
#[derive(Default)]
pub(crate) struct EmbedOutcome {
    /// Top-level nodes inserted from embed markup.
    pub roots: Vec<NodeRef>,
    pub replaced: usize,
    pub failed: usize,
    pub empty: usize,
}

/// Links under `root` that should be sent to the embedding service.
fn candidates(root: &NodeRef, settings: &EmbedSettings) -> Vec<(NodeRef, String)> {
    html::select_all(root, "a[href]")
        .into_iter()
        .filter_map(|link| {
            let href = html::attr(&link, "href")?;
            is_candidate(&link, &href, settings).then_some((link, href))
        })
        .collect()
}

fn is_candidate(link: &NodeRef, href: &str, settings: &EmbedSettings) -> bool {
    if !settings.matcher.matches(href) {
        return false;
    }
    // Links inside existing embed markup belong to that markup.
    if link.ancestors().any(|ancestor| settings.is_container(&ancestor)) {
        return false;
    }
    settings.is_container(link) || is_bare_paragraph_link(link, href)
}

fn is_bare_paragraph_link(link: &NodeRef, href: &str) -> bool {
    html::sole_child_paragraph(link).is_some() && link.text_contents().trim() == href
}

/// Replace embeddable links under `root` with embed markup.
///
/// The service is called once per distinct URL, on `pool`. Replacements are
/// applied in document order once every call has returned.
pub(crate) fn embed_links(
    root: &NodeRef,
    settings: &EmbedSettings,
    embedder: &dyn Embedder,
    document_id: DocumentId,
    invalidate: bool,
    pool: &WorkerPool,
) -> EmbedOutcome {
    let mut outcome = EmbedOutcome::default();
    let links = candidates(root, settings);
    if links.is_empty() {
        return outcome;
    }

    let mut requests: Vec<EmbedRequest> = Vec::new();
    for (_, url) in &links {
        if !requests.iter().any(|request| &request.url == url) {
            requests.push(EmbedRequest {
                url: url.clone(),
                document_id,
                invalidate,
            });
        }
    }

    let responses = pool.map(&requests, |request| embedder.embed(request));

    let mut markup: HashMap<&str, String> = HashMap::new();
    for (request, response) in requests.iter().zip(responses) {
        match response {
            Ok(Some(fragment)) if !fragment.trim().is_empty() => {
                markup.insert(request.url.as_str(), fragment);
            }
            Ok(_) => {
                outcome.empty += 1;
                tracing::debug!(url = %request.url, "No embed markup returned");
            }
            Err(e) => {
                outcome.failed += 1;
                tracing::warn!(url = %request.url, error = %e, "Failed to fetch embed");
            }
        }
    }

    for (link, url) in links {
        let Some(fragment) = markup.get(url.as_str()) else {
            continue;
        };
        let nodes = html::fragment(fragment);
        if nodes.is_empty() {
            continue;
        }
        let target = html::sole_child_paragraph(&link).unwrap_or(link);
        html::replace_with(&target, &nodes);
        tracing::debug!(url = %url, nodes = nodes.len(), "Replaced link with embed");
        outcome.replaced += 1;
        outcome.roots.extend(nodes);
    }

    outcome
}
