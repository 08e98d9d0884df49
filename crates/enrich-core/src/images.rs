//! Image enrichment.
//!
//! Every image with a resolvable natural size gets `width`/`height`
//! attributes for its display size. Oversized images that had to be scaled
//! down become clickable: local uploads get lightbox markup with an
//! information panel, other images are wrapped in a plain link to the
//! original.
//!
//! The image `src` is never rewritten.

use kuchikiki::NodeRef;

use crate::attachments::{Attachment, AttachmentLinker, filename_for};
use crate::dimensions::{Dimensions, SizeCache};
use crate::html;
use crate::settings::{EmbedSettings, ImageSettings};
use crate::stats::PassStats;

/// An image selected for enrichment.
pub(crate) struct ImageTarget {
    pub node: NodeRef,
    pub src: String,
}

/// Whether the image is part of embed markup and keeps its own presentation.
pub(crate) fn is_embedded(img: &NodeRef, embedded_roots: &[NodeRef], embeds: &EmbedSettings) -> bool {
    img.inclusive_ancestors()
        .any(|node| embedded_roots.contains(&node) || embeds.is_container(&node))
}

/// Whether nothing is left to do for the image: both dimensions are set and
/// it already sits inside a link, so it can neither be sized nor linked.
fn is_settled(img: &NodeRef) -> bool {
    html::attr(img, "width").is_some()
        && html::attr(img, "height").is_some()
        && img.ancestors().any(|node| html::is_element(&node, "a"))
}

/// Images under `root` to enrich, in document order.
///
/// Images inside embed markup or without a `src` are counted as skipped.
/// Settled images are left out so their sizes are not looked up again.
pub(crate) fn targets(
    root: &NodeRef,
    embedded_roots: &[NodeRef],
    embeds: &EmbedSettings,
    stats: &mut PassStats,
) -> Vec<ImageTarget> {
    let mut targets = Vec::new();
    for node in html::select_all(root, "img") {
        let src = html::attr(&node, "src").unwrap_or_default();
        if src.trim().is_empty() {
            tracing::debug!("Skipping image without src");
            stats.images_skipped += 1;
            continue;
        }
        if is_embedded(&node, embedded_roots, embeds) {
            tracing::debug!(src = %src, "Skipping image inside embed markup");
            stats.images_skipped += 1;
            continue;
        }
        if is_settled(&node) {
            tracing::debug!(src = %src, "Image already sized and linked");
            stats.images_settled += 1;
            continue;
        }
        targets.push(ImageTarget { node, src });
    }
    targets
}

/// Enrich every target whose size is in `sizes`.
///
/// Returns whether any element was modified.
pub(crate) fn enrich_images(
    targets: &[ImageTarget],
    sizes: &SizeCache,
    settings: &ImageSettings,
    linker: &mut AttachmentLinker<'_>,
    stats: &mut PassStats,
) -> bool {
    let mut modified = false;
    for target in targets {
        let Some(natural) = sizes.get(&target.src) else {
            tracing::debug!(src = %target.src, "Image size unresolved");
            stats.images_unresolved += 1;
            continue;
        };
        stats.images_sized += 1;
        let display = natural.fit_within(settings.display_max_dimension);
        match inject_size(&target.node, display) {
            SizeUpdate::Added => modified = true,
            SizeUpdate::Unchanged => {}
            SizeUpdate::Partial => {
                tracing::debug!(
                    src = %target.src,
                    width = ?html::attr(&target.node, "width"),
                    height = ?html::attr(&target.node, "height"),
                    "Could not derive missing image dimension"
                );
                stats.images_partial_size += 1;
            }
        }

        if !is_enlargeable(&target.node, natural, settings) {
            continue;
        }
        if let Some(attachment) = linker.lookup(&target.src) {
            add_lightbox(&target.node, &target.src, natural, &attachment, settings);
            stats.lightboxes += 1;
        } else {
            convert_to_link(&target.node, &target.src);
            stats.links_converted += 1;
        }
        modified = true;
    }
    modified
}

/// Whether the image should become clickable to show its full size.
///
/// It must be oversized, displayed smaller than its natural size and not
/// already inside a link. Uploads then get a lightbox, anything else a link.
pub(crate) fn is_enlargeable(img: &NodeRef, natural: Dimensions, settings: &ImageSettings) -> bool {
    natural.exceeds(settings.oversized_threshold)
        && natural.fit_within(settings.display_max_dimension) != natural
        && !img.ancestors().any(|node| html::is_element(&node, "a"))
}

/// Parse a dimension attribute such as `300` or `300px`.
fn parse_pixels(value: &str) -> Option<u32> {
    let value = value.trim();
    value
        .strip_suffix("px")
        .unwrap_or(value)
        .trim()
        .parse()
        .ok()
}

/// Outcome of [`inject_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SizeUpdate {
    Added,
    Unchanged,
    /// One dimension was explicit but could not be used to derive the other.
    Partial,
}

/// Add the missing `width`/`height` attributes for `display`.
///
/// Explicit attributes are kept. With only one of them set, the other is
/// derived from it using the image's aspect ratio.
fn inject_size(img: &NodeRef, display: Dimensions) -> SizeUpdate {
    let width = html::attr(img, "width");
    let height = html::attr(img, "height");

    let (new_width, new_height) = match (width.as_deref(), height.as_deref()) {
        (None, None) => (Some(display.width), Some(display.height)),
        (Some(width), None) => {
            let derived = parse_pixels(width)
                .and_then(|w| scale_side(w, display.height, display.width));
            (None, derived)
        }
        (None, Some(height)) => {
            let derived = parse_pixels(height)
                .and_then(|h| scale_side(h, display.width, display.height));
            (derived, None)
        }
        (Some(_), Some(_)) => (None, None),
    };

    let complete = width.is_some() && height.is_some();
    if let Some(width) = new_width {
        html::set_attr(img, "width", width.to_string());
    }
    if let Some(height) = new_height {
        html::set_attr(img, "height", height.to_string());
    }
    if new_width.is_some() || new_height.is_some() {
        SizeUpdate::Added
    } else if complete {
        SizeUpdate::Unchanged
    } else {
        SizeUpdate::Partial
    }
}

/// `known * numerator / denominator`, rounded down.
fn scale_side(known: u32, numerator: u32, denominator: u32) -> Option<u32> {
    if denominator == 0 {
        return None;
    }
    let scaled = u64::from(known) * u64::from(numerator) / u64::from(denominator);
    u32::try_from(scaled).ok()
}

/// Wrap the image in a link to its original.
fn convert_to_link(img: &NodeRef, src: &str) {
    tracing::debug!(src = %src, "Converting oversized image to link");
    html::wrap(img, &html::new_element("a", &[("href", src)]));
}

/// Wrap the image in lightbox markup with an information panel.
fn add_lightbox(
    img: &NodeRef,
    src: &str,
    natural: Dimensions,
    attachment: &Attachment,
    settings: &ImageSettings,
) {
    tracing::debug!(src = %src, attachment = attachment.id.0, "Adding lightbox");

    let link = html::new_element("a", &[("href", src), ("class", "lightbox")]);
    html::wrap(img, &link);
    html::wrap(&link, &html::new_element("div", &[("class", "lightbox-wrapper")]));

    let filename = filename_for(Some(attachment), src, &settings.pasted_image_filename);
    let mut informations = natural.to_string();
    if let Some(bytes) = attachment.filesize {
        informations.push(' ');
        informations.push_str(&human_size(bytes));
    }

    let meta = html::new_element("div", &[("class", "meta")]);
    meta.append(span("filename", &filename));
    meta.append(span("informations", &informations));
    meta.append(span("expand", ""));
    link.append(meta);
}

fn span(class: &str, text: &str) -> NodeRef {
    let span = html::new_element("span", &[("class", class)]);
    if !text.is_empty() {
        span.append(NodeRef::new_text(text));
    }
    span
}

/// Human-readable byte count: `512 B`, `1.5 KB`, `2.0 MB`.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::{AttachmentId, MemoryStore, NullStore};
    use crate::dimensions::{DimensionResolver, SizeHints};
    use crate::html::HtmlTree;
    use crate::workers::WorkerPool;
    use pretty_assertions::assert_eq;

    /// Resolver returning the same size for every URL.
    struct FixedSize(Dimensions);

    impl DimensionResolver for FixedSize {
        fn resolve(&self, _url: &str, _hints: &SizeHints) -> Option<Dimensions> {
            Some(self.0)
        }
    }

    fn enrich(html: &str, size: Option<Dimensions>, store: &MemoryStore) -> (String, PassStats) {
        let tree = HtmlTree::parse(html);
        let mut stats = PassStats::default();
        let targets = targets(tree.root(), &[], &EmbedSettings::default(), &mut stats);
        let urls: Vec<String> = targets.iter().map(|t| t.src.clone()).collect();
        let sizes = match size {
            Some(size) => SizeCache::resolve_all(
                &urls,
                &FixedSize(size),
                &SizeHints::new(),
                &WorkerPool::sequential(),
            ),
            None => SizeCache::default(),
        };
        let mut linker = AttachmentLinker::new(store);
        enrich_images(&targets, &sizes, &ImageSettings::default(), &mut linker, &mut stats);
        (tree.serialize(), stats)
    }

    #[test]
    fn test_small_image_gets_size_only() {
        let (html, stats) = enrich(
            r#"<p><img src="http://hello.com/image.png"></p>"#,
            Some(Dimensions::new(200, 200)),
            &MemoryStore::new(),
        );
        assert_eq!(
            html,
            r#"<p><img src="http://hello.com/image.png" width="200" height="200"></p>"#
        );
        assert_eq!(stats.images_sized, 1);
        assert_eq!(stats.links_converted, 0);
    }

    #[test]
    fn test_oversized_remote_image_becomes_link() {
        let (html, stats) = enrich(
            r#"<p><img src="http://hello.com/image.png"></p>"#,
            Some(Dimensions::new(2000, 2000)),
            &MemoryStore::new(),
        );
        assert_eq!(
            html,
            r#"<p><a href="http://hello.com/image.png"><img src="http://hello.com/image.png" width="690" height="690"></a></p>"#
        );
        assert_eq!(stats.links_converted, 1);
        assert_eq!(stats.lightboxes, 0);
    }

    #[test]
    fn test_oversized_upload_gets_lightbox() {
        let src = "//bucket.s3.amazonaws.com/uploads/6/4/123.png";
        let store = MemoryStore::new().with_attachment(
            Attachment::new(AttachmentId(1), src, "holiday.png").with_filesize(1536),
        );

        let (html, stats) = enrich(
            &format!(r#"<p><img src="{src}"></p>"#),
            Some(Dimensions::new(1000, 1000)),
            &store,
        );

        assert_eq!(
            html,
            format!(
                r#"<p><div class="lightbox-wrapper"><a href="{src}" class="lightbox"><img src="{src}" width="690" height="690"><div class="meta"><span class="filename">holiday.png</span><span class="informations">1000x1000 1.5 KB</span><span class="expand"></span></div></a></div></p>"#
            )
        );
        assert_eq!(stats.lightboxes, 1);
        assert_eq!(stats.links_converted, 0);
    }

    #[test]
    fn test_lightbox_for_pasted_upload() {
        let store = MemoryStore::new()
            .with_attachment(Attachment::new(AttachmentId(1), "/uploads/a.png", "blob.png"));

        let (html, _) = enrich(
            r#"<img src="/uploads/a.png">"#,
            Some(Dimensions::new(1000, 500)),
            &store,
        );

        assert!(html.contains(r#"<span class="filename">pasted image</span>"#));
        assert!(html.contains(r#"<span class="informations">1000x500</span>"#));
        assert!(html.contains(r#"width="690" height="345""#));
    }

    #[test]
    fn test_image_inside_link_not_wrapped_again() {
        let input = r#"<a href="http://a.com"><img src="http://hello.com/image.png" width="690" height="690"></a>"#;
        let (html, stats) = enrich(input, Some(Dimensions::new(2000, 2000)), &MemoryStore::new());
        assert_eq!(html, input);
        assert_eq!(stats.links_converted, 0);
        assert_eq!(stats.images_settled, 1);
    }

    #[test]
    fn test_explicit_dimensions_not_overwritten() {
        let (html, _) = enrich(
            r#"<img src="http://hello.com/a.png" width="50">"#,
            Some(Dimensions::new(200, 100)),
            &MemoryStore::new(),
        );
        assert_eq!(
            html,
            r#"<img src="http://hello.com/a.png" width="50" height="25">"#
        );
    }

    #[test]
    fn test_unparseable_dimension_counted() {
        let input = r#"<img src="http://hello.com/a.png" width="50%">"#;
        let (html, stats) = enrich(input, Some(Dimensions::new(200, 100)), &MemoryStore::new());
        assert_eq!(html, input);
        assert_eq!(stats.images_sized, 1);
        assert_eq!(stats.images_partial_size, 1);
    }

    #[test]
    fn test_complete_dimensions_not_counted_partial() {
        let input = r#"<img src="http://hello.com/a.png" width="50%" height="20">"#;
        let (html, stats) = enrich(input, Some(Dimensions::new(200, 100)), &MemoryStore::new());
        assert_eq!(html, input);
        assert_eq!(stats.images_partial_size, 0);
    }

    #[test]
    fn test_sized_linked_image_is_settled() {
        let tree = HtmlTree::parse(concat!(
            r#"<a href="http://a.com"><img src="http://a.com/1.png" width="10" height="10"></a>"#,
            r#"<a href="http://a.com"><img src="http://a.com/2.png" width="10"></a>"#,
            r#"<img src="http://a.com/3.png" width="10" height="10">"#,
        ));
        let mut stats = PassStats::default();

        let targets = targets(tree.root(), &[], &EmbedSettings::default(), &mut stats);

        let srcs: Vec<&str> = targets.iter().map(|t| t.src.as_str()).collect();
        assert_eq!(srcs, ["http://a.com/2.png", "http://a.com/3.png"]);
        assert_eq!(stats.images_settled, 1);
    }

    #[test]
    fn test_unresolved_image_untouched() {
        let input = r#"<img src="http://hello.com/a.png">"#;
        let (html, stats) = enrich(input, None, &MemoryStore::new());
        assert_eq!(html, input);
        assert_eq!(stats.images_unresolved, 1);
    }

    #[test]
    fn test_oneboxed_image_skipped() {
        let input = r#"<div class="onebox-result"><img src="/uploads/a.png"></div>"#;
        let store = MemoryStore::new()
            .with_attachment(Attachment::new(AttachmentId(1), "/uploads/a.png", "a.png"));

        let (html, stats) = enrich(input, Some(Dimensions::new(1000, 1000)), &store);

        assert_eq!(html, input);
        assert!(!html.contains(r#"class="lightbox""#));
        assert_eq!(stats.images_skipped, 1);
    }

    #[test]
    fn test_images_inside_inserted_embeds_skipped() {
        let tree = HtmlTree::parse(r#"<aside><img src="http://a.com/thumb.png"></aside><img src="http://a.com/b.png">"#);
        let embedded = html::select_all(tree.root(), "aside");
        let mut stats = PassStats::default();

        let targets = targets(tree.root(), &embedded, &EmbedSettings::default(), &mut stats);

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].src, "http://a.com/b.png");
        assert_eq!(stats.images_skipped, 1);
    }

    #[test]
    fn test_enlargeable_thresholds() {
        let tree = HtmlTree::parse(r#"<img src="a.png">"#);
        let img = html::select_all(tree.root(), "img").remove(0);
        let settings = ImageSettings {
            oversized_threshold: 500,
            display_max_dimension: 800,
            ..ImageSettings::default()
        };

        assert!(!is_enlargeable(&img, Dimensions::new(400, 400), &settings));
        // Oversized but displayed at natural size.
        assert!(!is_enlargeable(&img, Dimensions::new(600, 600), &settings));
        assert!(is_enlargeable(&img, Dimensions::new(900, 600), &settings));
    }

    #[test]
    fn test_parse_pixels() {
        assert_eq!(parse_pixels("300"), Some(300));
        assert_eq!(parse_pixels(" 300px "), Some(300));
        assert_eq!(parse_pixels("50%"), None);
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(2 * 1024 * 1024), "2.0 MB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_null_store_never_lightboxes() {
        let tree = HtmlTree::parse(r#"<img src="/uploads/a.png">"#);
        let mut stats = PassStats::default();
        let targets = targets(tree.root(), &[], &EmbedSettings::default(), &mut stats);
        let sizes = SizeCache::resolve_all(
            &[targets[0].src.clone()],
            &FixedSize(Dimensions::new(1000, 1000)),
            &SizeHints::new(),
            &WorkerPool::sequential(),
        );
        let store = NullStore;
        let mut linker = AttachmentLinker::new(&store);

        enrich_images(&targets, &sizes, &ImageSettings::default(), &mut linker, &mut stats);

        assert!(!tree.serialize().contains("lightbox"));
        assert_eq!(stats.links_converted, 1);
    }
}
