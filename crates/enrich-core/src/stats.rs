//! Per-pass counters.

/// What a pass did, for logging and metrics.
///
/// Informational only; degraded lookups show up here rather than as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Links replaced by embed markup.
    pub embeds_replaced: usize,
    /// Embed service calls that failed.
    pub embeds_failed: usize,
    /// Embed service calls that returned nothing.
    pub embeds_empty: usize,
    /// Images given a resolved size.
    pub images_sized: usize,
    /// Images no source could size.
    pub images_unresolved: usize,
    /// Images left alone (inside embeds, empty `src`).
    pub images_skipped: usize,
    /// Images already sized and inside a link; not resolved again.
    pub images_settled: usize,
    /// Images left with one explicit dimension the other could not be derived from.
    pub images_partial_size: usize,
    /// Oversized images wrapped in a plain link.
    pub links_converted: usize,
    /// Oversized images wrapped in lightbox markup.
    pub lightboxes: usize,
    /// Calls made to the size prober.
    pub probes: usize,
    /// Size prober calls that failed.
    pub probe_failures: usize,
}

impl PassStats {
    /// Whether any element was rewritten.
    pub fn rewrote_anything(&self) -> bool {
        self.embeds_replaced + self.images_sized + self.links_converted + self.lightboxes > 0
    }
}
