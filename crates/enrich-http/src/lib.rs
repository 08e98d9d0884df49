//! HTTP collaborators for the enrichment pass.
//!
//! This crate provides the network-backed implementations of the
//! `enrich-core` service traits:
//! - [`HttpProber`] implements `SizeProber` by reading image headers
//! - [`HttpEmbedder`] implements `Embedder` against an embedding service
//!
//! Both share one [`ureq::Agent`] built by [`create_agent`], so connections
//! are pooled and every call is bounded by the same global timeout.

mod embedder;
mod prober;
mod sniff;

use std::time::Duration;

use ureq::Agent;

pub use embedder::HttpEmbedder;
pub use prober::HttpProber;
pub use sniff::sniff_dimensions;

/// Default timeout for a single external call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of bytes read when probing an image.
pub const DEFAULT_MAX_PROBE_BYTES: u64 = 64 * 1024;

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("enrich/", env!("CARGO_PKG_VERSION"));

/// Create an HTTP agent with the specified timeout.
///
/// HTTP error statuses are returned as responses, not errors, so callers can
/// tell "no embed" (404) apart from a failing service.
pub fn create_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}
