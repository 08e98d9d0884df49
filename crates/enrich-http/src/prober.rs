//! Remote image size probe.

use std::io::Read;

use enrich_core::{Dimensions, ProbeError, SizeProber};
use ureq::Agent;

use crate::sniff::sniff_dimensions;
use crate::{DEFAULT_MAX_PROBE_BYTES, DEFAULT_USER_AGENT};

/// Measures remote images by downloading the start of the file.
///
/// At most `max_bytes` are read; image headers sit at the very beginning, so
/// large files are never fetched completely.
#[derive(Clone)]
pub struct HttpProber {
    agent: Agent,
    user_agent: String,
    max_bytes: u64,
}

impl HttpProber {
    /// Create a prober using `agent` for requests.
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            max_bytes: DEFAULT_MAX_PROBE_BYTES,
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Limit how much of each image is downloaded.
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl SizeProber for HttpProber {
    fn probe_size(&self, url: &str) -> Result<Dimensions, ProbeError> {
        let response = self
            .agent
            .get(url)
            .header("User-Agent", self.user_agent.as_str())
            .call()
            .map_err(|e| ProbeError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(ProbeError::Http(format!("HTTP {status}")));
        }

        let mut data = Vec::new();
        response
            .into_body()
            .into_reader()
            .take(self.max_bytes)
            .read_to_end(&mut data)
            .map_err(|e| ProbeError::Io(e.to_string()))?;

        let dimensions = sniff_dimensions(&data);
        if dimensions.is_none() {
            tracing::debug!(url = %url, bytes = data.len(), "No image header recognized");
        }
        dimensions.ok_or(ProbeError::UnknownFormat)
    }
}
