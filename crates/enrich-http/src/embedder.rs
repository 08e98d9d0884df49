//! Embedding service client.

use enrich_core::{EmbedError, EmbedRequest, Embedder};
use ureq::Agent;
use url::Url;

use crate::DEFAULT_USER_AGENT;

/// Client for an embedding service answering
/// `GET {service_url}?url=…&document_id=…[&invalidate=true]` with an HTML
/// fragment.
///
/// `204 No Content`, `404 Not Found` and empty bodies mean the URL has no
/// embed. Other error statuses are reported as [`EmbedError::Http`].
#[derive(Clone)]
pub struct HttpEmbedder {
    agent: Agent,
    service_url: String,
    user_agent: String,
}

impl HttpEmbedder {
    pub fn new(agent: Agent, service_url: impl Into<String>) -> Self {
        Self {
            agent,
            service_url: service_url.into(),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn service_url(&self) -> &str {
        &self.service_url
    }
}

/// Full request URL for `request`, with the query string encoded.
pub(crate) fn request_url(service_url: &str, request: &EmbedRequest) -> Result<Url, EmbedError> {
    let document_id = request.document_id.0.to_string();
    let mut params = vec![
        ("url", request.url.as_str()),
        ("document_id", document_id.as_str()),
    ];
    if request.invalidate {
        params.push(("invalidate", "true"));
    }
    Url::parse_with_params(service_url, &params)
        .map_err(|e| EmbedError::Http(format!("invalid service URL {service_url}: {e}")))
}

impl Embedder for HttpEmbedder {
    fn embed(&self, request: &EmbedRequest) -> Result<Option<String>, EmbedError> {
        let url = request_url(&self.service_url, request)?;

        let response = self
            .agent
            .get(url.as_str())
            .header("User-Agent", self.user_agent.as_str())
            .call()
            .map_err(|e| EmbedError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        if matches!(status, 204 | 404) {
            tracing::debug!(url = %request.url, status, "Embedding service has no embed");
            return Ok(None);
        }

        let mut body = response.into_body();
        if status >= 400 {
            let error_body = body
                .read_to_string()
                .unwrap_or_else(|_| String::from("(unable to read error body)"));
            return Err(EmbedError::Http(format!("HTTP {status}: {error_body}")));
        }

        let bytes = body.read_to_vec().map_err(|e| EmbedError::Io(e.to_string()))?;
        let markup = String::from_utf8(bytes).map_err(|_| EmbedError::InvalidUtf8)?;
        Ok((!markup.trim().is_empty()).then_some(markup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enrich_core::DocumentId;
    use pretty_assertions::assert_eq;

    fn request(invalidate: bool) -> EmbedRequest {
        EmbedRequest {
            url: "http://www.youtube.com/watch?v=9bZkp7q19f0".to_owned(),
            document_id: DocumentId(123),
            invalidate,
        }
    }

    #[test]
    fn test_request_url_encodes_query() {
        let url = request_url("http://embed.local/onebox", &request(false)).unwrap();
        assert_eq!(
            url.as_str(),
            "http://embed.local/onebox?url=http%3A%2F%2Fwww.youtube.com%2Fwatch%3Fv%3D9bZkp7q19f0&document_id=123"
        );
    }

    #[test]
    fn test_request_url_with_invalidate() {
        let url = request_url("http://embed.local/onebox", &request(true)).unwrap();
        assert!(url.as_str().ends_with("&document_id=123&invalidate=true"));
    }

    #[test]
    fn test_request_url_invalid_service() {
        let result = request_url("not a url", &request(false));
        assert!(matches!(result, Err(EmbedError::Http(_))));
    }

    #[test]
    fn test_unreachable_service_is_error() {
        let agent = crate::create_agent(std::time::Duration::from_millis(200));
        let embedder = HttpEmbedder::new(agent, "http://127.0.0.1:9/onebox");
        assert!(embedder.embed(&request(false)).is_err());
    }
}
