//! Image URI validation.
//!
//! Decides whether an image reference may be handed to the size prober.
//! Only absolute `http`/`https` URIs are crawlable. Protocol-relative
//! references (`//host/path`) and plain paths are local or ambiguous and are
//! never crawled.

use url::{ParseError, Url};

/// Base used to check that a relative reference is well-formed.
const RELATIVE_BASE: &str = "http://localhost/";

/// Classification returned by [`is_valid_image_uri`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriValidity {
    /// Absolute URI with an `http` or `https` scheme.
    Valid,
    /// Parseable, but not crawlable (other scheme, protocol-relative, path).
    Invalid,
    /// Could not be parsed as a URI or relative reference at all.
    Indeterminate,
}

impl UriValidity {
    /// Whether the size prober may fetch this URI.
    ///
    /// [`Indeterminate`](Self::Indeterminate) is never crawlable.
    #[must_use]
    pub fn is_crawlable(self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Classify an image reference for crawling.
///
/// Never panics, whatever the input.
///
/// # Examples
///
/// ```
/// use enrich_core::{UriValidity, is_valid_image_uri};
///
/// assert_eq!(is_valid_image_uri("https://domain.com"), UriValidity::Valid);
/// assert_eq!(is_valid_image_uri("//domain.com"), UriValidity::Invalid);
/// assert_eq!(is_valid_image_uri("http://do<main.com"), UriValidity::Indeterminate);
/// ```
pub fn is_valid_image_uri(candidate: &str) -> UriValidity {
    match Url::parse(candidate) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => UriValidity::Valid,
        Ok(_) => UriValidity::Invalid,
        Err(ParseError::RelativeUrlWithoutBase) => {
            let well_formed = Url::parse(RELATIVE_BASE)
                .and_then(|base| base.join(candidate))
                .is_ok();
            if well_formed {
                UriValidity::Invalid
            } else {
                UriValidity::Indeterminate
            }
        }
        Err(_) => UriValidity::Indeterminate,
    }
}

/// Make a root-relative path (`/uploads/a.png`) absolute against `base_url`.
///
/// Protocol-relative references, absolute URIs and document-relative paths
/// are returned unchanged.
#[must_use]
pub fn absolutize(src: &str, base_url: Option<&str>) -> String {
    match base_url {
        Some(base) if src.starts_with('/') && !src.starts_with("//") => {
            format!("{}{src}", base.trim_end_matches('/'))
        }
        _ => src.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_and_https_are_valid() {
        assert_eq!(is_valid_image_uri("http://domain.com"), UriValidity::Valid);
        assert_eq!(is_valid_image_uri("https://domain.com"), UriValidity::Valid);
        assert_eq!(
            is_valid_image_uri("https://domain.com/images/logo.png?v=2"),
            UriValidity::Valid
        );
    }

    #[test]
    fn test_other_schemes_are_invalid() {
        assert_eq!(is_valid_image_uri("ftp://domain.com"), UriValidity::Invalid);
        assert_eq!(is_valid_image_uri("ftps://domain.com"), UriValidity::Invalid);
        assert_eq!(
            is_valid_image_uri("data:image/png;base64,AAAA"),
            UriValidity::Invalid
        );
    }

    #[test]
    fn test_relative_references_are_invalid() {
        assert_eq!(is_valid_image_uri("//domain.com"), UriValidity::Invalid);
        assert_eq!(is_valid_image_uri("/tmp/image.png"), UriValidity::Invalid);
        assert_eq!(
            is_valid_image_uri("//bucket.s3.amazonaws.com/uploads/6/4/123.png"),
            UriValidity::Invalid
        );
    }

    #[test]
    fn test_malformed_uri_is_indeterminate() {
        assert_eq!(
            is_valid_image_uri("http://do<main.com"),
            UriValidity::Indeterminate
        );
        assert!(!UriValidity::Indeterminate.is_crawlable());
    }

    #[test]
    fn test_malformed_protocol_relative_is_indeterminate() {
        assert_eq!(
            is_valid_image_uri("//do<main.com/a.png"),
            UriValidity::Indeterminate
        );
    }

    #[test]
    fn test_only_valid_is_crawlable() {
        assert!(UriValidity::Valid.is_crawlable());
        assert!(!UriValidity::Invalid.is_crawlable());
    }

    #[test]
    fn test_absolutize_root_relative() {
        assert_eq!(
            absolutize("/path/to/img.jpg", Some("http://test.localhost/")),
            "http://test.localhost/path/to/img.jpg"
        );
    }

    #[test]
    fn test_absolutize_leaves_protocol_relative_alone() {
        let src = "//bucket.s3.amazonaws.com/uploads/6/4/123.png";
        assert_eq!(absolutize(src, Some("http://test.localhost")), src);
    }

    #[test]
    fn test_absolutize_without_base() {
        assert_eq!(absolutize("/a.png", None), "/a.png");
        assert_eq!(
            absolutize("http://x.com/a.png", Some("http://test.localhost")),
            "http://x.com/a.png"
        );
    }
}
