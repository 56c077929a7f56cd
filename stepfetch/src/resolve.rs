//! Job resolution: discovering the download URL and the artifact size.
//!
//! Resolution happens once per job and is round-tripped back to the caller
//! with the rest of the state, so later steps skip it entirely. It has two
//! halves:
//!
//! * a [`UrlResolver`] produces the authoritative download URL. The
//!   [`RedirectResolver`] walks `Location` headers with HEAD requests (the
//!   transport never follows redirects on its own), because update mirrors
//!   commonly sit behind one or more redirect hops and range requests must
//!   target the final URL;
//! * [`probe_total_size`] asks the final URL for its size with a strict
//!   HEAD probe. A server that fails the probe cannot serve ranged
//!   downloads, which is terminal for the whole job.

use thiserror::Error;

use crate::http::{HttpClient, HttpError};

/// Default ceiling on redirect hops while resolving a URL.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Errors that can occur while resolving the download URL.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The redirect chain exceeded the hop limit.
    #[error("Too many redirects while resolving the download URL (limit: {0})")]
    TooManyRedirects(usize),
}

/// Produces the authoritative download URL for a job.
///
/// Returning `Ok(None)` means resolution ran but found nothing to download;
/// the step reports this as a terminal job failure.
pub trait UrlResolver {
    /// Resolve the download URL, or `None` if there is nothing to download.
    fn resolve(&self) -> Result<Option<String>, ResolveError>;
}

/// Resolver for a URL that is already known.
pub struct StaticResolver {
    url: String,
}

impl StaticResolver {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl UrlResolver for StaticResolver {
    fn resolve(&self) -> Result<Option<String>, ResolveError> {
        Ok(Some(self.url.clone()))
    }
}

/// Resolver that follows `Location` headers until the real URL is known.
///
/// Issues HEAD requests against each hop and stops at the first response
/// without a `Location` header. A transport error anywhere in the chain
/// resolves to `None` (nothing to download) rather than an error: a mirror
/// that cannot even answer a HEAD has nothing we can fetch.
pub struct RedirectResolver<C: HttpClient> {
    http_client: C,
    start_url: String,
    max_redirects: usize,
}

impl<C: HttpClient> RedirectResolver<C> {
    pub fn new(http_client: C, start_url: impl Into<String>) -> Self {
        Self {
            http_client,
            start_url: start_url.into(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Set the redirect hop limit.
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }
}

impl<C: HttpClient> UrlResolver for RedirectResolver<C> {
    fn resolve(&self) -> Result<Option<String>, ResolveError> {
        let mut url = self.start_url.clone();

        for _ in 0..=self.max_redirects {
            let probe = match self.http_client.head(&url) {
                Ok(probe) => probe,
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "HEAD failed while resolving URL");
                    return Ok(None);
                }
            };

            match probe.location {
                Some(next) => {
                    tracing::debug!(from = %url, to = %next, "following redirect");
                    url = next;
                }
                None => return Ok(Some(url)),
            }
        }

        Err(ResolveError::TooManyRedirects(self.max_redirects))
    }
}

/// Probe the artifact's total size with a strict HEAD request.
///
/// The result is accepted only if the status is exactly 200, the
/// `Content-Type` includes `application/zip`, and `Accept-Ranges` includes
/// `bytes`. Anything else returns `None`: without range support the
/// chunked download cannot proceed at all, so an unknown size is terminal
/// for the job, not something to retry.
pub fn probe_total_size<C: HttpClient>(client: &C, url: &str) -> Option<u64> {
    let probe = match client.head(url) {
        Ok(probe) => probe,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "size probe failed");
            return None;
        }
    };

    if probe.status != 200 {
        tracing::debug!(url = %url, status = probe.status, "size probe rejected: status");
        return None;
    }

    let zip = probe
        .content_type
        .as_deref()
        .is_some_and(|v| v.contains("application/zip"));
    if !zip {
        tracing::debug!(url = %url, content_type = ?probe.content_type, "size probe rejected: content type");
        return None;
    }

    let ranged = probe
        .accept_ranges
        .as_deref()
        .is_some_and(|v| v.contains("bytes"));
    if !ranged {
        tracing::debug!(url = %url, "size probe rejected: no byte range support");
        return None;
    }

    probe.content_length
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::http::tests::MockHttpClient;
    use crate::http::{HeadProbe, RangeResponse};

    /// Scripted client answering HEADs per URL; unknown URLs fail.
    struct HopClient {
        hops: HashMap<String, HeadProbe>,
    }

    impl HttpClient for HopClient {
        fn head(&self, url: &str) -> Result<HeadProbe, HttpError> {
            self.hops
                .get(url)
                .cloned()
                .ok_or_else(|| HttpError::Request(format!("unexpected HEAD {}", url)))
        }

        fn get_range(&self, _url: &str, _from: u64, _to: u64) -> Result<RangeResponse, HttpError> {
            Err(HttpError::Request("not a download test".to_string()))
        }
    }

    fn redirect_to(next: &str) -> HeadProbe {
        HeadProbe {
            status: 302,
            location: Some(next.to_string()),
            ..HeadProbe::default()
        }
    }

    fn terminal() -> HeadProbe {
        HeadProbe {
            status: 200,
            ..HeadProbe::default()
        }
    }

    fn acceptable_probe(length: u64) -> HeadProbe {
        HeadProbe {
            status: 200,
            content_type: Some("application/zip".to_string()),
            accept_ranges: Some("bytes".to_string()),
            content_length: Some(length),
            location: None,
        }
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticResolver::new("https://example.org/pkg.zip");
        assert_eq!(
            resolver.resolve().unwrap().as_deref(),
            Some("https://example.org/pkg.zip")
        );
    }

    #[test]
    fn test_redirect_resolver_no_hops() {
        let client = HopClient {
            hops: HashMap::from([("https://a/pkg.zip".to_string(), terminal())]),
        };
        let resolver = RedirectResolver::new(client, "https://a/pkg.zip");
        assert_eq!(resolver.resolve().unwrap().as_deref(), Some("https://a/pkg.zip"));
    }

    #[test]
    fn test_redirect_resolver_follows_chain() {
        let client = HopClient {
            hops: HashMap::from([
                ("https://a/pkg.zip".to_string(), redirect_to("https://b/pkg.zip")),
                ("https://b/pkg.zip".to_string(), redirect_to("https://c/pkg.zip")),
                ("https://c/pkg.zip".to_string(), terminal()),
            ]),
        };
        let resolver = RedirectResolver::new(client, "https://a/pkg.zip");
        assert_eq!(resolver.resolve().unwrap().as_deref(), Some("https://c/pkg.zip"));
    }

    #[test]
    fn test_redirect_resolver_transport_error_is_none() {
        let client = HopClient {
            hops: HashMap::new(),
        };
        let resolver = RedirectResolver::new(client, "https://a/pkg.zip");
        assert_eq!(resolver.resolve().unwrap(), None);
    }

    #[test]
    fn test_redirect_resolver_hop_limit() {
        // a -> b -> a -> b -> ... never terminates.
        let client = HopClient {
            hops: HashMap::from([
                ("https://a/".to_string(), redirect_to("https://b/")),
                ("https://b/".to_string(), redirect_to("https://a/")),
            ]),
        };
        let resolver = RedirectResolver::new(client, "https://a/").with_max_redirects(4);
        assert!(matches!(
            resolver.resolve(),
            Err(ResolveError::TooManyRedirects(4))
        ));
    }

    #[test]
    fn test_probe_accepts_conforming_server() {
        let client = MockHttpClient::with_head(acceptable_probe(123_456));
        assert_eq!(probe_total_size(&client, "https://a/pkg.zip"), Some(123_456));
    }

    #[test]
    fn test_probe_accepts_content_type_with_charset() {
        let mut probe = acceptable_probe(10);
        probe.content_type = Some("application/zip; charset=binary".to_string());
        let client = MockHttpClient::with_head(probe);
        assert_eq!(probe_total_size(&client, "https://a/pkg.zip"), Some(10));
    }

    #[test]
    fn test_probe_rejects_non_200() {
        let mut probe = acceptable_probe(10);
        probe.status = 206;
        let client = MockHttpClient::with_head(probe);
        assert_eq!(probe_total_size(&client, "https://a/pkg.zip"), None);
    }

    #[test]
    fn test_probe_rejects_wrong_content_type() {
        let mut probe = acceptable_probe(10);
        probe.content_type = Some("text/html".to_string());
        let client = MockHttpClient::with_head(probe);
        assert_eq!(probe_total_size(&client, "https://a/pkg.zip"), None);
    }

    #[test]
    fn test_probe_rejects_missing_range_support() {
        let mut probe = acceptable_probe(10);
        probe.accept_ranges = Some("none".to_string());
        let client = MockHttpClient::with_head(probe);
        assert_eq!(probe_total_size(&client, "https://a/pkg.zip"), None);

        let mut probe = acceptable_probe(10);
        probe.accept_ranges = None;
        let client = MockHttpClient::with_head(probe);
        assert_eq!(probe_total_size(&client, "https://a/pkg.zip"), None);
    }

    #[test]
    fn test_probe_network_error_is_none() {
        let client = MockHttpClient {
            head_response: Err(HttpError::Request("connection refused".to_string())),
            get_response: Err(HttpError::Request("unused".to_string())),
        };
        assert_eq!(probe_total_size(&client, "https://a/pkg.zip"), None);
    }

    #[test]
    fn test_probe_missing_content_length_is_none() {
        let mut probe = acceptable_probe(10);
        probe.content_length = None;
        let client = MockHttpClient::with_head(probe);
        assert_eq!(probe_total_size(&client, "https://a/pkg.zip"), None);
    }
}
