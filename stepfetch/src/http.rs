//! HTTP transport abstraction for testability.
//!
//! The downloader needs exactly two operations from its transport: a HEAD
//! probe (to learn the artifact's size and whether the server honors range
//! requests) and a ranged GET. Both sit behind the [`HttpClient`] trait so
//! the transfer loop can be driven by mock and scripted clients in tests.
//!
//! The real implementation, [`ReqwestClient`], deliberately disables
//! automatic redirect following: the resolver walks `Location` headers
//! itself, one hop at a time.

use std::time::Duration;

use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, RANGE, USER_AGENT};
use thiserror::Error;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent sent with every request.
///
/// Some download mirrors reject requests without a realistic client
/// identification header, so the default looks like an ordinary client and
/// is configurable for callers that need something else.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; stepfetch/0.3)";

/// Errors that can occur at the transport layer.
#[derive(Debug, Clone, Error)]
pub enum HttpError {
    /// The request could not be sent or no response arrived.
    #[error("Request failed: {0}")]
    Request(String),

    /// The response arrived but its body could not be read.
    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// What a HEAD request revealed about the artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadProbe {
    /// HTTP status code.
    pub status: u16,

    /// `Content-Type` header, if present and readable.
    pub content_type: Option<String>,

    /// `Accept-Ranges` header, if present and readable.
    pub accept_ranges: Option<String>,

    /// `Content-Length` header, parsed.
    pub content_length: Option<u64>,

    /// `Location` header for redirect responses.
    pub location: Option<String>,
}

/// One ranged GET response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeResponse {
    /// HTTP status code; the transfer loop accepts only 200 and 206.
    pub status: u16,

    /// Response body bytes.
    pub body: Vec<u8>,
}

/// Trait for the two HTTP operations the downloader performs.
pub trait HttpClient: Send + Sync {
    /// Performs a HEAD request and reports the relevant headers.
    fn head(&self, url: &str) -> Result<HeadProbe, HttpError>;

    /// Performs a GET with `Range: bytes=<from>-<to>`.
    fn get_range(&self, url: &str, from: u64, to: u64) -> Result<RangeResponse, HttpError>;
}

/// Real HTTP client implementation using blocking reqwest.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    user_agent: String,
}

impl ReqwestClient {
    /// Creates a client with the default timeout and User-Agent.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_options(Duration::from_secs(DEFAULT_TIMEOUT_SECS), DEFAULT_USER_AGENT)
    }

    /// Creates a client with a custom timeout and User-Agent.
    pub fn with_options(timeout: Duration, user_agent: impl Into<String>) -> Result<Self, HttpError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HttpError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }
}

impl HttpClient for ReqwestClient {
    fn head(&self, url: &str) -> Result<HeadProbe, HttpError> {
        let response = self
            .client
            .head(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .map_err(|e| HttpError::Request(format!("HEAD {} failed: {}", url, e)))?;

        let header_string = |name| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Ok(HeadProbe {
            status: response.status().as_u16(),
            content_type: header_string(CONTENT_TYPE),
            accept_ranges: header_string(ACCEPT_RANGES),
            content_length: response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
            location: header_string(LOCATION),
        })
    }

    fn get_range(&self, url: &str, from: u64, to: u64) -> Result<RangeResponse, HttpError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .header(RANGE, format!("bytes={}-{}", from, to))
            .send()
            .map_err(|e| HttpError::Request(format!("GET {} failed: {}", url, e)))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| HttpError::Body(e.to_string()))?;

        Ok(RangeResponse { status, body })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Mock HTTP client with fixed responses for both operations.
    pub struct MockHttpClient {
        pub head_response: Result<HeadProbe, HttpError>,
        pub get_response: Result<RangeResponse, HttpError>,
    }

    impl MockHttpClient {
        /// Mock whose HEAD answer is `probe` and whose GETs fail.
        pub fn with_head(probe: HeadProbe) -> Self {
            Self {
                head_response: Ok(probe),
                get_response: Err(HttpError::Request("no GET scripted".to_string())),
            }
        }
    }

    impl HttpClient for MockHttpClient {
        fn head(&self, _url: &str) -> Result<HeadProbe, HttpError> {
            self.head_response.clone()
        }

        fn get_range(&self, _url: &str, _from: u64, _to: u64) -> Result<RangeResponse, HttpError> {
            self.get_response.clone()
        }
    }

    #[test]
    fn test_mock_client_head() {
        let mock = MockHttpClient::with_head(HeadProbe {
            status: 200,
            content_length: Some(42),
            ..HeadProbe::default()
        });

        let probe = mock.head("http://example.com").unwrap();
        assert_eq!(probe.status, 200);
        assert_eq!(probe.content_length, Some(42));
    }

    #[test]
    fn test_mock_client_get() {
        let mock = MockHttpClient {
            head_response: Ok(HeadProbe::default()),
            get_response: Ok(RangeResponse {
                status: 206,
                body: vec![1, 2, 3],
            }),
        };

        let response = mock.get_range("http://example.com", 0, 2).unwrap();
        assert_eq!(response.status, 206);
        assert_eq!(response.body, vec![1, 2, 3]);
    }

    #[test]
    fn test_reqwest_client_builds() {
        assert!(ReqwestClient::new().is_ok());
        assert!(
            ReqwestClient::with_options(Duration::from_secs(5), "test-agent/1.0").is_ok()
        );
    }
}
