//! A completed HTTP exchange, before any of its body has been read

use std::fmt;
use std::io::Read;

use reqwest::header::HeaderMap;
use url::Url;

/// Status line, headers and the still-unread body of a finished request
pub struct Exchange {
    pub(crate) url: Option<Url>,
    pub(crate) status: u16,
    pub(crate) headers: HeaderMap,
    pub(crate) content_length: Option<u64>,
    pub(crate) body: Box<dyn Read + Send>,
}

impl Exchange {
    /// Create an exchange from its parts
    pub fn new(status: u16, headers: HeaderMap, body: impl Read + Send + 'static) -> Self {
        Self {
            url: None,
            status,
            headers,
            content_length: None,
            body: Box::new(body),
        }
    }

    /// Set the declared Content-Length
    pub fn with_content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    /// Set the final URL the body was served from
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Declared Content-Length, if any
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }
}

impl From<reqwest::blocking::Response> for Exchange {
    fn from(response: reqwest::blocking::Response) -> Self {
        let url = response.url().clone();
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let content_length = response.content_length();

        Self {
            url: Some(url),
            status,
            headers,
            content_length,
            body: Box::new(response),
        }
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("url", &self.url)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}
