//! Blocking HTTP client implementation

use std::collections::HashMap;
use std::time::Duration;

use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_ENCODING, CONTENT_TYPE, USER_AGENT};
use url::Url;

use crate::error::{NetError, NetResult};
use crate::response::Response;

/// Default user agent string
const DEFAULT_USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

/// Default timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of redirects to follow
const MAX_REDIRECTS: usize = 10;

/// HTTP client producing [`Response`]s.
///
/// Requests never fail outright: a transport failure is carried by the
/// returned response, see [`Response::error`].
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::blocking::Client,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> NetResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: ClientConfig) -> NetResult<Self> {
        let mut headers = HeaderMap::new();
        let user_agent = HeaderValue::try_from(config.user_agent.as_str())
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;
        headers.insert(USER_AGENT, user_agent);
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        Ok(Self { client })
    }

    /// Fetch a URL using GET
    pub fn get(&self, url: &Url) -> Response {
        self.get_with_headers(url, HashMap::new())
    }

    /// Fetch a URL with custom headers
    pub fn get_with_headers(&self, url: &Url, extra_headers: HashMap<String, String>) -> Response {
        info!("Fetching: {}", url);

        let mut request = self.client.get(url.clone());

        for (key, value) in extra_headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::try_from(key.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                request = request.header(name, val);
            }
        }

        Self::finish(request.send())
    }

    /// Send a POST request with form data
    pub fn post_form(&self, url: &Url, form_data: &str) -> Response {
        info!("POST to: {}", url);

        let request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form_data.to_string());

        Self::finish(request.send())
    }

    fn finish(result: reqwest::Result<reqwest::blocking::Response>) -> Response {
        let response = Response::from(result);
        match response.error() {
            Some(err) => debug!("Request failed: {}", err),
            None => debug!("Response status: {}", response.status()),
        }
        response
    }
}

/// HTTP client configuration
pub struct ClientConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Value of the User-Agent header
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
