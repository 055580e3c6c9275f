//! Network error types

use thiserror::Error;

/// Network operation result type
pub type NetResult<T> = Result<T, NetError>;

/// Network errors
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML decode error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    #[error("Body is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Response has no body")]
    NoBody,

    #[error("Response body already consumed")]
    BodyConsumed,

    #[error("Response body is empty")]
    EmptyBody,
}

impl NetError {
    /// Whether the error happened before any response was received
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            NetError::InvalidUrl(_)
                | NetError::RequestFailed(_)
                | NetError::ConnectionError(_)
                | NetError::Timeout
                | NetError::TooManyRedirects
        )
    }
}

impl From<reqwest::Error> for NetError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetError::Timeout
        } else if err.is_connect() {
            NetError::ConnectionError(err.to_string())
        } else if err.is_redirect() {
            NetError::TooManyRedirects
        } else {
            NetError::RequestFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for NetError {
    fn from(err: url::ParseError) -> Self {
        NetError::InvalidUrl(err.to_string())
    }
}
