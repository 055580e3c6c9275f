//! HTTP response representation
//!
//! A [`Response`] owns the unread body of an [`Exchange`]. The body can be
//! consumed once, either by reading it directly, by decoding it, by streaming
//! it to a file, or by buffering it in memory. Once buffered, every accessor
//! reads from the buffer and the network stream is gone.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::{debug, warn};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use url::Url;

use crate::decode::{self, CharsetDecoder};
use crate::error::{NetError, NetResult};
use crate::exchange::Exchange;

/// Largest buffer pre-allocation taken from a declared Content-Length
const MAX_PREALLOC: u64 = 8 * 1024 * 1024;

/// Where the body bytes currently come from
enum Body {
    /// Unread network stream
    Raw(Box<dyn Read + Send>),
    /// Fully read into memory
    Buffered(Vec<u8>),
    /// Stream closed or buffer released, nothing left to read
    Closed,
}

/// HTTP response
pub struct Response {
    ok: bool,
    error: Option<NetError>,
    url: Option<Url>,
    status: u16,
    headers: HeaderMap,
    content_length: Option<u64>,
    body: Body,
}

impl Response {
    /// Build a response from the outcome of an exchange
    pub fn new(result: NetResult<Exchange>) -> Self {
        match result {
            Ok(exchange) => Self::from_exchange(exchange),
            Err(err) => Self::from_error(err),
        }
    }

    /// Wrap a completed exchange
    pub fn from_exchange(exchange: Exchange) -> Self {
        Self {
            ok: (200..300).contains(&exchange.status),
            error: None,
            url: exchange.url,
            status: exchange.status,
            headers: exchange.headers,
            content_length: exchange.content_length,
            body: Body::Raw(exchange.body),
        }
    }

    /// A response for an exchange that failed before producing anything
    pub fn from_error(error: NetError) -> Self {
        Self {
            ok: false,
            error: Some(error),
            url: None,
            status: 0,
            headers: HeaderMap::new(),
            content_length: None,
            body: Body::Closed,
        }
    }

    /// Check if the response was successful (2xx)
    pub fn is_success(&self) -> bool {
        self.ok
    }

    /// The transport error, if the exchange failed
    pub fn error(&self) -> Option<&NetError> {
        self.error.as_ref()
    }

    /// HTTP status code, 0 when the exchange failed
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the Content-Type header
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Content-Length declared by the server
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Final URL after redirects
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Whether the body has been read into memory
    pub fn is_buffered(&self) -> bool {
        matches!(self.body, Body::Buffered(_))
    }

    /// Read the network stream directly.
    ///
    /// The caller is responsible for [`Response::close`] afterwards.
    pub fn raw(&mut self) -> RawBody<'_> {
        RawBody { response: self }
    }

    /// Release the network stream. Calling it again, or after buffering, does nothing.
    pub fn close(&mut self) {
        if let Body::Raw(_) = self.body {
            debug!("Closing response stream (status {})", self.status);
            self.body = Body::Closed;
        }
    }

    /// The byte source every body accessor reads from.
    ///
    /// Reading the buffer through this does not drain it.
    fn body_reader(&mut self) -> Box<dyn Read + '_> {
        match &mut self.body {
            Body::Buffered(buf) => Box::new(buf.as_slice()),
            Body::Raw(stream) => Box::new(stream),
            Body::Closed => Box::new(io::empty()),
        }
    }

    /// Stream the body into a file at `path`, creating or truncating it.
    ///
    /// The in-memory buffer is used if one exists, but none is created.
    /// Returns the number of bytes written.
    pub fn download_to_file(&mut self, path: impl AsRef<Path>) -> NetResult<u64> {
        let path = path.as_ref();

        let mut file = match File::create(path) {
            Ok(file) => file,
            Err(e) => {
                self.close();
                return Err(e.into());
            }
        };

        let copied = io::copy(&mut self.body_reader(), &mut file);
        drop(file);
        self.close();

        match copied {
            Ok(written) => {
                debug!("Wrote {} bytes to {}", written, path.display());
                Ok(written)
            }
            Err(e) => {
                warn!("Download to {} failed: {}", path.display(), e);
                Err(e.into())
            }
        }
    }

    /// Decode the XML body into `target`.
    ///
    /// An empty body leaves `target` as it was. `charset_decoder` is used when
    /// the document declares a non UTF-8 encoding.
    pub fn decode_xml<T: DeserializeOwned>(
        &mut self,
        target: &mut T,
        charset_decoder: Option<&dyn CharsetDecoder>,
    ) -> NetResult<()> {
        if let Some(value) = self.next_xml(charset_decoder)? {
            *target = value;
        }
        Ok(())
    }

    /// Decode the XML body, failing if it is empty
    pub fn xml<T: DeserializeOwned>(&mut self, charset_decoder: Option<&dyn CharsetDecoder>) -> NetResult<T> {
        self.next_xml(charset_decoder)?.ok_or(NetError::EmptyBody)
    }

    fn next_xml<T: DeserializeOwned>(&mut self, charset_decoder: Option<&dyn CharsetDecoder>) -> NetResult<Option<T>> {
        let decoded = decode::read_xml(self.body_reader(), charset_decoder);
        self.close();
        decoded
    }

    /// Decode the JSON body into `target`.
    ///
    /// Only the first JSON value is read. An empty body leaves `target` as it was.
    pub fn decode_json<T: DeserializeOwned>(&mut self, target: &mut T) -> NetResult<()> {
        if let Some(value) = self.next_json()? {
            *target = value;
        }
        Ok(())
    }

    /// Decode the JSON body, failing if it is empty
    pub fn json<T: DeserializeOwned>(&mut self) -> NetResult<T> {
        self.next_json()?.ok_or(NetError::EmptyBody)
    }

    fn next_json<T: DeserializeOwned>(&mut self) -> NetResult<Option<T>> {
        let decoded = decode::read_json(self.body_reader());
        self.close();
        decoded
    }

    /// Read the whole body into memory, closing the network stream.
    ///
    /// Does nothing if the body is already buffered. On a read error the
    /// partial data is dropped and no buffer is kept.
    pub fn ensure_buffered(&mut self) -> NetResult<()> {
        let mut stream = match std::mem::replace(&mut self.body, Body::Closed) {
            Body::Raw(stream) => stream,
            Body::Buffered(buf) => {
                self.body = Body::Buffered(buf);
                return Ok(());
            }
            Body::Closed if self.error.is_some() => return Err(NetError::NoBody),
            Body::Closed => return Err(NetError::BodyConsumed),
        };

        let hint = self.content_length.unwrap_or(0).min(MAX_PREALLOC) as usize;
        let mut buf = Vec::with_capacity(hint);
        let result = stream.read_to_end(&mut buf);
        drop(stream);

        match result {
            Ok(read) => {
                debug!("Buffered {} bytes (status {})", read, self.status);
                self.body = Body::Buffered(buf);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to buffer response body: {}", e);
                Err(e.into())
            }
        }
    }

    /// Get the body bytes, buffering them first if needed
    pub fn try_bytes(&mut self) -> NetResult<&[u8]> {
        self.ensure_buffered()?;
        match &self.body {
            Body::Buffered(buf) => Ok(buf.as_slice()),
            _ => Ok(&[]),
        }
    }

    /// Get the body bytes, or an empty slice if the body cannot be read.
    ///
    /// Use [`Response::try_bytes`] to see why reading failed.
    pub fn bytes(&mut self) -> &[u8] {
        match self.try_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Body unavailable: {}", e);
                &[]
            }
        }
    }

    /// Get the body as a UTF-8 string
    pub fn try_text(&mut self) -> NetResult<String> {
        let bytes = self.try_bytes()?.to_vec();
        Ok(String::from_utf8(bytes)?)
    }

    /// Get the body as a string, replacing invalid characters.
    ///
    /// Empty if the body cannot be read.
    pub fn text(&mut self) -> String {
        String::from_utf8_lossy(self.bytes()).into_owned()
    }

    /// Drop the in-memory buffer. Later body access yields nothing.
    pub fn release_buffer(&mut self) {
        if let Body::Buffered(buf) = &self.body {
            debug!("Releasing {} buffered bytes", buf.len());
            self.body = Body::Closed;
        }
    }
}

/// Raw reader over the network stream of a [`Response`]
///
/// Yields nothing once the stream has been closed, buffered or decoded, and
/// fails on a response without a body.
pub struct RawBody<'a> {
    response: &'a mut Response,
}

impl Read for RawBody<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let response = &mut *self.response;
        match &mut response.body {
            Body::Raw(stream) => stream.read(buf),
            _ if response.error.is_some() => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "response has no body",
            )),
            _ => Ok(0),
        }
    }
}

impl From<Exchange> for Response {
    fn from(exchange: Exchange) -> Self {
        Self::from_exchange(exchange)
    }
}

impl From<reqwest::Result<reqwest::blocking::Response>> for Response {
    fn from(result: reqwest::Result<reqwest::blocking::Response>) -> Self {
        Self::new(result.map(Exchange::from).map_err(NetError::from))
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = match &self.body {
            Body::Raw(_) => "raw",
            Body::Buffered(_) => "buffered",
            Body::Closed => "closed",
        };
        f.debug_struct("Response")
            .field("ok", &self.ok)
            .field("error", &self.error)
            .field("url", &self.url)
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &body)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use reqwest::header::HeaderValue;
    use serde::Deserialize;

    /// Body stream recording how often it is read and when it is dropped
    struct TrackedBody {
        inner: Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
        closed: Arc<AtomicBool>,
    }

    impl Read for TrackedBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(buf)
        }
    }

    impl Drop for TrackedBody {
        fn drop(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Body stream that fails after yielding its data once
    struct BrokenBody {
        data: Option<Vec<u8>>,
    }

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.take() {
                Some(data) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                None => Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset")),
            }
        }
    }

    fn response(status: u16, body: &str) -> Response {
        let exchange = Exchange::new(status, HeaderMap::new(), Cursor::new(body.as_bytes().to_vec()))
            .with_content_length(body.len() as u64);
        Response::from_exchange(exchange)
    }

    fn tracked(body: &str) -> (Response, Arc<AtomicUsize>, Arc<AtomicBool>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicBool::new(false));
        let stream = TrackedBody {
            inner: Cursor::new(body.as_bytes().to_vec()),
            reads: reads.clone(),
            closed: closed.clone(),
        };
        let response = Response::from_exchange(Exchange::new(200, HeaderMap::new(), stream));
        (response, reads, closed)
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Record {
        a: i64,
        b: String,
    }

    #[test]
    fn test_success_range() {
        for status in [200, 201, 204, 299] {
            assert!(response(status, "").is_success(), "status {}", status);
        }
        for status in [100, 101, 199, 300, 301, 404, 500] {
            assert!(!response(status, "").is_success(), "status {}", status);
        }
    }

    #[test]
    fn test_transport_error() {
        let mut resp = Response::new(Err(NetError::ConnectionError("refused".into())));

        assert!(!resp.is_success());
        assert_eq!(resp.status(), 0);
        assert!(resp.headers().is_empty());
        assert!(matches!(resp.error(), Some(NetError::ConnectionError(_))));
        assert!(matches!(resp.ensure_buffered(), Err(NetError::NoBody)));
        assert!(resp.bytes().is_empty());

        let mut buf = [0u8; 8];
        let err = resp.raw().read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-request-id", HeaderValue::from_static("abc"));
        let resp = Response::from_exchange(Exchange::new(200, headers, io::empty()));

        assert_eq!(resp.content_type(), Some("application/json"));
        assert_eq!(resp.header("X-Request-Id"), Some("abc"));
        assert_eq!(resp.header("missing"), None);
    }

    #[test]
    fn test_text_and_bytes() {
        let mut resp = response(200, "hello");

        assert_eq!(resp.text(), "hello");
        assert_eq!(resp.bytes().len(), 5);
        assert_eq!(resp.try_text().unwrap(), "hello");
        assert!(resp.is_buffered());
    }

    #[test]
    fn test_bytes_borrows_buffer() {
        let mut resp = response(200, "abc");

        let body: &[u8] = resp.bytes();
        assert_eq!(body, b"abc");

        let mut raw = Vec::new();
        resp.raw().read_to_end(&mut raw).unwrap();
        assert!(raw.is_empty());
        assert_eq!(resp.status(), 200);
    }

    #[test]
    fn test_not_found_empty_body() {
        let mut resp = response(404, "");

        assert!(!resp.is_success());
        assert_eq!(resp.status(), 404);
        assert!(resp.bytes().is_empty());
        assert_eq!(resp.text(), "");
    }

    #[test]
    fn test_ensure_buffered_idempotent() {
        let (mut resp, reads, closed) = tracked("payload");

        resp.ensure_buffered().unwrap();
        let first = resp.bytes().to_vec();
        let reads_after_first = reads.load(Ordering::SeqCst);
        assert!(closed.load(Ordering::SeqCst));

        resp.ensure_buffered().unwrap();
        assert_eq!(resp.bytes(), first.as_slice());
        assert_eq!(reads.load(Ordering::SeqCst), reads_after_first);
        assert_eq!(first, b"payload");
    }

    #[test]
    fn test_raw_read_after_buffering_is_empty() {
        let mut resp = response(200, "hello");
        resp.ensure_buffered().unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(resp.raw().read(&mut buf).unwrap(), 0);
        assert_eq!(resp.text(), "hello");
    }

    #[test]
    fn test_raw_read_and_close() {
        let (mut resp, _, closed) = tracked("raw body");

        let mut out = String::new();
        resp.raw().read_to_string(&mut out).unwrap();
        assert_eq!(out, "raw body");
        assert!(!closed.load(Ordering::SeqCst));

        resp.close();
        resp.close();
        assert!(closed.load(Ordering::SeqCst));
        assert!(matches!(resp.ensure_buffered(), Err(NetError::BodyConsumed)));
    }

    #[test]
    fn test_content_length_mismatch() {
        let exchange = Exchange::new(200, HeaderMap::new(), Cursor::new(b"abc".to_vec()))
            .with_content_length(1 << 40);
        let mut resp = Response::from_exchange(exchange);
        assert_eq!(resp.bytes(), b"abc");

        let exchange = Exchange::new(200, HeaderMap::new(), Cursor::new(b"abcdef".to_vec()))
            .with_content_length(2);
        let mut resp = Response::from_exchange(exchange);
        assert_eq!(resp.bytes(), b"abcdef");
    }

    #[test]
    fn test_failed_buffering_keeps_no_data() {
        let body = BrokenBody {
            data: Some(b"partial".to_vec()),
        };
        let mut resp = Response::from_exchange(Exchange::new(200, HeaderMap::new(), body));

        assert!(matches!(resp.ensure_buffered(), Err(NetError::Io(_))));
        assert!(!resp.is_buffered());
        assert!(resp.bytes().is_empty());
        assert_eq!(resp.text(), "");
    }

    #[test]
    fn test_release_buffer() {
        let mut resp = response(200, "hello");
        resp.release_buffer();

        assert_eq!(resp.bytes(), b"hello");
        resp.release_buffer();
        assert!(!resp.is_buffered());
        assert!(resp.bytes().is_empty());
        assert_eq!(resp.text(), "");
        resp.release_buffer();
    }

    #[test]
    fn test_decode_json() {
        let mut resp = response(200, r#"{"a":1,"b":"x"}"#);
        let mut record = Record::default();

        resp.decode_json(&mut record).unwrap();
        assert_eq!(record, Record { a: 1, b: "x".into() });
        assert!(resp.bytes().is_empty());
    }

    #[test]
    fn test_decode_json_closes_stream() {
        let (mut resp, _, closed) = tracked(r#"{"a":2,"b":"y"}"#);

        let record: Record = resp.json().unwrap();
        assert_eq!(record.a, 2);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_decode_json_empty_body() {
        let mut resp = response(204, "");
        let mut record = Record {
            a: 7,
            b: "kept".into(),
        };

        resp.decode_json(&mut record).unwrap();
        assert_eq!(record.a, 7);
        assert_eq!(record.b, "kept");

        let mut resp = response(204, "");
        assert!(matches!(resp.json::<Record>(), Err(NetError::EmptyBody)));
    }

    #[test]
    fn test_decode_json_malformed() {
        let mut resp = response(200, r#"{"a":1,"b":"#);
        let mut record = Record::default();

        assert!(matches!(resp.decode_json(&mut record), Err(NetError::Json(_))));
        assert_eq!(record, Record::default());
    }

    #[test]
    fn test_decode_from_buffer_is_repeatable() {
        let mut resp = response(200, r#"{"a":3,"b":"z"}"#);
        assert!(!resp.text().is_empty());

        let first: Record = resp.json().unwrap();
        let second: Record = resp.json().unwrap();

        assert_eq!(first, second);
        assert_eq!(resp.text(), r#"{"a":3,"b":"z"}"#);
    }

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Book {
        title: String,
        year: u32,
    }

    struct Latin1;

    impl CharsetDecoder for Latin1 {
        fn decode<'r>(&self, charset: &str, mut input: Box<dyn Read + 'r>) -> io::Result<Box<dyn Read + 'r>> {
            if !charset.eq_ignore_ascii_case("iso-8859-1") {
                return Err(io::Error::new(io::ErrorKind::InvalidData, charset.to_string()));
            }
            let mut raw = Vec::new();
            input.read_to_end(&mut raw)?;
            let text: String = raw.iter().map(|&b| b as char).collect();
            Ok(Box::new(Cursor::new(text.into_bytes())))
        }
    }

    #[test]
    fn test_decode_xml() {
        let mut resp = response(200, "<book><title>Dune</title><year>1965</year></book>");
        let mut book = Book::default();

        resp.decode_xml(&mut book, None).unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.year, 1965);
    }

    #[test]
    fn test_decode_xml_empty_and_malformed() {
        let mut resp = response(200, "  \n");
        let mut book = Book::default();
        resp.decode_xml(&mut book, None).unwrap();
        assert_eq!(book, Book::default());

        let mut resp = response(200, "<book><title>Dune</title><year>soon</year></book>");
        assert!(matches!(resp.decode_xml(&mut book, None), Err(NetError::Xml(_))));
    }

    #[test]
    fn test_decode_xml_with_charset() {
        let mut body = br#"<?xml version="1.0" encoding="ISO-8859-1"?><book><title>Caf"#.to_vec();
        body.push(0xE9);
        body.extend_from_slice(b"</title><year>2001</year></book>");

        let exchange = Exchange::new(200, HeaderMap::new(), Cursor::new(body.clone()));
        let mut resp = Response::from_exchange(exchange);
        let book: Book = resp.xml(Some(&Latin1)).unwrap();
        assert_eq!(book.title, "Café");

        let exchange = Exchange::new(200, HeaderMap::new(), Cursor::new(body));
        let mut resp = Response::from_exchange(exchange);
        let err = resp.xml::<Book>(None).unwrap_err();
        assert!(matches!(err, NetError::UnsupportedCharset(ref c) if c == "ISO-8859-1"));
    }

    #[test]
    fn test_download_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.bin");
        let (mut resp, _, closed) = tracked("streamed to disk");

        let written = resp.download_to_file(&path).unwrap();
        assert_eq!(written, 16);
        assert!(closed.load(Ordering::SeqCst));
        assert!(!resp.is_buffered());
        assert_eq!(std::fs::read(&path).unwrap(), b"streamed to disk");

        let mut again = std::fs::OpenOptions::new().write(true).truncate(true).open(&path).unwrap();
        io::Write::write_all(&mut again, b"overwritten").unwrap();
    }

    #[test]
    fn test_download_after_buffering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buffered.txt");
        let mut resp = response(200, "kept in memory");
        resp.ensure_buffered().unwrap();

        resp.download_to_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "kept in memory");
        assert_eq!(resp.text(), "kept in memory");
    }

    #[test]
    fn test_download_bad_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("body.bin");
        let (mut resp, _, closed) = tracked("data");

        let err = resp.download_to_file(&path).unwrap_err();
        assert!(matches!(err, NetError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_download_read_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        let body = BrokenBody {
            data: Some(b"half".to_vec()),
        };
        let mut resp = Response::from_exchange(Exchange::new(200, HeaderMap::new(), body));

        assert!(matches!(resp.download_to_file(&path), Err(NetError::Io(_))));
        let mut buf = [0u8; 4];
        assert_eq!(resp.raw().read(&mut buf).unwrap(), 0);
    }
}
