//! Streaming JSON/XML decoding of response bodies

use std::io::{self, BufRead, BufReader, Cursor, Read};

use log::debug;
use serde::de::DeserializeOwned;

use crate::error::{NetError, NetResult};

/// How far ahead to look for the end of an XML declaration
const DECLARATION_LIMIT: usize = 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Converts a body in a declared charset into UTF-8
///
/// Consulted by XML decoding when the document's `<?xml ... encoding="..."?>`
/// declaration names anything other than UTF-8 or US-ASCII.
pub trait CharsetDecoder {
    /// Wrap `input`, encoded in `charset`, into a reader yielding UTF-8
    fn decode<'r>(&self, charset: &str, input: Box<dyn Read + 'r>) -> io::Result<Box<dyn Read + 'r>>;
}

/// Decode the first JSON value of `source`, `None` if the stream holds only whitespace
pub(crate) fn read_json<T: DeserializeOwned>(source: impl Read) -> NetResult<Option<T>> {
    let reader = BufReader::new(source);
    let mut values = serde_json::Deserializer::from_reader(reader).into_iter::<T>();

    match values.next() {
        Some(Ok(value)) => Ok(Some(value)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

/// Decode an XML document from `source`, `None` if the stream holds only whitespace
pub(crate) fn read_xml<'a, T: DeserializeOwned>(
    source: Box<dyn Read + 'a>,
    charset_decoder: Option<&dyn CharsetDecoder>,
) -> NetResult<Option<T>> {
    let mut reader = BufReader::new(source);

    let peeked = read_declaration(&mut reader)?;
    let head = strip_leading(&peeked);
    if head.is_empty() && skip_whitespace(&mut reader)? {
        return Ok(None);
    }

    let charset = declared_charset(head);
    let body = Cursor::new(head.to_vec()).chain(reader);

    match charset {
        Some(charset) if !is_utf8_compatible(&charset) => {
            let decoder = charset_decoder.ok_or_else(|| NetError::UnsupportedCharset(charset.clone()))?;
            debug!("Transcoding XML body from {}", charset);
            let decoded = decoder.decode(&charset, Box::new(body))?;
            Ok(Some(quick_xml::de::from_reader(BufReader::new(decoded))?))
        }
        _ => Ok(Some(quick_xml::de::from_reader(body)?)),
    }
}

/// Read ahead until the whole XML declaration, if any, has been seen
fn read_declaration(reader: &mut impl BufRead) -> io::Result<Vec<u8>> {
    let mut head = Vec::new();

    while head.len() < DECLARATION_LIMIT
        && may_be_declaration(&head)
        && !head.windows(2).any(|w| w == b"?>")
    {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            break;
        }
        let take = chunk.len().min(DECLARATION_LIMIT - head.len());
        head.extend_from_slice(&chunk[..take]);
        reader.consume(take);
    }

    Ok(head)
}

/// Whether `head` can still grow into a BOM, whitespace and `<?xml`
fn may_be_declaration(head: &[u8]) -> bool {
    if UTF8_BOM.starts_with(head) {
        return true;
    }
    let rest = strip_leading(head);
    let n = rest.len().min(5);
    rest[..n] == b"<?xml"[..n]
}

/// Drop a UTF-8 byte order mark and leading whitespace
fn strip_leading(head: &[u8]) -> &[u8] {
    let head = head.strip_prefix(UTF8_BOM).unwrap_or(head);
    let start = head.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(head.len());
    &head[start..]
}

/// Consume leading ASCII whitespace, returning true at end of stream
fn skip_whitespace(reader: &mut impl BufRead) -> io::Result<bool> {
    loop {
        let chunk = reader.fill_buf()?;
        if chunk.is_empty() {
            return Ok(true);
        }
        let len = chunk.len();
        let blank = chunk.iter().take_while(|b| b.is_ascii_whitespace()).count();
        reader.consume(blank);
        if blank < len {
            return Ok(false);
        }
    }
}

/// Extract the `encoding` pseudo-attribute of a leading XML declaration
fn declared_charset(head: &[u8]) -> Option<String> {
    let head = head.strip_prefix(b"<?xml")?;
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&head[..end]).ok()?;

    let rest = &decl[decl.find("encoding")? + "encoding".len()..];
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &rest[1..];
    let close = value.find(quote)?;

    Some(value[..close].to_string())
}

fn is_utf8_compatible(charset: &str) -> bool {
    ["utf-8", "utf8", "us-ascii", "ascii"]
        .iter()
        .any(|name| charset.eq_ignore_ascii_case(name))
}
