//! Courier Network Layer
//!
//! Blocking HTTP responses with lazy body buffering, JSON/XML decoding and
//! streaming to disk.

mod client;
mod decode;
mod error;
mod exchange;
mod response;

pub use client::{ClientConfig, HttpClient};
pub use decode::CharsetDecoder;
pub use error::{NetError, NetResult};
pub use exchange::Exchange;
pub use response::{RawBody, Response};
