//! ICAP header decoder implementation for parsing request start lines and headers
//!
//! This module decodes the start line and the MIME-style header block of an ICAP
//! request into a [`RequestHeader`].
//!
//! # Grammar
//!
//! ```text
//! <METHOD> <TARGET> <ICAP-VERSION>\r\n
//! Name: value\r\n
//! ...
//! \r\n
//! ```
//!
//! The start line must split into exactly three whitespace-separated tokens. Lines
//! may end with CRLF or a bare LF. `httparse` can't parse the start line itself, as
//! it only accepts `HTTP/1.x` versions, so the line is tokenized here and only the
//! header block goes through [`httparse::parse_headers`].
//!
//! # Implementation Details
//!
//! The decoder consumes exactly the start line and the header block from the buffer,
//! never more. Header names and values are recorded as byte ranges, then sliced out
//! of one frozen buffer, so building the [`HeaderMap`](http::HeaderMap) doesn't copy.

use std::ops::Range;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use httparse::{Error, Status};
use tokio_util::codec::Decoder;
use tracing::{debug, trace};

use crate::config::IcapConfig;
use crate::ensure;
use crate::protocol::{Encapsulated, ParseError, RequestHeader};

const PREVIEW: &str = "preview";
const ENCAPSULATED: &str = "encapsulated";

/// Decoder for ICAP request headers implementing the [`Decoder`] trait.
#[derive(Debug, Clone)]
pub struct HeaderDecoder {
    max_header_bytes: usize,
    max_headers: usize,
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::with_config(&IcapConfig::default())
    }
}

impl HeaderDecoder {
    pub fn with_config(config: &IcapConfig) -> Self {
        Self { max_header_bytes: config.max_header_bytes, max_headers: config.max_headers }
    }
}

impl Decoder for HeaderDecoder {
    type Item = RequestHeader;
    type Error = ParseError;

    /// Attempts to decode an ICAP start line and header block from the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(header))` if a complete header was parsed
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if parsing failed
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if:
    /// - The start line doesn't have exactly three tokens
    /// - The number of headers exceeds the configured maximum
    /// - The start line and headers exceed the configured size
    /// - The method, target, `Preview` or `Encapsulated` values are invalid
    /// - Headers contain invalid characters
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(line_end) = src.iter().position(|b| *b == b'\n') else {
            ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
            return Ok(None);
        };

        let line_len = line_end + 1;
        ensure!(line_len <= self.max_header_bytes, ParseError::too_large_header(line_len, self.max_header_bytes));

        let tokens = split_start_line(&src[..line_end])?;

        let mut headers = vec![httparse::EMPTY_HEADER; self.max_headers];
        let parsed_result = httparse::parse_headers(&src[line_len..], &mut headers).map_err(|e| match e {
            Error::TooManyHeaders => ParseError::too_many_headers(self.max_headers),
            e => ParseError::invalid_header(e.to_string()),
        });

        let (block_len, parsed) = match parsed_result? {
            Status::Complete(complete) => complete,
            Status::Partial => {
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                return Ok(None);
            }
        };

        let header_size = line_len + block_len;
        trace!(header_size, "parsed header size");
        ensure!(header_size <= self.max_header_bytes, ParseError::too_large_header(header_size, self.max_header_bytes));

        let header_index = HeaderIndex::record(&src[..], parsed);

        // Split the header portion from the source buffer, the rest belongs to the body
        let header_bytes = src.split_to(header_size).freeze();

        let [method, target, version] = tokens;
        let method = Method::from_bytes(&header_bytes[method]).map_err(|_| ParseError::InvalidMethod)?;
        let raw_target = std::str::from_utf8(&header_bytes[target.clone()]).map_err(|_| ParseError::InvalidUri)?.to_owned();
        let uri = Uri::from_maybe_shared(header_bytes.slice(target)).map_err(|_| ParseError::InvalidUri)?;
        let version = String::from_utf8_lossy(&header_bytes[version]).into_owned();

        trace!(%method, uri = %raw_target, %version, "parsed icap start line");

        let headers = build_headers(&header_bytes, &header_index)?;
        let preview = parse_preview(&headers)?;
        let encapsulated = match headers.get(ENCAPSULATED) {
            Some(value) => Encapsulated::parse(value.as_bytes())?,
            None => Encapsulated::default(),
        };

        if let Some(preview) = preview {
            debug!(preview, "request announces preview");
        }

        let header = RequestHeader::new(method, raw_target, uri, version, headers)
            .with_preview(preview)
            .with_encapsulated(encapsulated);

        Ok(Some(header))
    }
}

/// Splits the start line into its method, target and version tokens.
///
/// A trailing CR is dropped. Anything other than three tokens is rejected, carrying
/// the line for diagnostics.
fn split_start_line(line: &[u8]) -> Result<[Range<usize>; 3], ParseError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let mut tokens: [Range<usize>; 3] = [0..0, 0..0, 0..0];
    let mut count = 0;
    let mut start = None;

    for (index, b) in line.iter().enumerate().chain(std::iter::once((line.len(), &b' '))) {
        match (b.is_ascii_whitespace(), start) {
            (false, None) => start = Some(index),
            (true, Some(token_start)) => {
                if count == tokens.len() {
                    return Err(ParseError::malformed_start_line(String::from_utf8_lossy(line)));
                }
                tokens[count] = token_start..index;
                count += 1;
                start = None;
            }
            _ => {}
        }
    }

    ensure!(count == tokens.len(), ParseError::malformed_start_line(String::from_utf8_lossy(line)));
    Ok(tokens)
}

/// Stores the byte range positions of a header's name and value within the original buffer.
///
/// Recording positions rather than copying lets the decoder slice every name and
/// value out of one frozen buffer.
#[derive(Clone)]
struct HeaderIndex {
    name: Range<usize>,
    value: Range<usize>,
}

impl HeaderIndex {
    /// Records the byte positions of header names and values from the parsed headers.
    ///
    /// `headers` must borrow from `bytes`.
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>]) -> Vec<HeaderIndex> {
        let bytes_ptr = bytes.as_ptr() as usize;
        headers
            .iter()
            .map(|header| {
                let name_start = header.name.as_ptr() as usize - bytes_ptr;
                let value_start = header.value.as_ptr() as usize - bytes_ptr;
                HeaderIndex {
                    name: name_start..name_start + header.name.len(),
                    value: value_start..value_start + header.value.len(),
                }
            })
            .collect()
    }
}

fn build_headers(header_bytes: &Bytes, header_index: &[HeaderIndex]) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::with_capacity(header_index.len());
    for index in header_index {
        let name = HeaderName::from_bytes(&header_bytes[index.name.clone()]).map_err(|e| ParseError::invalid_header(e.to_string()))?;
        let value = HeaderValue::from_maybe_shared(header_bytes.slice(index.value.clone()))
            .map_err(|e| ParseError::invalid_header(e.to_string()))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn parse_preview(headers: &HeaderMap) -> Result<Option<u64>, ParseError> {
    let Some(value) = headers.get(PREVIEW) else {
        return Ok(None);
    };

    let value = value.to_str().map_err(|_| ParseError::invalid_preview("value can't to_str"))?;
    let size = value.trim().parse::<u64>().map_err(|_| ParseError::invalid_preview(format!("value {value} is not u64")))?;
    Ok(Some(size))
}
