//! Decoder for the chunked framing of ICAP bodies.
//!
//! ICAP always sends bodies chunked, using the framing of
//! [RFC 7230 Section 4.1](https://tools.ietf.org/html/rfc7230#section-4.1) with one
//! addition from RFC 3507: the `ieof` chunk extension. A zero-sized chunk carrying
//! `ieof` (`0; ieof\r\n\r\n`) ends the sequence and tells the server that no more data
//! will follow, not even after a `100 Continue`.
//!
//! The decoder yields [`PayloadItem::Chunk`] for body data and finishes with either
//! [`PayloadItem::Eof`] or [`PayloadItem::Ieof`]. Trailer fields after the terminal
//! chunk are parsed and kept until [`ChunkedDecoder::take_trailers`] is called.

use std::task::Poll;

use bytes::{Buf, Bytes, BytesMut};
use http::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::config::IcapConfig;
use crate::protocol::{ParseError, PayloadItem};
use ChunkedState::*;

/// Upper bound for the extension part of one chunk size line
const MAX_EXTENSION_BYTES: usize = 1024;

const IEOF: &[u8] = b"ieof";

/// A decoder for one chunked sequence.
///
/// The decoder processes incoming bytes according to the chunked format:
/// - Each chunk starts with its size in hexadecimal
/// - Followed by optional extensions and CRLF
/// - Then the chunk data and CRLF
/// - A zero-sized chunk ends the sequence, optionally followed by trailer fields
///
/// Errors leave the stream at an unknown position, the connection can't be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    size_digits: usize,
    extension: Vec<u8>,
    ieof: bool,
    trailer: Vec<u8>,
    trailers: Option<HeaderMap>,
    max_chunk_size: u64,
    max_trailer_bytes: usize,
    max_trailers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Read the chunk size in hex
    Size,
    /// Handle whitespace after size
    SizeLws,
    /// Collect chunk extensions
    Extension,
    /// Read LF after chunk size
    SizeLf,
    /// Read chunk data
    Body,
    /// Read CR after chunk data
    BodyCr,
    /// Read LF after chunk data
    BodyLf,
    /// Read a trailer field
    Trailer,
    /// Read LF after trailer
    TrailerLf,
    /// Read final CR, or the start of a trailer field
    EndCr,
    /// Read final LF
    EndLf,
    /// Final state after reading last chunk
    End,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    /// Creates a decoder with the default limits.
    ///
    /// The decoder starts in the Size state, ready to read the size of the first chunk.
    pub fn new() -> Self {
        Self::with_config(&IcapConfig::default())
    }

    pub fn with_config(config: &IcapConfig) -> Self {
        Self {
            state: Size,
            remaining_size: 0,
            size_digits: 0,
            extension: Vec::new(),
            ieof: false,
            trailer: Vec::new(),
            trailers: None,
            max_chunk_size: config.max_chunk_size,
            max_trailer_bytes: config.max_trailer_bytes,
            max_trailers: config.max_headers,
        }
    }

    /// Whether an `ieof` extension was seen in this sequence so far.
    pub fn is_ieof(&self) -> bool {
        self.ieof
    }

    /// Whether the terminal chunk and its trailers were fully read.
    pub fn is_finished(&self) -> bool {
        self.state == End
    }

    /// Takes the trailer fields of a finished sequence.
    pub fn take_trailers(&mut self) -> Option<HeaderMap> {
        self.trailers.take()
    }
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    /// Decodes chunked data from the input buffer.
    ///
    /// # Returns
    /// - `Ok(Some(PayloadItem::Chunk(bytes)))` when chunk data is available
    /// - `Ok(Some(PayloadItem::Eof))` when the sequence ended normally
    /// - `Ok(Some(PayloadItem::Ieof))` when the sequence ended with `ieof`
    /// - `Ok(None)` when more data is needed
    /// - `Err(ParseError)` if the framing is invalid
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!(ieof = self.ieof, "finished reading chunked data");
                let item = if self.ieof { PayloadItem::Ieof } else { PayloadItem::Eof };
                return Ok(Some(item));
            }

            if src.is_empty() {
                // need more data
                return Ok(None);
            }

            let mut buf = None;

            self.state = match self.step(src, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(Ok(new_state)) => new_state,
                Poll::Ready(Err(e)) => return Err(e),
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.len() > 0 {
            $src.get_u8()
        } else {
            return Poll::Pending;
        }
    }};
}

impl ChunkedDecoder {
    fn step(&mut self, src: &mut BytesMut, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
        match self.state {
            Size => self.read_size(src),
            SizeLws => Self::read_size_lws(src),
            Extension => self.read_extension(src),
            SizeLf => self.read_size_lf(src),
            Body => self.read_body(src, buf),
            BodyCr => Self::read_body_cr(src),
            BodyLf => self.read_body_lf(src),
            Trailer => self.read_trailer(src),
            TrailerLf => self.read_trailer_lf(src),
            EndCr => Self::read_end_cr(src),
            EndLf => self.read_end_lf(src),
            End => Poll::Ready(Ok(End)),
        }
    }

    /// Reads the chunk size in hex, one digit at a time.
    ///
    /// # State Transitions
    /// - On hex digit: stay in Size
    /// - On whitespace (tab/space): SizeLws
    /// - On semicolon: Extension
    /// - On CR: SizeLf
    /// - On anything else: error
    fn read_size(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            b => return Poll::Ready(Err(ParseError::chunk_framing(format!("invalid chunk size byte {b:#04x}")))),
        };

        let size = self.remaining_size.checked_mul(16).and_then(|size| size.checked_add(u64::from(digit)));
        match size {
            Some(size) if size <= self.max_chunk_size => {
                self.remaining_size = size;
                self.size_digits += 1;
                Poll::Ready(Ok(Size))
            }
            Some(size) => Poll::Ready(Err(ParseError::too_large_chunk(size, self.max_chunk_size))),
            None => Poll::Ready(Err(ParseError::chunk_framing("chunk size overflow"))),
        }
    }

    /// Linear whitespace after the size, no more digits can come.
    fn read_size_lws(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            _ => Poll::Ready(Err(ParseError::chunk_framing("invalid chunk size linear white space"))),
        }
    }

    /// Collects the extension bytes up to the CR ending the size line.
    ///
    /// Plain LF is rejected inside extensions.
    fn read_extension(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Poll::Ready(Err(ParseError::chunk_framing("chunk extension contains newline"))),
            b => {
                if self.extension.len() >= MAX_EXTENSION_BYTES {
                    return Poll::Ready(Err(ParseError::chunk_framing("chunk extension too long")));
                }
                self.extension.push(b);
                Poll::Ready(Ok(Extension))
            }
        }
    }

    /// Completes the size line.
    ///
    /// # State Transitions
    /// - On LF with size 0: EndCr, to read trailers or the final CRLF
    /// - On LF with size > 0: Body
    /// - On anything else: error
    fn read_size_lf(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        if try_next_byte!(src) != b'\n' {
            return Poll::Ready(Err(ParseError::chunk_framing("invalid chunk size LF")));
        }

        if self.size_digits == 0 {
            return Poll::Ready(Err(ParseError::chunk_framing("missing chunk size")));
        }

        if has_ieof(&self.extension) {
            self.ieof = true;
        }
        self.extension.clear();

        if self.remaining_size == 0 { Poll::Ready(Ok(EndCr)) } else { Poll::Ready(Ok(Body)) }
    }

    /// Reads up to the remaining chunk size from the buffer, without copying.
    fn read_body(&mut self, src: &mut BytesMut, buf: &mut Option<Bytes>) -> Poll<Result<ChunkedState, ParseError>> {
        if src.is_empty() {
            return Poll::Ready(Ok(Body));
        }

        if self.remaining_size == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        // cap remaining bytes at the max capacity of usize
        let remaining = usize::try_from(self.remaining_size).unwrap_or(usize::MAX);
        let read_size = std::cmp::min(remaining, src.len());

        self.remaining_size -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        if self.remaining_size > 0 { Poll::Ready(Ok(Body)) } else { Poll::Ready(Ok(BodyCr)) }
    }

    fn read_body_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            _ => Poll::Ready(Err(ParseError::chunk_framing("invalid chunk body CR"))),
        }
    }

    /// Completes the chunk and gets ready for the next size line.
    fn read_body_lf(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => {
                self.size_digits = 0;
                Poll::Ready(Ok(Size))
            }
            _ => Poll::Ready(Err(ParseError::chunk_framing("invalid chunk body LF"))),
        }
    }

    /// Buffers a trailer field line, up to its CR.
    fn read_trailer(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        let b = try_next_byte!(src);
        if self.trailer.len() >= self.max_trailer_bytes {
            return Poll::Ready(Err(ParseError::chunk_framing(format!(
                "trailer section exceed the limit {}",
                self.max_trailer_bytes
            ))));
        }
        self.trailer.push(b);
        match b {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_trailer_lf(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match try_next_byte!(src) {
            b'\n' => {
                self.trailer.push(b'\n');
                Poll::Ready(Ok(EndCr))
            }
            _ => Poll::Ready(Err(ParseError::chunk_framing("invalid trailer end LF"))),
        }
    }

    /// Either the final CR, or the first byte of a trailer field, which is left in
    /// the buffer for [`ChunkedState::Trailer`].
    fn read_end_cr(src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        match src.first() {
            None => Poll::Pending,
            Some(b'\r') => {
                src.advance(1);
                Poll::Ready(Ok(EndLf))
            }
            Some(_) => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_end_lf(&mut self, src: &mut BytesMut) -> Poll<Result<ChunkedState, ParseError>> {
        if try_next_byte!(src) != b'\n' {
            return Poll::Ready(Err(ParseError::chunk_framing("invalid chunk end LF")));
        }

        if !self.trailer.is_empty() {
            match parse_trailers(&self.trailer, self.max_trailers) {
                Ok(trailers) => self.trailers = Some(trailers),
                Err(e) => return Poll::Ready(Err(e)),
            }
            self.trailer.clear();
        }

        Poll::Ready(Ok(End))
    }
}

/// Checks the `;`-separated extensions of one size line for `ieof`.
fn has_ieof(extension: &[u8]) -> bool {
    extension.split(|b| *b == b';').any(|ext| {
        let name = ext.split(|b| *b == b'=').next().unwrap_or_default();
        name.trim_ascii().eq_ignore_ascii_case(IEOF)
    })
}

/// Parses the buffered trailer lines, each ending with CRLF.
fn parse_trailers(trailer: &[u8], max_trailers: usize) -> Result<HeaderMap, ParseError> {
    let mut block = Vec::with_capacity(trailer.len() + 2);
    block.extend_from_slice(trailer);
    block.extend_from_slice(b"\r\n");

    let mut headers = vec![httparse::EMPTY_HEADER; max_trailers];
    match httparse::parse_headers(&block, &mut headers) {
        Ok(httparse::Status::Complete((_, parsed))) => {
            let mut trailers = HeaderMap::with_capacity(parsed.len());
            for header in parsed {
                let name = HeaderName::from_bytes(header.name.as_bytes())
                    .map_err(|e| ParseError::chunk_framing(format!("invalid trailer name: {e}")))?;
                let value = HeaderValue::from_bytes(header.value)
                    .map_err(|e| ParseError::chunk_framing(format!("invalid trailer value: {e}")))?;
                trailers.append(name, value);
            }
            Ok(trailers)
        }
        Ok(httparse::Status::Partial) => Err(ParseError::chunk_framing("incomplete trailer section")),
        Err(e) => Err(ParseError::chunk_framing(format!("invalid trailer: {e}"))),
    }
}
