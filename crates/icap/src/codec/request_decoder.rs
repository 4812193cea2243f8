//! ICAP request decoder module
//!
//! This module decodes ICAP requests from a byte stream. One request goes through
//! up to three phases:
//!
//! 1. The start line and ICAP headers, decoded by [`HeaderDecoder`]
//! 2. The encapsulated HTTP heads, read as exactly as many bytes as the
//!    `Encapsulated` header says and parsed into `http` types
//! 3. The chunked body, if the `Encapsulated` header names a body section
//!
//! The decoder yields one [`Message::Header`] holding the [`Request`] once phases 1
//! and 2 are done, then [`Message::Payload`] items until the terminal chunk.
//!
//! When a request carries a preview, the terminal chunk of the preview ends the
//! body as far as the decoder knows. If the server then asks for the remainder,
//! [`RequestDecoder::resume_chunked`] starts decoding the second chunked sequence.
//!
//! # Example
//!
//! ```
//! use micro_icap::codec::RequestDecoder;
//! use micro_icap::protocol::Message;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from(&b"OPTIONS icap://icap.example.org/respmod ICAP/1.0\r\n\r\n"[..]);
//!
//! let message = decoder.decode(&mut buffer).unwrap().unwrap();
//! let Message::Header(request) = message else { panic!("expect request header") };
//! assert!(request.header().is_options());
//! ```

use crate::codec::body::ChunkedDecoder;
use crate::codec::header::HeaderDecoder;
use crate::codec::header::http_head::{parse_http_request, parse_http_response};
use crate::config::IcapConfig;
use crate::ensure;
use crate::protocol::{Message, ParseError, PayloadItem, Request, RequestHeader, Section};
use bytes::BytesMut;
use http::HeaderMap;
use tokio_util::codec::Decoder;
use tracing::trace;

/// A decoder for ICAP requests that handles headers, encapsulated heads and payload
#[derive(Debug)]
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    state: State,
    trailers: Option<HeaderMap>,
    config: IcapConfig,
}

#[derive(Debug)]
enum State {
    /// Waiting for the next start line
    Header,
    /// Waiting for all bytes of the encapsulated HTTP heads
    EncapsulatedHead(RequestHeader),
    /// Decoding a chunked sequence
    Payload(ChunkedDecoder),
}

impl RequestDecoder {
    /// Creates a new `RequestDecoder` with the default limits
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_config(config: &IcapConfig) -> Self {
        Self { header_decoder: HeaderDecoder::with_config(config), state: State::Header, trailers: None, config: *config }
    }

    /// Starts decoding a new chunked sequence on the same stream.
    ///
    /// Used after `100 Continue` was sent for a previewed body.
    pub fn resume_chunked(&mut self) {
        self.trailers = None;
        self.state = State::Payload(ChunkedDecoder::with_config(&self.config));
    }

    /// Whether the decoder is in the middle of a chunked sequence.
    pub fn is_reading_payload(&self) -> bool {
        matches!(self.state, State::Payload(_))
    }

    /// Takes the trailer fields of the last finished chunked sequence.
    pub fn take_trailers(&mut self) -> Option<HeaderMap> {
        self.trailers.take()
    }

    fn decode_encapsulated_head(&self, header: RequestHeader, src: &mut BytesMut) -> Result<Request, ParseError> {
        let head_len = header.encapsulated().head_len();
        let head_bytes = src.split_to(head_len).freeze();

        let mut http_request = None;
        let mut http_response = None;
        for (section, range) in header.encapsulated().head_ranges() {
            match section {
                Section::ReqHdr => http_request = Some(parse_http_request(&head_bytes[range], self.config.max_headers)?),
                Section::ResHdr => http_response = Some(parse_http_response(&head_bytes[range], self.config.max_headers)?),
                _ => {}
            }
        }

        trace!(head_len, has_request = http_request.is_some(), has_response = http_response.is_some(), "parsed encapsulated heads");
        Ok(Request::new(header, http_request, http_response))
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::with_config(&IcapConfig::default())
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<Request>;
    type Error = ParseError;

    /// Attempts to decode the next part of an ICAP request from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(Message::Header(_)))`: decoded the request head and encapsulated HTTP heads
    /// - `Ok(Some(Message::Payload(_)))`: decoded a payload chunk or a terminator
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(_)`: encountered a parsing error
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match std::mem::replace(&mut self.state, State::Header) {
                State::Header => {
                    let Some(header) = self.header_decoder.decode(src)? else {
                        return Ok(None);
                    };

                    let head_len = header.encapsulated().head_len();
                    ensure!(
                        head_len <= self.config.max_encapsulated_bytes,
                        ParseError::invalid_encapsulated(format!(
                            "encapsulated heads of {head_len} bytes exceed the limit {}",
                            self.config.max_encapsulated_bytes
                        ))
                    );
                    self.state = State::EncapsulatedHead(header);
                }

                State::EncapsulatedHead(header) => {
                    let head_len = header.encapsulated().head_len();
                    if src.len() < head_len {
                        src.reserve(head_len - src.len());
                        self.state = State::EncapsulatedHead(header);
                        return Ok(None);
                    }

                    let request = self.decode_encapsulated_head(header, src)?;
                    if request.has_body() {
                        self.state = State::Payload(ChunkedDecoder::with_config(&self.config));
                    }
                    return Ok(Some(Message::Header(request)));
                }

                State::Payload(mut payload_decoder) => {
                    let message = match payload_decoder.decode(src)? {
                        Some(item @ PayloadItem::Chunk(_)) => {
                            self.state = State::Payload(payload_decoder);
                            Some(Message::Payload(item))
                        }
                        Some(item) => {
                            // the chunked sequence is over, the state is back to `Header`
                            self.trailers = payload_decoder.take_trailers();
                            Some(Message::Payload(item))
                        }
                        None => {
                            self.state = State::Payload(payload_decoder);
                            None
                        }
                    };

                    return Ok(message);
                }
            }
        }
    }

    /// Decodes what is left when the stream is closed.
    ///
    /// A close between two requests is a normal end of the connection. A close in the
    /// middle of a request is [`ParseError::UnexpectedEof`].
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            None if buf.is_empty() && matches!(self.state, State::Header) => Ok(None),
            None => Err(ParseError::UnexpectedEof),
        }
    }
}
