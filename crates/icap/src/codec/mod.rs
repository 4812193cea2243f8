//! ICAP codec module for encoding and decoding ICAP messages
//!
//! This module provides streaming ICAP message processing on top of tokio-util's
//! [`Decoder`](tokio_util::codec::Decoder) and [`Encoder`](tokio_util::codec::Encoder)
//! traits. It uses a state machine pattern to handle heads, encapsulated HTTP heads
//! and chunked payload data.
//!
//! # Architecture
//!
//! - Request handling:
//!   - [`RequestDecoder`]: decodes incoming ICAP requests
//!   - Header parsing via [`HeaderDecoder`]
//!   - Chunked payload decoding via [`ChunkedDecoder`]
//!
//! - Response handling:
//!   - [`ResponseEncoder`]: encodes outgoing ICAP responses
//!   - Header encoding via [`HeaderEncoder`]
//!   - Chunked payload encoding via [`ChunkedEncoder`]
//!
//! # Example
//!
//! ```
//! use bytes::{Bytes, BytesMut};
//! use http::StatusCode;
//! use micro_icap::codec::ResponseEncoder;
//! use micro_icap::protocol::{Message, PayloadItem, PayloadSize, ResponseHead};
//! use tokio_util::codec::Encoder;
//!
//! let mut encoder = ResponseEncoder::new();
//! let mut buffer = BytesMut::new();
//!
//! let head = ResponseHead::new(StatusCode::OK);
//! encoder.encode(Message::<_, Bytes>::Header((head, PayloadSize::Chunked)), &mut buffer).unwrap();
//! encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Chunk(Bytes::from("hi"))), &mut buffer).unwrap();
//! encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut buffer).unwrap();
//!
//! assert!(buffer.ends_with(b"\r\n\r\n2\r\nhi\r\n0\r\n\r\n"));
//! ```

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use body::{ChunkedDecoder, ChunkedEncoder, PayloadEncoder};
pub use header::{HeaderDecoder, HeaderEncoder};
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
