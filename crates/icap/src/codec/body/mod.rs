//! ICAP body handling module
//!
//! ICAP bodies (and previews) are always sent with chunked framing, so this module
//! has a single decoding strategy and an encoder that either frames chunks or
//! writes nothing at all.
//!
//! # Components
//!
//! - [`ChunkedDecoder`]: decodes one chunked sequence, including the `ieof`
//!   terminator and trailer fields
//! - [`ChunkedEncoder`]: frames chunks and writes the terminal chunk
//! - [`PayloadEncoder`]: chunked or no body, chosen when the response head is sent

mod chunked_decoder;
mod chunked_encoder;
mod payload_encoder;

pub use chunked_decoder::ChunkedDecoder;
pub use chunked_encoder::ChunkedEncoder;
pub use payload_encoder::PayloadEncoder;
