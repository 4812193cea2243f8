//! ICAP header processing module
//!
//! # Components
//!
//! - [`HeaderDecoder`]: decodes the ICAP start line and header block
//!   - Exactly three start-line tokens
//!   - Interprets `Preview` and `Encapsulated`
//!   - Enforces the header size and count limits
//!
//! - [`HeaderEncoder`]: encodes the ICAP status line and headers
//!   - ICAP reason phrases
//!   - Computes `Encapsulated` and adds `Date`
//!   - Appends the encapsulated HTTP head
//!
//! - [`http_head`]: parses and serializes the encapsulated HTTP heads

mod header_decoder;
mod header_encoder;
pub(crate) mod http_head;

pub use header_decoder::HeaderDecoder;
pub use header_encoder::HeaderEncoder;
