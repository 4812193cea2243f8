//! Core ICAP protocol abstractions.
//!
//! # Architecture
//!
//! - **Message Handling** ([`message`]): core message types and payload processing
//!   - [`Message`]: either a head or a payload item
//!   - [`PayloadItem`]: a body chunk, or one of the two chunked terminators
//!     (plain end and `ieof`)
//!   - [`PayloadSize`]: whether an outgoing message has a chunked body
//!
//! - **Request Processing** ([`request`])
//!   - [`RequestHeader`]: the ICAP start line and headers
//!   - [`Request`]: what a handler sees: header, encapsulated HTTP heads, preview
//!
//! - **Response Processing** ([`response`])
//!   - [`ResponseHead`]: status, headers and the optional encapsulated HTTP head
//!
//! - **Encapsulation** ([`encapsulated`]): the `Encapsulated` header model
//!
//! - **Preview** ([`preview`]): the preview/continue state machine
//!
//! - **Error Handling** ([`error`])
//!   - [`IcapError`]: top-level error type
//!   - [`ParseError`]: request parsing errors
//!   - [`SendError`]: response sending errors
//!   - [`MuxError`]: route registration errors

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::OPTIONS;
pub use request::REQMOD;
pub use request::RESPMOD;
pub use request::Request;
pub use request::RequestHeader;

mod response;
pub use response::HttpHead;
pub use response::ResponseHead;
pub use response::reason_phrase;

mod encapsulated;
pub use encapsulated::Encapsulated;
pub use encapsulated::Section;

mod preview;
pub use preview::CONTINUE_LINE;
pub use preview::PreviewNegotiator;
pub use preview::PreviewState;

mod error;
pub use error::IcapError;
pub use error::MuxError;
pub use error::ParseError;
pub use error::SendError;
