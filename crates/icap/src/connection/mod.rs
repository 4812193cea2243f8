//! ICAP connection handling module
//!
//! This module drives one ICAP connection from the first request line to the
//! close of the stream.
//!
//! # Components
//!
//! - [`IcapConnection`]: the per-connection worker that:
//!   - Decodes pipelined requests one after the other
//!   - Reads the preview before the handler runs
//!   - Calls the handler and completes whatever response it left open
//!   - Answers requests that fail to parse with `400 Bad Request`
//!
//! - [`ResponseWriter`]: the handler's side of the exchange that:
//!   - Commits the response head exactly once
//!   - Frames response body chunks
//!   - Reads the request body lazily, sending `100 Continue` when a previewed
//!     body is asked for

mod icap_connection;
mod response_writer;

use tokio::io::{AsyncRead, AsyncWrite};

pub use icap_connection::IcapConnection;
pub use response_writer::ResponseWriter;

pub(crate) type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;
