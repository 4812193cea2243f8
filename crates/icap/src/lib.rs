//! An asynchronous micro ICAP server implementation
//!
//! This crate implements the server side of ICAP (RFC 3507), the protocol proxies
//! use to hand HTTP messages to content adaptation services such as virus scanners
//! or content filters. It is built on top of tokio and keeps the same shape as a
//! small HTTP server: a codec layer, a per-connection worker and a handler trait.
//!
//! # Features
//!
//! - `REQMOD`, `RESPMOD`, `OPTIONS` and vendor methods
//! - `Encapsulated` header parsing, with the embedded HTTP heads decoded
//! - Chunked bodies, including the `ieof` extension and trailers
//! - Preview negotiation with `100 Continue`
//! - Pipelined requests on one connection
//! - Path routing with canonical-path redirects
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use http::StatusCode;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn, Level};
//! use tracing_subscriber::FmtSubscriber;
//! use micro_icap::connection::IcapConnection;
//! use micro_icap::handler::{handler_fn, HandlerError};
//! use micro_icap::mux::ServeMux;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Initialize logging
//!     let subscriber = FmtSubscriber::builder()
//!         .with_max_level(Level::INFO)
//!         .finish();
//!     tracing::subscriber::set_global_default(subscriber)
//!         .expect("setting default subscriber failed");
//!
//!     let mut mux = ServeMux::new();
//!     mux.register("/allow", handler_fn(|writer, _request| {
//!         Box::pin(async move {
//!             writer.write_header(StatusCode::NO_CONTENT, None, false).await?;
//!             Ok::<_, HandlerError>(())
//!         })
//!     }))
//!     .expect("register handler failed");
//!     let mux = Arc::new(mux);
//!
//!     info!(port = 1344, "start listening");
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:1344").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     loop {
//!         let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let mux = mux.clone();
//!
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = IcapConnection::new(reader, writer).with_remote_addr(remote_addr);
//!             match connection.process(mux).await {
//!                 Ok(_) => info!("finished process, connection shutdown"),
//!                 Err(e) => error!("service has error, cause {}, connection shutdown", e),
//!             }
//!         });
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`connection`]: the per-connection worker and the response writer
//! - [`protocol`]: request and response types, preview state machine, errors
//! - [`codec`]: decoders and encoders for heads and chunked bodies
//! - [`handler`]: the handler trait and ready-made handlers
//! - [`mux`]: routing by service path
//! - [`config`]: parser limits
//!
//! # Request Processing
//!
//! [`connection::IcapConnection::process`] decodes one request at a time. The ICAP
//! head and the encapsulated HTTP heads are read before the handler runs; the
//! chunked body stays on the wire. A preview, when announced, is read up front and
//! attached to the request. The handler then reads the rest of the body through the
//! [`connection::ResponseWriter`], which sends `100 Continue` first if the body was
//! previewed. Nothing is sent if the handler answers from the preview alone.
//!
//! After the handler returns, the connection skips body bytes it didn't read,
//! commits `200 OK` if no response was written, and ends an open response body.
//!
//! # Error Handling
//!
//! - [`protocol::IcapError`]: top level error returned by `process`
//! - [`protocol::ParseError`]: malformed requests and body framing
//! - [`protocol::SendError`]: write failures and response writer misuse
//! - [`protocol::MuxError`]: route registration
//!
//! A request that fails to parse is answered with `400 Bad Request` and ends the
//! connection. A handler error becomes `500 Internal Server Error` if the handler
//! had not committed a response yet.
//!
//! # Logging
//!
//! Diagnostics go through `tracing`. Nothing is logged until the application installs
//! a subscriber.
//!
//! # Limitations
//!
//! - Server side only
//! - No TLS support
//! - Limits are configured through [`config::IcapConfig`], by default 8KB of ICAP
//!   header and 64 header fields

pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod mux;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
