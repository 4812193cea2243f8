//! ICAP request handling implementation.
//!
//! This module provides the two request types of the crate:
//!
//! - [`RequestHeader`]: the ICAP start line and header block, as produced by the
//!   header decoder
//! - [`Request`]: the header plus everything the connection learns before a handler
//!   runs (encapsulated HTTP heads, preview bytes, the peer address)

use std::net::SocketAddr;

use bytes::Bytes;
use http::header::ALLOW;
use http::{HeaderMap, Method, Uri};

use crate::protocol::{Encapsulated, Section};

pub const REQMOD: &str = "REQMOD";
pub const RESPMOD: &str = "RESPMOD";
pub const OPTIONS: &str = "OPTIONS";

/// The ICAP start line and header block of a request.
///
/// The method and version tokens are kept verbatim: vendor methods are passed to
/// handlers untouched, and the version is not checked against `ICAP/1.0`.
/// `Preview` and `Encapsulated` are validated while decoding, so a header that
/// exists is known to carry well-formed values for both.
#[derive(Debug)]
pub struct RequestHeader {
    method: Method,
    raw_target: String,
    uri: Uri,
    version: String,
    headers: HeaderMap,
    preview: Option<u64>,
    encapsulated: Encapsulated,
}

impl RequestHeader {
    pub(crate) fn new(method: Method, raw_target: String, uri: Uri, version: String, headers: HeaderMap) -> Self {
        Self { method, raw_target, uri, version, headers, preview: None, encapsulated: Encapsulated::default() }
    }

    pub(crate) fn with_preview(mut self, preview: Option<u64>) -> Self {
        self.preview = preview;
        self
    }

    pub(crate) fn with_encapsulated(mut self, encapsulated: Encapsulated) -> Self {
        self.encapsulated = encapsulated;
        self
    }

    /// Returns a reference to the request's ICAP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the target token exactly as it appeared on the request line.
    pub fn raw_target(&self) -> &str {
        &self.raw_target
    }

    /// Returns the parsed target.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the ICAP service path of the target.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Returns the protocol version token, e.g. `ICAP/1.0`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the byte count announced by the `Preview` header.
    pub fn preview_size(&self) -> Option<u64> {
        self.preview
    }

    pub fn encapsulated(&self) -> &Encapsulated {
        &self.encapsulated
    }

    pub fn is_reqmod(&self) -> bool {
        self.method.as_str() == REQMOD
    }

    pub fn is_respmod(&self) -> bool {
        self.method.as_str() == RESPMOD
    }

    pub fn is_options(&self) -> bool {
        self.method.as_str() == OPTIONS
    }

    /// Whether the client listed `code` in its `Allow` header.
    ///
    /// `Allow` is a comma separated list and may be repeated.
    pub fn allows(&self, code: u16) -> bool {
        let code = code.to_string();
        self.headers
            .get_all(ALLOW)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .any(|token| token.trim() == code)
    }

    /// Whether a `204 No Content` answer is acceptable to the client.
    pub fn allows_204(&self) -> bool {
        self.allows(204)
    }
}

/// A parsed ICAP request, as handed to a [`Handler`](crate::handler::Handler).
///
/// The chunked body is not part of this type. It stays on the connection and is
/// read through the [`ResponseWriter`](crate::connection::ResponseWriter), which is
/// also where the preview continuation is requested.
#[derive(Debug)]
pub struct Request {
    header: RequestHeader,
    http_request: Option<http::Request<()>>,
    http_response: Option<http::Response<()>>,
    preview: Option<Bytes>,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    pub(crate) fn new(
        header: RequestHeader,
        http_request: Option<http::Request<()>>,
        http_response: Option<http::Response<()>>,
    ) -> Self {
        Self { header, http_request, http_response, preview: None, remote_addr: None }
    }

    pub(crate) fn set_preview(&mut self, preview: Bytes) {
        self.preview = Some(preview);
    }

    pub(crate) fn set_remote_addr(&mut self, remote_addr: Option<SocketAddr>) {
        self.remote_addr = remote_addr;
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    pub fn into_header(self) -> RequestHeader {
        self.header
    }

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    pub fn raw_target(&self) -> &str {
        self.header.raw_target()
    }

    pub fn uri(&self) -> &Uri {
        self.header.uri()
    }

    pub fn path(&self) -> &str {
        self.header.path()
    }

    pub fn version(&self) -> &str {
        self.header.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    /// The encapsulated HTTP request head (`req-hdr`), if the client sent one.
    pub fn http_request(&self) -> Option<&http::Request<()>> {
        self.http_request.as_ref()
    }

    /// The encapsulated HTTP response head (`res-hdr`), if the client sent one.
    pub fn http_response(&self) -> Option<&http::Response<()>> {
        self.http_response.as_ref()
    }

    /// The section the chunked body belongs to: `req-body`, `res-body` or `opt-body`.
    pub fn body_section(&self) -> Option<Section> {
        self.header.encapsulated().body_section()
    }

    pub fn has_body(&self) -> bool {
        self.body_section().is_some()
    }

    pub fn preview_size(&self) -> Option<u64> {
        self.header.preview_size()
    }

    /// The preview bytes, present only when a `Preview` header was sent along a body.
    pub fn preview(&self) -> Option<&Bytes> {
        self.preview.as_ref()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn allows_204(&self) -> bool {
        self.header.allows_204()
    }
}
