//! ICAP response header handling implementation.
//!
//! A response is serialized as the ICAP status line and header block, followed by
//! an optional encapsulated HTTP head, followed by an optional chunked body.
//! [`ResponseHead`] holds everything up to the body.

use http::{HeaderMap, StatusCode};

/// An encapsulated HTTP head sent back to the ICAP client.
#[derive(Debug)]
pub enum HttpHead {
    /// A (possibly modified) HTTP request head, written as `req-hdr`
    Request(http::Request<()>),
    /// A (possibly modified) HTTP response head, written as `res-hdr`
    Response(http::Response<()>),
}

impl From<http::Request<()>> for HttpHead {
    fn from(request: http::Request<()>) -> Self {
        HttpHead::Request(request)
    }
}

impl From<http::Response<()>> for HttpHead {
    fn from(response: http::Response<()>) -> Self {
        HttpHead::Response(response)
    }
}

#[derive(Debug)]
pub struct ResponseHead {
    status: StatusCode,
    headers: HeaderMap,
    http_head: Option<HttpHead>,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: HeaderMap::new(), http_head: None }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_http_head(mut self, http_head: Option<HttpHead>) -> Self {
        self.http_head = http_head;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn http_head(&self) -> Option<&HttpHead> {
        self.http_head.as_ref()
    }
}

/// Reason phrase written on the ICAP status line.
///
/// ICAP reuses the HTTP status registry, except that 505 refers to the ICAP version.
pub fn reason_phrase(status: StatusCode) -> &'static str {
    match status.as_u16() {
        505 => "ICAP Version Not Supported",
        _ => status.canonical_reason().unwrap_or("Unknown"),
    }
}
