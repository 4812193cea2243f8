//! Encapsulated HTTP heads.
//!
//! The `req-hdr` and `res-hdr` sections of an ICAP body are plain HTTP/1.x heads,
//! so they are parsed with `httparse` directly. The bytes of each section are known
//! up front from the `Encapsulated` offsets, a partial parse is therefore an error.

use bytes::{BufMut, BytesMut};
use http::{HeaderName, HeaderValue, Method, StatusCode, Version};
use httparse::Status;

use crate::protocol::{HttpHead, ParseError};

fn http_version(version: Option<u8>) -> Result<Version, ParseError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        v => Err(ParseError::invalid_http_head(format!("unsupported http version {v:?}"))),
    }
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_10 => "HTTP/1.0",
        _ => "HTTP/1.1",
    }
}

fn append_headers(target: &mut http::HeaderMap, headers: &[httparse::Header<'_>]) -> Result<(), ParseError> {
    target.reserve(headers.len());
    for header in headers {
        let name = HeaderName::from_bytes(header.name.as_bytes()).map_err(|e| ParseError::invalid_http_head(e.to_string()))?;
        let value = HeaderValue::from_bytes(header.value).map_err(|e| ParseError::invalid_http_head(e.to_string()))?;
        target.append(name, value);
    }
    Ok(())
}

/// Parses the `req-hdr` section into an HTTP request head.
pub fn parse_http_request(bytes: &[u8], max_headers: usize) -> Result<http::Request<()>, ParseError> {
    let mut headers = vec![httparse::EMPTY_HEADER; max_headers];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(bytes).map_err(|e| ParseError::invalid_http_head(e.to_string()))? {
        Status::Complete(_) => {}
        Status::Partial => return Err(ParseError::invalid_http_head("incomplete http request head")),
    }

    let method = req.method.ok_or_else(|| ParseError::invalid_http_head("missing http method"))?;
    let method = Method::from_bytes(method.as_bytes()).map_err(|e| ParseError::invalid_http_head(e.to_string()))?;
    let path = req.path.ok_or_else(|| ParseError::invalid_http_head("missing http request target"))?;

    let mut request = http::Request::builder()
        .method(method)
        .uri(path)
        .version(http_version(req.version)?)
        .body(())
        .map_err(|e| ParseError::invalid_http_head(e.to_string()))?;

    append_headers(request.headers_mut(), req.headers)?;
    Ok(request)
}

/// Parses the `res-hdr` section into an HTTP response head.
pub fn parse_http_response(bytes: &[u8], max_headers: usize) -> Result<http::Response<()>, ParseError> {
    let mut headers = vec![httparse::EMPTY_HEADER; max_headers];
    let mut res = httparse::Response::new(&mut headers);

    match res.parse(bytes).map_err(|e| ParseError::invalid_http_head(e.to_string()))? {
        Status::Complete(_) => {}
        Status::Partial => return Err(ParseError::invalid_http_head("incomplete http response head")),
    }

    let code = res.code.ok_or_else(|| ParseError::invalid_http_head("missing http status"))?;
    let status = StatusCode::from_u16(code).map_err(|e| ParseError::invalid_http_head(e.to_string()))?;

    let mut response = http::Response::builder()
        .status(status)
        .version(http_version(res.version)?)
        .body(())
        .map_err(|e| ParseError::invalid_http_head(e.to_string()))?;

    append_headers(response.headers_mut(), res.headers)?;
    Ok(response)
}

/// Serializes an HTTP head, including the blank line that ends it.
pub fn encode_http_head(head: &HttpHead, dst: &mut BytesMut) {
    let headers = match head {
        HttpHead::Request(request) => {
            dst.put_slice(request.method().as_str().as_bytes());
            dst.put_u8(b' ');
            dst.put_slice(request.uri().to_string().as_bytes());
            dst.put_u8(b' ');
            dst.put_slice(version_str(request.version()).as_bytes());
            dst.put_slice(b"\r\n");
            request.headers()
        }
        HttpHead::Response(response) => {
            let status = response.status();
            dst.put_slice(version_str(response.version()).as_bytes());
            dst.put_u8(b' ');
            dst.put_slice(status.as_str().as_bytes());
            dst.put_u8(b' ');
            dst.put_slice(status.canonical_reason().unwrap_or("Unknown").as_bytes());
            dst.put_slice(b"\r\n");
            response.headers()
        }
    };

    for (header_name, header_value) in headers {
        dst.put_slice(header_name.as_ref());
        dst.put_slice(b": ");
        dst.put_slice(header_value.as_ref());
        dst.put_slice(b"\r\n");
    }
    dst.put_slice(b"\r\n");
}
