//! ICAP header encoder implementation for serializing response heads
//!
//! A response head is written as:
//!
//! ```text
//! ICAP/1.0 <code> <reason>\r\n
//! Date: ...\r\n
//! Encapsulated: res-hdr=0, res-body=N\r\n
//! <other headers>\r\n
//! \r\n
//! <encapsulated HTTP head, if any>
//! ```
//!
//! The `Encapsulated` header is always computed from the encapsulated HTTP head and
//! whether a body follows, replacing whatever the handler put there. A `Date`
//! header is added unless the handler set one.

use crate::codec::header::http_head::encode_http_head;
use crate::protocol::{Encapsulated, HttpHead, PayloadSize, ResponseHead, Section, SendError, reason_phrase};

use bytes::{BufMut, BytesMut};

use http::{HeaderName, HeaderValue, header};
use std::io;
use std::io::Write;
use tokio_util::codec::Encoder;

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

static ENCAPSULATED: HeaderName = HeaderName::from_static("encapsulated");

/// Encoder for ICAP response heads implementing the [`Encoder`] trait.
#[derive(Debug, Default)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    /// Encodes the ICAP response head into the provided bytes buffer.
    ///
    /// # Errors
    ///
    /// Returns error if the computed `Encapsulated` value can't be a header value, or
    /// if writing to the buffer fails
    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut head, payload_size) = item;

        let mut http_head = BytesMut::new();
        if let Some(http) = head.http_head() {
            encode_http_head(http, &mut http_head);
        }

        let encapsulated = encapsulated_for(head.http_head(), http_head.len(), payload_size);
        let encapsulated =
            HeaderValue::try_from(encapsulated.to_string()).map_err(|e| SendError::invalid_header(e.to_string()))?;

        let headers = head.headers_mut();
        if !headers.contains_key(header::DATE) {
            headers.insert(header::DATE, http_date()?);
        }
        headers.insert(ENCAPSULATED.clone(), encapsulated);

        dst.reserve(INIT_HEADER_SIZE + http_head.len());
        write!(FastWrite(dst), "ICAP/1.0 {} {}\r\n", head.status().as_str(), reason_phrase(head.status()))?;

        // Write all headers
        for (header_name, header_value) in head.headers() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        dst.put_slice(&http_head);
        Ok(())
    }
}

/// Layout of the response body: the head section comes first, then the body or
/// `null-body` at the end of the head.
fn encapsulated_for(http_head: Option<&HttpHead>, head_len: usize, payload_size: PayloadSize) -> Encapsulated {
    let (head_section, body_section) = match http_head {
        Some(HttpHead::Request(_)) => (Some(Section::ReqHdr), Section::ReqBody),
        Some(HttpHead::Response(_)) => (Some(Section::ResHdr), Section::ResBody),
        None => (None, Section::OptBody),
    };

    let body = payload_size.is_chunked().then_some(body_section);
    Encapsulated::for_message(head_section, head_len, body)
}

fn http_date() -> Result<HeaderValue, SendError> {
    let mut buf = faf_http_date::get_date_buff_no_key();
    faf_http_date::get_date_no_key(&mut buf);
    HeaderValue::from_bytes(&buf).map_err(|e| SendError::invalid_header(e.to_string()))
}

/// Fast writer implementation for writing to BytesMut.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn encode(head: ResponseHead, payload_size: PayloadSize) -> String {
        let mut dst = BytesMut::new();
        HeaderEncoder.encode((head, payload_size), &mut dst).unwrap();
        String::from_utf8(dst.to_vec()).unwrap()
    }

    #[test]
    fn no_content_without_body() {
        let encoded = encode(ResponseHead::new(StatusCode::NO_CONTENT), PayloadSize::Empty);

        assert!(encoded.starts_with("ICAP/1.0 204 No Content\r\n"));
        assert!(encoded.contains("\r\ndate: "));
        assert!(encoded.contains("\r\nencapsulated: null-body=0\r\n"));
        assert!(encoded.ends_with("\r\n\r\n"));
    }

    #[test]
    fn response_head_with_body() {
        let response = http::Response::builder().status(StatusCode::OK).body(()).unwrap();
        let head = ResponseHead::new(StatusCode::OK).with_http_head(Some(response.into()));

        let encoded = encode(head, PayloadSize::Chunked);

        let http_head = "HTTP/1.1 200 OK\r\n\r\n";
        assert!(encoded.contains(&format!("encapsulated: res-hdr=0, res-body={}\r\n", http_head.len())));
        assert!(encoded.ends_with(&format!("\r\n\r\n{http_head}")));
    }

    #[test]
    fn request_head_without_body() {
        let request = http::Request::builder().uri("/blocked").body(()).unwrap();
        let head = ResponseHead::new(StatusCode::OK).with_http_head(Some(request.into()));

        let encoded = encode(head, PayloadSize::Empty);

        let http_head = "GET /blocked HTTP/1.1\r\n\r\n";
        assert!(encoded.contains(&format!("encapsulated: req-hdr=0, null-body={}\r\n", http_head.len())));
        assert!(encoded.ends_with(http_head));
    }

    #[test]
    fn handler_headers_are_kept_but_encapsulated_is_replaced() {
        let mut headers = http::HeaderMap::new();
        headers.insert("ISTag", HeaderValue::from_static("\"W3E4R7U9-L2E4-2\""));
        headers.insert(header::DATE, HeaderValue::from_static("Mon, 10 Jan 2000 09:55:21 GMT"));
        headers.insert("Encapsulated", HeaderValue::from_static("res-body=0"));

        let encoded = encode(ResponseHead::new(StatusCode::OK).with_headers(headers), PayloadSize::Chunked);

        assert!(encoded.starts_with("ICAP/1.0 200 OK\r\n"));
        assert!(encoded.contains("istag: \"W3E4R7U9-L2E4-2\"\r\n"));
        assert!(encoded.contains("date: Mon, 10 Jan 2000 09:55:21 GMT\r\n"));
        assert!(encoded.contains("encapsulated: opt-body=0\r\n"));
        assert!(!encoded.contains("res-body=0"));
    }

    #[test]
    fn icap_reason_phrase_on_status_line() {
        let encoded = encode(ResponseHead::new(StatusCode::HTTP_VERSION_NOT_SUPPORTED), PayloadSize::Empty);
        assert!(encoded.starts_with("ICAP/1.0 505 ICAP Version Not Supported\r\n"));
    }
}
