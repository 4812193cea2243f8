//! ICAP response encoder module
//!
//! A response is sent as one [`Message::Header`] followed, when the head announced
//! a body, by [`Message::Payload`] items up to a terminator. Payload items are
//! rejected when no body is open.

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeaderEncoder;
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError};
use bytes::{Buf, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

#[derive(Debug, Default)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Whether a body was announced and its terminal chunk is not written yet.
    pub fn is_sending_payload(&self) -> bool {
        self.payload_encoder.is_some()
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(SendError::invalid_body("response head sent before the previous body was finished"));
                }

                if payload_size.is_chunked() {
                    self.payload_encoder = Some(PayloadEncoder::from(payload_size));
                }
                self.header_encoder.encode((head, payload_size), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response header but receive payload item");
                    return Err(SendError::invalid_body("payload sent without an open body"));
                };

                let result = payload_encoder.encode(payload_item, dst);

                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::StatusCode;

    #[test]
    fn head_then_chunks() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let head = ResponseHead::new(StatusCode::OK);
        encoder.encode(Message::<_, Bytes>::Header((head, PayloadSize::Chunked)), &mut dst).unwrap();
        assert!(encoder.is_sending_payload());
        assert!(dst.ends_with(b"encapsulated: opt-body=0\r\n\r\n"));

        dst.clear();
        encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Chunk(Bytes::from_static(b"Wiki"))), &mut dst).unwrap();
        encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut dst).unwrap();
        assert_eq!(&dst[..], b"4\r\nWiki\r\n0\r\n\r\n");
        assert!(!encoder.is_sending_payload());
    }

    #[test]
    fn payload_without_body_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        let head = ResponseHead::new(StatusCode::NO_CONTENT);
        encoder.encode(Message::<_, Bytes>::Header((head, PayloadSize::Empty)), &mut dst).unwrap();
        assert!(!encoder.is_sending_payload());

        let result = encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut dst);
        assert!(matches!(result, Err(SendError::InvalidBody { .. })));
    }

    #[test]
    fn second_head_before_terminator_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(Message::<_, Bytes>::Header((ResponseHead::new(StatusCode::OK), PayloadSize::Chunked)), &mut dst).unwrap();
        let result = encoder.encode(Message::<_, Bytes>::Header((ResponseHead::new(StatusCode::OK), PayloadSize::Empty)), &mut dst);
        assert!(result.is_err());
    }
}
