use crate::protocol::{PayloadItem, SendError};
use bytes::{Buf, BytesMut};
use std::io::Write;

use tokio_util::codec::Encoder;

/// Writes payload items as `<hex-size>\r\n<payload>\r\n`, then the terminal chunk.
///
/// Empty chunks are skipped, since a zero-sized chunk would end the sequence.
/// Anything encoded after the terminal chunk is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedEncoder {
    eof: bool,
    send_size: usize,
}

impl ChunkedEncoder {
    pub fn new() -> Self {
        Self { eof: false, send_size: 0 }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }

    /// Payload bytes written so far, framing excluded.
    pub fn send_size(&self) -> usize {
        self.send_size
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for ChunkedEncoder {
    type Error = SendError;

    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(mut bytes) => {
                let size = bytes.remaining();
                if size == 0 {
                    return Ok(());
                }

                write!(helper::Writer(dst), "{size:X}\r\n")?;
                dst.reserve(size + 2);
                while bytes.has_remaining() {
                    let chunk = bytes.chunk();
                    let len = chunk.len();
                    dst.extend_from_slice(chunk);
                    bytes.advance(len);
                }
                dst.extend_from_slice(b"\r\n");
                self.send_size += size;
                Ok(())
            }
            PayloadItem::Eof => {
                self.eof = true;
                dst.extend_from_slice(b"0\r\n\r\n");
                Ok(())
            }
            PayloadItem::Ieof => {
                self.eof = true;
                dst.extend_from_slice(b"0; ieof\r\n\r\n");
                Ok(())
            }
        }
    }
}

mod helper {
    use bytes::{BufMut, BytesMut};
    use std::io;

    pub struct Writer<'a>(pub &'a mut BytesMut);

    impl io::Write for Writer<'_> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.put_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::body::chunked_decoder::ChunkedDecoder;
    use bytes::Bytes;
    use tokio_util::codec::Decoder;

    #[test]
    fn encode_wikipedia() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"Wiki")), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"pedia")), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Eof, &mut dst).unwrap();

        assert_eq!(&dst[..], b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n");
        assert!(encoder.is_finish());
        assert_eq!(encoder.send_size(), 9);
    }

    #[test]
    fn encode_ieof_and_skip_empty() {
        let mut encoder = ChunkedEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(PayloadItem::Chunk(Bytes::new()), &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from(vec![b'x'; 26])), &mut dst).unwrap();
        encoder.encode(PayloadItem::<Bytes>::Ieof, &mut dst).unwrap();
        encoder.encode(PayloadItem::Chunk(Bytes::from_static(b"late")), &mut dst).unwrap();

        let mut expected = b"1A\r\n".to_vec();
        expected.extend(vec![b'x'; 26]);
        expected.extend_from_slice(b"\r\n0; ieof\r\n\r\n");
        assert_eq!(&dst[..], &expected[..]);
    }

    #[test]
    fn decode_what_was_encoded() {
        let payload: [&'static [u8]; 3] = [b"first", b"second chunk", b"3"];

        let mut encoder = ChunkedEncoder::new();
        let mut buffer = BytesMut::new();
        for bytes in payload {
            encoder.encode(PayloadItem::Chunk(Bytes::from_static(bytes)), &mut buffer).unwrap();
        }
        encoder.encode(PayloadItem::<Bytes>::Ieof, &mut buffer).unwrap();

        let mut decoder = ChunkedDecoder::new();
        let mut decoded = Vec::new();
        let terminator = loop {
            match decoder.decode(&mut buffer).unwrap().unwrap() {
                PayloadItem::Chunk(bytes) => decoded.push(bytes),
                item => break item,
            }
        };

        assert_eq!(decoded, payload.iter().map(|b| Bytes::from_static(b)).collect::<Vec<_>>());
        assert_eq!(terminator, PayloadItem::Ieof);
    }
}
