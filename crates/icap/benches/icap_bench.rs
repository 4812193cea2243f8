use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::executor::block_on;
use http::StatusCode;
use micro_icap::handler::{handler_fn, HandlerError};
use micro_icap::{
    codec::{ChunkedDecoder, RequestDecoder, ResponseEncoder},
    connection::IcapConnection,
    protocol::{Message, PayloadItem, PayloadSize, ResponseHead},
};
use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_util::codec::{Decoder, Encoder};

const RESPMOD_REQUEST: &[u8] = b"RESPMOD icap://localhost/scan ICAP/1.0\r\n\
Host: localhost\r\n\
Allow: 204\r\n\
Encapsulated: req-hdr=0, res-hdr=43, res-body=87\r\n\
\r\n\
GET /index.html HTTP/1.1\r\nHost: example\r\n\r\n\
HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";

// Mock IO for testing
#[derive(Clone)]
struct MockIO {
    read_data: Vec<u8>,
    write_data: Vec<u8>,
    read_pos: usize,
}

impl MockIO {
    fn new(read_data: Vec<u8>) -> Self {
        Self { read_data, write_data: Vec::new(), read_pos: 0 }
    }
}

impl AsyncRead for MockIO {
    fn poll_read(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let remaining = &self.read_data[self.read_pos..];
        let amt = std::cmp::min(remaining.len(), buf.remaining());
        buf.put_slice(&remaining[..amt]);
        self.read_pos += amt;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockIO {
    fn poll_write(mut self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<Result<usize, io::Error>> {
        self.write_data.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
        Poll::Ready(Ok(()))
    }
}

fn bench_request_decoder(c: &mut Criterion) {
    c.bench_function("decode_respmod_request", |b| {
        b.iter(|| {
            let mut decoder = RequestDecoder::new();
            let mut bytes = BytesMut::from(RESPMOD_REQUEST);
            while let Some(message) = decoder.decode(&mut bytes).unwrap() {
                black_box(message);
            }
        });
    });
}

fn bench_chunked_decoder(c: &mut Criterion) {
    let mut body = Vec::new();
    for _ in 0..64 {
        body.extend_from_slice(b"400\r\n");
        body.extend_from_slice(&[b'x'; 0x400]);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(b"0; ieof\r\n\r\n");

    c.bench_function("decode_chunked_64k", |b| {
        b.iter(|| {
            let mut decoder = ChunkedDecoder::new();
            let mut bytes = BytesMut::from(&body[..]);
            while let Some(item) = decoder.decode(&mut bytes).unwrap() {
                black_box(item);
            }
        });
    });
}

fn bench_response_encoder(c: &mut Criterion) {
    let http_response = http::Response::builder().status(StatusCode::OK).header("content-type", "text/plain").body(()).unwrap();

    c.bench_function("encode_respmod_response", |b| {
        b.iter(|| {
            let mut encoder = ResponseEncoder::new();
            let mut bytes = BytesMut::new();
            let head = ResponseHead::new(StatusCode::OK).with_http_head(Some(http_response.clone().into()));
            encoder.encode(Message::<_, Bytes>::Header((head, PayloadSize::Chunked)), &mut bytes).unwrap();
            let chunk = Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Chunk(Bytes::from_static(b"Hello World!")));
            encoder.encode(chunk, &mut bytes).unwrap();
            encoder.encode(Message::<(ResponseHead, PayloadSize)>::Payload(PayloadItem::Eof), &mut bytes).unwrap();
            black_box(bytes);
        });
    });
}

fn bench_icap_connection(c: &mut Criterion) {
    let handler = Arc::new(handler_fn(|writer, _request| {
        Box::pin(async move {
            let body = writer.read_to_end().await?;
            writer.write_header(StatusCode::OK, None, true).await?;
            writer.write_body(body).await?;
            Ok::<_, HandlerError>(())
        })
    }));

    c.bench_function("process_respmod_request", |b| {
        b.iter(|| {
            let mock_io = MockIO::new(RESPMOD_REQUEST.to_vec());
            let (reader, writer) = (mock_io.clone(), mock_io);
            let connection = IcapConnection::new(reader, writer);
            black_box(block_on(connection.process(handler.clone())).unwrap());
        });
    });
}

criterion_group!(benches, bench_request_decoder, bench_chunked_decoder, bench_response_encoder, bench_icap_connection);
criterion_main!(benches);
