use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http::StatusCode;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::config::IcapConfig;
use crate::connection::response_writer::{BodyState, ResponseWriter};
use crate::connection::{BoxReader, BoxWriter};
use crate::handler::Handler;
use crate::protocol::{IcapError, Message, ParseError, PayloadSize, PreviewNegotiator, Request, ResponseHead};

/// An ICAP connection that decodes requests and hands them to a handler
///
/// `IcapConnection` owns both halves of the stream for its whole life and serves
/// the requests on it one at a time:
/// - Reading and decoding the request head and encapsulated HTTP heads
/// - Reading the preview, if the request announced one
/// - Running the handler with a [`ResponseWriter`]
/// - Draining an unread body and finishing the response afterwards
///
/// It is the unit of work of one tokio task; accepting connections and deciding
/// what to do when `process` fails is left to the caller.
pub struct IcapConnection {
    framed_read: FramedRead<BoxReader, RequestDecoder>,
    framed_write: FramedWrite<BoxWriter, ResponseEncoder>,
    remote_addr: Option<SocketAddr>,
}

impl IcapConnection {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_config(reader, writer, IcapConfig::default())
    }

    pub fn with_config<R, W>(reader: R, writer: W, config: IcapConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: BoxReader = Box::new(reader);
        let writer: BoxWriter = Box::new(writer);
        Self {
            framed_read: FramedRead::with_capacity(reader, RequestDecoder::with_config(&config), config.read_buffer_capacity),
            framed_write: FramedWrite::new(writer, ResponseEncoder::new()),
            remote_addr: None,
        }
    }

    /// Records the peer address, exposed to handlers as [`Request::remote_addr`].
    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    /// Serves requests until the peer closes the stream.
    ///
    /// A clean close between two requests ends with `Ok(())`. A request that fails to
    /// decode is answered with `400 Bad Request` and ends the connection with the error.
    pub async fn process<H>(mut self, handler: Arc<H>) -> Result<(), IcapError>
    where
        H: Handler + ?Sized,
    {
        loop {
            match self.framed_read.next().await {
                Some(Ok(Message::Header(request))) => {
                    self.do_process(request, &*handler).await?;
                }

                Some(Ok(Message::Payload(_))) => {
                    error!("receive body chunk while waiting for a request header");
                    self.send_error_response(StatusCode::BAD_REQUEST).await;
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    error!(cause = %e, "can't receive next request");
                    self.send_error_response(StatusCode::BAD_REQUEST).await;
                    return Err(e.into());
                }

                None => {
                    info!("cant read more request, break this connection down");
                    return Ok(());
                }
            }
        }
    }

    async fn do_process<H>(&mut self, mut request: Request, handler: &H) -> Result<(), IcapError>
    where
        H: Handler + ?Sized,
    {
        request.set_remote_addr(self.remote_addr);
        debug!(method = %request.method(), uri = request.raw_target(), body = ?request.body_section(), "receive request");

        let body = match (request.has_body(), request.preview_size()) {
            (false, _) => BodyState::Done,
            (true, Some(size)) => BodyState::Preview(PreviewNegotiator::new(size)),
            (true, None) => BodyState::Streaming,
        };

        let mut writer = ResponseWriter::new(&mut self.framed_read, &mut self.framed_write, body);

        if writer.has_preview() {
            match writer.read_preview().await {
                Ok(preview) => request.set_preview(preview),
                Err(e) => {
                    error!(cause = %e, "can't read request preview");
                    if let Err(send_error) = writer.write_header(StatusCode::BAD_REQUEST, None, false).await {
                        warn!(cause = %send_error, "can't send error response");
                    }
                    return Err(e);
                }
            }
        }

        if let Err(e) = handler.serve(&mut writer, &request).await {
            error!(cause = %e, path = request.path(), "handle request error");
            if !writer.is_committed() {
                writer.write_header(StatusCode::INTERNAL_SERVER_ERROR, None, false).await?;
            }
        }

        writer.complete().await
    }

    async fn send_error_response(&mut self, status: StatusCode) {
        let header = Message::<_, Bytes>::Header((ResponseHead::new(status), PayloadSize::Empty));
        if let Err(e) = self.framed_write.send(header).await {
            warn!(cause = %e, "can't send error response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerError;
    use crate::protocol::{PreviewState, SendError};
    use async_trait::async_trait;
    use indoc::indoc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    /// Writes `204`, or echoes the body back when `read_body` is set.
    #[derive(Default)]
    struct EchoHandler {
        read_body: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Handler for EchoHandler {
        async fn serve(&self, writer: &mut ResponseWriter<'_>, request: &Request) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.read_body {
                writer.write_header(StatusCode::NO_CONTENT, None, false).await?;
                return Ok(());
            }

            let mut body = request.preview().cloned().unwrap_or_default().to_vec();
            body.extend_from_slice(&writer.read_to_end().await?);
            assert_eq!(writer.preview_state(), request.preview_size().map(|_| PreviewState::Done));

            writer.write_header(StatusCode::OK, None, true).await?;
            writer.write_body(body).await?;
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl Handler for FailingHandler {
        async fn serve(&self, _writer: &mut ResponseWriter<'_>, _request: &Request) -> Result<(), HandlerError> {
            Err("service is not available".into())
        }
    }

    fn serve<H: Handler + 'static>(handler: Arc<H>) -> (DuplexStream, JoinHandle<Result<(), IcapError>>) {
        let (client, server) = duplex(64 * 1024);
        let (reader, writer) = split(server);
        let connection = IcapConnection::new(reader, writer);
        (client, tokio::spawn(connection.process(handler)))
    }

    async fn read_until(client: &mut DuplexStream, needle: &[u8]) -> Vec<u8> {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !received.windows(needle.len()).any(|w| w == needle) {
            let n = client.read(&mut buf).await.unwrap();
            assert_ne!(n, 0, "stream closed before {:?}", String::from_utf8_lossy(needle));
            received.extend_from_slice(&buf[..n]);
        }
        received
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[tokio::test]
    async fn pipelined_options_get_default_response() {
        let (mut client, task) = serve(Arc::new(FailingHandler));

        let request = indoc! {"
            OPTIONS icap://localhost/echo ICAP/1.0\r
            Encapsulated: null-body=0\r
            \r
        "};
        client.write_all(request.as_bytes()).await.unwrap();
        client.write_all(request.as_bytes()).await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert_eq!(count(&response, b"ICAP/1.0 500 Internal Server Error\r\n"), 2);
        assert_eq!(count(&response, b"encapsulated: null-body=0\r\n"), 2);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn handler_without_commit_gets_ok() {
        struct SilentHandler;

        #[async_trait]
        impl Handler for SilentHandler {
            async fn serve(&self, _writer: &mut ResponseWriter<'_>, _request: &Request) -> Result<(), HandlerError> {
                Ok(())
            }
        }

        let (mut client, task) = serve(Arc::new(SilentHandler));
        client.write_all(b"RESPMOD /scan ICAP/1.0\r\nEncapsulated: res-body=0\r\n\r\n3\r\nabc\r\n0\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert!(response.starts_with(b"ICAP/1.0 200 OK\r\n"));
        assert_eq!(count(&response, b"ICAP/1.0"), 1);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn preview_with_ieof_needs_no_continue() {
        let handler = Arc::new(EchoHandler { read_body: true, ..Default::default() });
        let (mut client, task) = serve(handler.clone());

        client
            .write_all(b"RESPMOD /scan ICAP/1.0\r\nPreview: 5\r\nEncapsulated: res-body=0\r\n\r\n5\r\nhello\r\n0; ieof\r\n\r\n")
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert_eq!(count(&response, b"100 Continue"), 0);
        assert!(response.starts_with(b"ICAP/1.0 200 OK\r\n"));
        assert!(response.ends_with(b"encapsulated: opt-body=0\r\n\r\n5\r\nhello\r\n0\r\n\r\n"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn preview_then_continue() {
        let handler = Arc::new(EchoHandler { read_body: true, ..Default::default() });
        let (mut client, task) = serve(handler);

        client.write_all(b"RESPMOD /scan ICAP/1.0\r\nPreview: 4\r\nEncapsulated: res-body=0\r\n\r\n4\r\nWiki\r\n0\r\n\r\n").await.unwrap();

        let received = read_until(&mut client, b"ICAP/1.0 100 Continue\r\n\r\n").await;
        assert_eq!(&received[..], b"ICAP/1.0 100 Continue\r\n\r\n");

        client.write_all(b"5\r\npedia\r\n0\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert_eq!(count(&response, b"100 Continue"), 0);
        assert!(response.starts_with(b"ICAP/1.0 200 OK\r\n"));
        assert!(response.ends_with(b"\r\n\r\n9\r\nWikipedia\r\n0\r\n\r\n"));
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn declined_preview_is_not_drained() {
        let handler = Arc::new(EchoHandler::default());
        let (mut client, task) = serve(handler.clone());

        client.write_all(b"RESPMOD /scan ICAP/1.0\r\nPreview: 4\r\nEncapsulated: res-body=0\r\n\r\n4\r\nWiki\r\n0\r\n\r\n").await.unwrap();
        let received = read_until(&mut client, b"ICAP/1.0 204 No Content\r\n").await;
        assert_eq!(count(&received, b"100 Continue"), 0);

        client.write_all(b"OPTIONS /scan ICAP/1.0\r\nEncapsulated: null-body=0\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert!(task.await.unwrap().is_ok());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn continue_after_commit_is_refused() {
        struct EarlyAnswer;

        #[async_trait]
        impl Handler for EarlyAnswer {
            async fn serve(&self, writer: &mut ResponseWriter<'_>, _request: &Request) -> Result<(), HandlerError> {
                assert_eq!(writer.preview_state(), Some(PreviewState::AwaitingContinueDecision));
                writer.write_header(StatusCode::NO_CONTENT, None, false).await?;
                assert_eq!(writer.preview_state(), Some(PreviewState::Done));
                let result = writer.read_body_chunk().await;
                assert!(matches!(result, Err(IcapError::ResponseError { source: SendError::ContinueAfterCommit })));
                Ok(())
            }
        }

        let (mut client, task) = serve(Arc::new(EarlyAnswer));
        client.write_all(b"RESPMOD /scan ICAP/1.0\r\nPreview: 4\r\nEncapsulated: res-body=0\r\n\r\n4\r\nWiki\r\n0\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert!(response.starts_with(b"ICAP/1.0 204 No Content\r\n"));
        assert_eq!(count(&response, b"100 Continue"), 0);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn writer_misuse_keeps_connection_usable() {
        #[derive(Default)]
        struct MisuseHandler {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl Handler for MisuseHandler {
            async fn serve(&self, writer: &mut ResponseWriter<'_>, _request: &Request) -> Result<(), HandlerError> {
                self.calls.fetch_add(1, Ordering::SeqCst);

                let result = writer.write_body(Bytes::from_static(b"early")).await;
                assert!(matches!(result, Err(SendError::HeaderNotWritten)));

                writer.write_header(StatusCode::NO_CONTENT, None, false).await?;

                let result = writer.write_header(StatusCode::OK, None, true).await;
                assert!(matches!(result, Err(SendError::HeaderAlreadyWritten)));

                let result = writer.write_body(Bytes::from_static(b"late")).await;
                assert!(matches!(result, Err(SendError::BodyNotAllowed)));
                Ok(())
            }
        }

        let handler = Arc::new(MisuseHandler::default());
        let (mut client, task) = serve(handler.clone());

        let request = b"OPTIONS /scan ICAP/1.0\r\nEncapsulated: null-body=0\r\n\r\n";
        client.write_all(request).await.unwrap();
        client.write_all(request).await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert_eq!(count(&response, b"ICAP/1.0 204 No Content\r\n"), 2);
        assert_eq!(count(&response, b"ICAP/1.0"), 2);
        assert!(!response.windows(4).any(|w| w == b"late"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn continued_preview_with_trailers_then_next_request() {
        /// Records what each request looked like to the handler.
        #[derive(Default)]
        struct RecordingHandler {
            seen: Mutex<Vec<(Option<SocketAddr>, Vec<u8>, Option<String>)>>,
        }

        #[async_trait]
        impl Handler for RecordingHandler {
            async fn serve(&self, writer: &mut ResponseWriter<'_>, request: &Request) -> Result<(), HandlerError> {
                let mut body = request.preview().cloned().unwrap_or_default().to_vec();
                body.extend_from_slice(&writer.read_to_end().await?);
                let checksum = writer.trailers().and_then(|t| t.get("x-checksum")).map(|v| v.to_str().unwrap().to_owned());

                self.seen.lock().unwrap().push((request.remote_addr(), body, checksum));
                writer.write_header(StatusCode::NO_CONTENT, None, false).await?;
                Ok(())
            }
        }

        let handler = Arc::new(RecordingHandler::default());
        let remote_addr: SocketAddr = "192.0.2.7:40000".parse().unwrap();

        let (mut client, server) = duplex(64 * 1024);
        let (reader, writer) = split(server);
        let connection = IcapConnection::new(reader, writer).with_remote_addr(remote_addr);
        let task = tokio::spawn(connection.process(handler.clone()));

        client.write_all(b"RESPMOD /scan ICAP/1.0\r\nPreview: 4\r\nEncapsulated: res-body=0\r\n\r\n4\r\nWiki\r\n0\r\n\r\n").await.unwrap();
        read_until(&mut client, b"ICAP/1.0 100 Continue\r\n\r\n").await;

        client.write_all(b"5\r\npedia\r\n0; ieof\r\nX-Checksum: 42\r\n\r\n").await.unwrap();
        client.write_all(b"OPTIONS /scan ICAP/1.0\r\nEncapsulated: null-body=0\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert!(task.await.unwrap().is_ok());

        assert_eq!(count(&response, b"ICAP/1.0 204 No Content\r\n"), 2);
        assert_eq!(count(&response, b"100 Continue"), 0);

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (Some(remote_addr), b"Wikipedia".to_vec(), Some("42".to_owned())));
        assert_eq!(seen[1], (Some(remote_addr), Vec::new(), None));
    }

    #[tokio::test]
    async fn unread_body_is_skipped() {
        let handler = Arc::new(EchoHandler::default());
        let (mut client, task) = serve(handler.clone());

        client.write_all(b"REQMOD /scan ICAP/1.0\r\nEncapsulated: req-body=0\r\n\r\n4\r\nWiki\r\n0\r\n\r\n").await.unwrap();
        client.write_all(b"OPTIONS /scan ICAP/1.0\r\nEncapsulated: null-body=0\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert_eq!(count(&response, b"ICAP/1.0 204 No Content\r\n"), 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn malformed_start_line_gets_bad_request() {
        let handler = Arc::new(EchoHandler::default());
        let (mut client, task) = serve(handler.clone());

        client.write_all(b"OPTIONS ICAP/1.0\r\n\r\n").await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();

        assert!(response.starts_with(b"ICAP/1.0 400 Bad Request\r\n"));
        let result = task.await.unwrap();
        assert!(matches!(result, Err(IcapError::RequestError { source: ParseError::MalformedStartLine { .. } })));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }
}
