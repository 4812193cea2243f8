//! The handler's view of the connection.
//!
//! A [`ResponseWriter`] borrows both halves of the connection for one request. It
//! writes the response (head once, then chunks) and reads the request body, which
//! stays on the wire until a handler asks for it.
//!
//! For a previewed request, asking for the body is what triggers `100 Continue`:
//! the first [`ResponseWriter::read_body_chunk`] call writes and flushes the continue
//! line, then resumes decoding the remainder. A handler that answers from the
//! preview alone just writes its response, the remainder is then never requested.

use std::fmt;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use http::{HeaderMap, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::connection::{BoxReader, BoxWriter};
use crate::protocol::{
    CONTINUE_LINE, HttpHead, IcapError, Message, ParseError, PayloadItem, PayloadSize, PreviewNegotiator, PreviewState,
    ResponseHead, SendError,
};

type ResponseMessage = Message<(ResponseHead, PayloadSize)>;

#[derive(Debug)]
pub(crate) enum BodyState {
    /// No body, or the body was fully read
    Done,
    /// Body chunks are still on the wire
    Streaming,
    /// The body starts with a preview
    Preview(PreviewNegotiator),
}

/// Writes one ICAP response and reads the body of the request it answers.
pub struct ResponseWriter<'conn> {
    framed_read: &'conn mut FramedRead<BoxReader, RequestDecoder>,
    framed_write: &'conn mut FramedWrite<BoxWriter, ResponseEncoder>,
    headers: HeaderMap,
    committed: Option<PayloadSize>,
    finished: bool,
    body: BodyState,
    trailers: Option<HeaderMap>,
    // the preview remainder was given up by committing the response
    continue_refused: bool,
}

impl fmt::Debug for ResponseWriter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("headers", &self.headers)
            .field("committed", &self.committed)
            .field("finished", &self.finished)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

impl<'conn> ResponseWriter<'conn> {
    pub(crate) fn new(
        framed_read: &'conn mut FramedRead<BoxReader, RequestDecoder>,
        framed_write: &'conn mut FramedWrite<BoxWriter, ResponseEncoder>,
        body: BodyState,
    ) -> Self {
        Self { framed_read, framed_write, headers: HeaderMap::new(), committed: None, finished: false, body, trailers: None, continue_refused: false }
    }

    /// The ICAP headers of the response.
    pub fn header(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable access to the ICAP headers of the response.
    ///
    /// Changes made after [`write_header`](Self::write_header) are not sent.
    pub fn header_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// The preview negotiation state, `None` when the request has no preview.
    pub fn preview_state(&self) -> Option<PreviewState> {
        match &self.body {
            BodyState::Preview(negotiator) => Some(negotiator.state()),
            _ => None,
        }
    }

    /// Trailer fields sent after the last chunk of the request body.
    ///
    /// Only available once the body was read to its end.
    pub fn trailers(&self) -> Option<&HeaderMap> {
        self.trailers.as_ref()
    }

    /// Writes and flushes the status line, the headers and the encapsulated HTTP head.
    ///
    /// With `has_body` the response announces a body, to be sent with
    /// [`write_body`](Self::write_body) and ended by [`finish`](Self::finish) or by the
    /// connection once the handler returns. Writing the head declines a pending
    /// preview continuation, the remainder of the body can't be asked for anymore.
    ///
    /// # Errors
    ///
    /// [`SendError::HeaderAlreadyWritten`] on a second call, or the write failure.
    pub async fn write_header(&mut self, status: StatusCode, http_head: Option<HttpHead>, has_body: bool) -> Result<(), SendError> {
        if self.committed.is_some() {
            return Err(SendError::HeaderAlreadyWritten);
        }

        if let BodyState::Preview(negotiator) = &mut self.body {
            if negotiator.can_continue() {
                negotiator.decline().map_err(|e| SendError::invalid_body(e.to_string()))?;
                self.continue_refused = true;
                debug!("response committed before the preview remainder, continue declined");
            }
        }

        let payload_size = PayloadSize::from(has_body);
        let head = ResponseHead::new(status).with_headers(std::mem::take(&mut self.headers)).with_http_head(http_head);
        self.committed = Some(payload_size);
        self.finished = payload_size.is_empty();

        self.framed_write.send(ResponseMessage::Header((head, payload_size))).await
    }

    /// Sends one chunk of the response body.
    ///
    /// The chunk is buffered, call [`flush`](Self::flush) to push it out right away.
    pub async fn write_body(&mut self, data: impl Into<Bytes>) -> Result<(), SendError> {
        match self.committed {
            None => return Err(SendError::HeaderNotWritten),
            Some(PayloadSize::Empty) => return Err(SendError::BodyNotAllowed),
            Some(PayloadSize::Chunked) if self.finished => return Err(SendError::BodyNotAllowed),
            Some(PayloadSize::Chunked) => {}
        }

        self.framed_write.feed(ResponseMessage::Payload(PayloadItem::Chunk(data.into()))).await
    }

    pub async fn flush(&mut self) -> Result<(), SendError> {
        SinkExt::<ResponseMessage>::flush(&mut *self.framed_write).await
    }

    /// Ends the response body with the terminal chunk and flushes.
    pub async fn finish(&mut self) -> Result<(), SendError> {
        if self.committed.is_none() {
            return Err(SendError::HeaderNotWritten);
        }

        if !self.finished {
            self.finished = true;
            self.framed_write.feed(ResponseMessage::Payload(PayloadItem::Eof)).await?;
        }
        self.flush().await
    }

    /// Gives up the remainder of a previewed body without sending `100 Continue`.
    ///
    /// Does nothing if the continuation isn't pending.
    pub fn decline_continue(&mut self) {
        if let BodyState::Preview(negotiator) = &mut self.body {
            if negotiator.can_continue() && negotiator.decline().is_ok() {
                debug!("preview remainder declined");
            }
        }
    }

    /// Reads the next chunk of the request body, `None` once it ended.
    ///
    /// For a previewed request this reads the part after the preview: the first call
    /// writes and flushes `ICAP/1.0 100 Continue` before reading. If the preview ended
    /// with `ieof`, or the continuation was declined, there is nothing more to read.
    ///
    /// # Errors
    ///
    /// [`SendError::ContinueAfterCommit`] if the remainder is asked for after the
    /// response head was written. Read and write failures are fatal for the connection.
    pub async fn read_body_chunk(&mut self) -> Result<Option<Bytes>, IcapError> {
        let needs_continue = match &self.body {
            BodyState::Done => return Ok(None),
            BodyState::Streaming => false,
            BodyState::Preview(negotiator) => match negotiator.state() {
                PreviewState::Done if self.continue_refused => return Err(SendError::ContinueAfterCommit.into()),
                PreviewState::Done => return Ok(None),
                PreviewState::AwaitingContinueDecision => true,
                PreviewState::StreamingRemainder => false,
                state => return Err(ParseError::invalid_body(format!("can't read the body while preview is {state:?}")).into()),
            },
        };

        if needs_continue {
            self.send_continue().await?;
        }

        let item = match self.next_payload().await {
            Ok(item) => item,
            Err(e) => {
                self.fail();
                return Err(e);
            }
        };

        match item {
            PayloadItem::Chunk(bytes) => Ok(Some(bytes)),
            PayloadItem::Eof | PayloadItem::Ieof => {
                self.trailers = self.framed_read.decoder_mut().take_trailers();
                match &mut self.body {
                    BodyState::Preview(negotiator) => negotiator.on_remainder_end()?,
                    body => *body = BodyState::Done,
                }
                Ok(None)
            }
        }
    }

    /// Reads the rest of the request body into one buffer.
    pub async fn read_to_end(&mut self) -> Result<Bytes, IcapError> {
        let mut body = BytesMut::new();
        while let Some(bytes) = self.read_body_chunk().await? {
            body.extend_from_slice(&bytes);
        }
        Ok(body.freeze())
    }

    pub(crate) fn has_preview(&self) -> bool {
        matches!(self.body, BodyState::Preview(_))
    }

    /// Reads the preview chunks through their terminator.
    pub(crate) async fn read_preview(&mut self) -> Result<Bytes, IcapError> {
        let mut preview = BytesMut::new();

        loop {
            let item = match self.next_payload().await {
                Ok(item) => item,
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            };

            let BodyState::Preview(negotiator) = &mut self.body else {
                return Err(ParseError::invalid_body("request has no preview").into());
            };

            match item {
                PayloadItem::Chunk(bytes) => {
                    negotiator.on_preview_chunk(bytes.len())?;
                    preview.extend_from_slice(&bytes);
                }
                PayloadItem::Eof => {
                    negotiator.on_preview_end(false)?;
                    break;
                }
                PayloadItem::Ieof => {
                    negotiator.on_preview_end(true)?;
                    break;
                }
            }
        }

        self.trailers = self.framed_read.decoder_mut().take_trailers();
        if let BodyState::Preview(negotiator) = &mut self.body {
            negotiator.await_decision()?;
            debug!(size = preview.len(), ieof = negotiator.is_ieof(), "read request preview");
        }

        Ok(preview.freeze())
    }

    /// Finishes the exchange after the handler returned.
    ///
    /// A pending continuation is declined, unread body chunks are skipped, an
    /// uncommitted response becomes `200 OK` without body, and an open response
    /// body gets its terminal chunk.
    pub(crate) async fn complete(&mut self) -> Result<(), IcapError> {
        self.decline_continue();

        let streaming = match &self.body {
            BodyState::Streaming => true,
            BodyState::Preview(negotiator) => negotiator.state() == PreviewState::StreamingRemainder,
            BodyState::Done => false,
        };

        if streaming {
            let mut size = 0;
            while let Some(bytes) = self.read_body_chunk().await? {
                size += bytes.len();
            }
            if size > 0 {
                info!(size, "skip request body");
            }
        }

        if self.committed.is_none() {
            self.write_header(StatusCode::OK, None, false).await?;
        }

        self.finish().await?;
        Ok(())
    }

    async fn send_continue(&mut self) -> Result<(), IcapError> {
        if self.committed.is_some() {
            return Err(SendError::ContinueAfterCommit.into());
        }

        let BodyState::Preview(negotiator) = &mut self.body else {
            return Err(ParseError::invalid_body("request has no preview").into());
        };

        // anything still buffered in the codec goes out before the continue line
        SinkExt::<ResponseMessage>::flush(&mut *self.framed_write).await?;
        debug_assert!(self.framed_write.write_buffer().is_empty());

        let writer = self.framed_write.get_mut();
        let written = match writer.write_all(CONTINUE_LINE).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            negotiator.fail();
            return Err(SendError::io(e).into());
        }

        negotiator.on_continue_sent()?;
        self.framed_read.decoder_mut().resume_chunked();
        negotiator.on_resume()?;

        info!(preview = negotiator.size(), "sent continue response, reading the rest of the body");
        Ok(())
    }

    async fn next_payload(&mut self) -> Result<PayloadItem, IcapError> {
        match self.framed_read.next().await {
            Some(Ok(Message::Payload(item))) => Ok(item),
            Some(Ok(Message::Header(_))) => Err(ParseError::invalid_body("receive request header while reading body").into()),
            Some(Err(e)) => Err(e.into()),
            None => Err(ParseError::UnexpectedEof.into()),
        }
    }

    fn fail(&mut self) {
        if let BodyState::Preview(negotiator) = &mut self.body {
            negotiator.fail();
        }
    }
}
