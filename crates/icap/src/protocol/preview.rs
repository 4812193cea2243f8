//! ICAP preview negotiation.
//!
//! With a `Preview: N` header the client sends at most N body bytes as a chunked
//! sequence of their own, then stops and waits. The server either answers right
//! away, or asks for the remainder with `ICAP/1.0 100 Continue`, after which the
//! client sends the rest of the body as a new chunked sequence.
//!
//! ```text
//! AwaitingPreview ──ieof──────────────────────────────────────────────┐
//!        │                                                            │
//!        ▼                                                            ▼
//! PreviewReceived ─▶ AwaitingContinueDecision ──decline──────────────▶ Done
//!                           │                                         ▲
//!                           ▼                                         │
//!                      SentContinue ─▶ StreamingRemainder ──eof───────┘
//! ```
//!
//! Any read or write error moves the negotiator to `Failed`.
//!
//! [`PreviewNegotiator`] only tracks the state. The I/O (reading chunks, writing and
//! flushing the continue line) is driven by the
//! [`ResponseWriter`](crate::connection::ResponseWriter), which calls the
//! transition methods in order.

use crate::ensure;
use crate::protocol::ParseError;

/// The line that asks the client for the rest of a previewed body.
pub const CONTINUE_LINE: &[u8] = b"ICAP/1.0 100 Continue\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewState {
    /// Reading the preview chunks
    AwaitingPreview,
    /// The preview ended with a plain terminator
    PreviewReceived,
    /// The handler has the preview and may ask for the remainder
    AwaitingContinueDecision,
    /// `100 Continue` was written and flushed
    SentContinue,
    /// Reading the remainder chunks
    StreamingRemainder,
    /// No more body data will be read
    Done,
    /// A read or write failed, the connection can't be used anymore
    Failed,
}

#[derive(Debug)]
pub struct PreviewNegotiator {
    state: PreviewState,
    size: u64,
    received: u64,
    ieof: bool,
}

impl PreviewNegotiator {
    /// Creates a negotiator for a `Preview` header announcing `size` bytes.
    pub fn new(size: u64) -> Self {
        Self { state: PreviewState::AwaitingPreview, size, received: 0, ieof: false }
    }

    pub fn state(&self) -> PreviewState {
        self.state
    }

    /// The announced preview size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Preview bytes received so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Whether the preview was terminated with `ieof`.
    pub fn is_ieof(&self) -> bool {
        self.ieof
    }

    pub fn is_done(&self) -> bool {
        self.state == PreviewState::Done
    }

    /// Whether the handler may still ask for the remainder.
    pub fn can_continue(&self) -> bool {
        self.state == PreviewState::AwaitingContinueDecision
    }

    /// Records `len` bytes of preview data.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidPreview`] if the client sends more than it announced.
    pub fn on_preview_chunk(&mut self, len: usize) -> Result<(), ParseError> {
        self.expect(PreviewState::AwaitingPreview)?;
        self.received += len as u64;
        if self.received > self.size {
            self.state = PreviewState::Failed;
            return Err(ParseError::invalid_preview(format!(
                "received {} preview bytes but only {} were announced",
                self.received, self.size
            )));
        }
        Ok(())
    }

    /// The preview sequence reached its terminating chunk.
    ///
    /// An `ieof` terminator means the whole body fit in the preview, so the
    /// negotiation is over.
    pub fn on_preview_end(&mut self, ieof: bool) -> Result<(), ParseError> {
        self.expect(PreviewState::AwaitingPreview)?;
        self.ieof = ieof;
        self.state = if ieof { PreviewState::Done } else { PreviewState::PreviewReceived };
        Ok(())
    }

    /// The preview is handed to the handler.
    pub fn await_decision(&mut self) -> Result<(), ParseError> {
        if self.state == PreviewState::Done {
            return Ok(());
        }
        self.transition(PreviewState::PreviewReceived, PreviewState::AwaitingContinueDecision)
    }

    pub fn on_continue_sent(&mut self) -> Result<(), ParseError> {
        self.transition(PreviewState::AwaitingContinueDecision, PreviewState::SentContinue)
    }

    pub fn on_resume(&mut self) -> Result<(), ParseError> {
        self.transition(PreviewState::SentContinue, PreviewState::StreamingRemainder)
    }

    pub fn on_remainder_end(&mut self) -> Result<(), ParseError> {
        self.transition(PreviewState::StreamingRemainder, PreviewState::Done)
    }

    /// The handler answers without the remainder.
    pub fn decline(&mut self) -> Result<(), ParseError> {
        self.transition(PreviewState::AwaitingContinueDecision, PreviewState::Done)
    }

    pub fn fail(&mut self) {
        self.state = PreviewState::Failed;
    }

    fn transition(&mut self, from: PreviewState, to: PreviewState) -> Result<(), ParseError> {
        self.expect(from)?;
        self.state = to;
        Ok(())
    }

    fn expect(&self, state: PreviewState) -> Result<(), ParseError> {
        ensure!(
            self.state == state,
            ParseError::invalid_body(format!("preview negotiation expects {:?} but is {:?}", state, self.state))
        );
        Ok(())
    }
}
