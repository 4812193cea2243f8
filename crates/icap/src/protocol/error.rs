use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IcapError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed start line: {line:?}")]
    MalformedStartLine { line: String },

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid icap method")]
    InvalidMethod,

    #[error("invalid icap uri")]
    InvalidUri,

    #[error("invalid preview header: {reason}")]
    InvalidPreview { reason: String },

    #[error("invalid encapsulated header: {reason}")]
    InvalidEncapsulated { reason: String },

    #[error("invalid encapsulated http head: {reason}")]
    InvalidHttpHead { reason: String },

    #[error("unexpected end of stream")]
    UnexpectedEof,

    #[error("invalid chunked framing: {reason}")]
    ChunkFraming { reason: String },

    #[error("chunk size {size} exceed the limit {max_size}")]
    TooLargeChunk { size: u64, max_size: u64 },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn malformed_start_line<S: ToString>(line: S) -> Self {
        Self::MalformedStartLine { line: line.to_string() }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_preview<S: ToString>(str: S) -> Self {
        Self::InvalidPreview { reason: str.to_string() }
    }

    pub fn invalid_encapsulated<S: ToString>(str: S) -> Self {
        Self::InvalidEncapsulated { reason: str.to_string() }
    }

    pub fn invalid_http_head<S: ToString>(str: S) -> Self {
        Self::InvalidHttpHead { reason: str.to_string() }
    }

    pub fn chunk_framing<S: ToString>(str: S) -> Self {
        Self::ChunkFraming { reason: str.to_string() }
    }

    pub fn too_large_chunk(size: u64, max_size: u64) -> Self {
        Self::TooLargeChunk { size, max_size }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Errors raised by the chunked codec, after which the stream position is unknown.
    pub fn is_chunk_framing(&self) -> bool {
        matches!(self, Self::ChunkFraming { .. } | Self::TooLargeChunk { .. })
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("response header already written")]
    HeaderAlreadyWritten,

    #[error("response header not written yet")]
    HeaderNotWritten,

    #[error("response was committed without a body")]
    BodyNotAllowed,

    #[error("can't request the body remainder after the response header was written")]
    ContinueAfterCommit,

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Errors caused by using the response writer out of order, rather than by the connection.
    pub fn is_caller_misuse(&self) -> bool {
        matches!(self, Self::HeaderAlreadyWritten | Self::HeaderNotWritten | Self::BodyNotAllowed | Self::ContinueAfterCommit)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MuxError {
    #[error("pattern must not be empty")]
    EmptyPattern,

    #[error("pattern {pattern:?} is already registered")]
    DuplicatePattern { pattern: String },
}
