use bytes::{Buf, Bytes};

/// Represents an ICAP message that can either be a header or payload.
///
/// The generic parameter `T` is the header type (request or response head),
/// while `Data` is the type of the payload data (defaults to `Bytes`).
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the header information of type `T`
    Header(T),
    /// Contains a chunk of payload data or a terminal marker
    Payload(PayloadItem<Data>),
}

/// Represents an item in the ICAP message payload stream.
///
/// ICAP bodies are always chunked, and a chunked sequence ends in one of two ways:
/// the plain zero-sized chunk ([`PayloadItem::Eof`]) or the zero-sized chunk carrying
/// the `ieof` extension ([`PayloadItem::Ieof`]). Both are terminal, but only the
/// latter promises that the sender has no more data at all, which matters when the
/// terminated sequence was a preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// The chunked sequence ended with `0\r\n\r\n`
    Eof,
    /// The chunked sequence ended with `0; ieof\r\n\r\n`
    Ieof,
}

/// Whether an outgoing message carries a chunked body.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload using chunked transfer encoding
    Chunked,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    #[inline]
    pub fn new_chunked() -> Self {
        PayloadSize::Chunked
    }

    #[inline]
    pub fn new_empty() -> Self {
        PayloadSize::Empty
    }

    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl From<bool> for PayloadSize {
    fn from(has_body: bool) -> Self {
        if has_body { PayloadSize::Chunked } else { PayloadSize::Empty }
    }
}

impl<T> Message<T> {
    /// Returns true if this message contains payload data
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    /// Returns true if this message contains header information
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Converts the message into a PayloadItem if it contains payload data
    ///
    /// Returns None if the message contains header information
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item ends the chunked sequence, with or without `ieof`
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof | PayloadItem::Ieof)
    }

    /// Returns true only for the `ieof` terminator
    #[inline]
    pub fn is_ieof(&self) -> bool {
        matches!(self, PayloadItem::Ieof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof | PayloadItem::Ieof => None,
        }
    }

    /// Consumes the PayloadItem and returns the contained bytes if this is a Chunk
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof | PayloadItem::Ieof => None,
        }
    }
}
