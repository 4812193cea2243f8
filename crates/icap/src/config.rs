//! Limits applied while reading requests.
//!
//! The engine has no file or command line configuration. An [`IcapConfig`] is
//! built by the code that owns the listener and handed to each connection.

/// Size and count limits for one connection.
///
/// ```
/// use micro_icap::config::IcapConfig;
///
/// let config = IcapConfig { max_chunk_size: 1024 * 1024, ..IcapConfig::default() };
/// assert_eq!(config.max_headers, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcapConfig {
    /// Start line plus the ICAP header block
    pub max_header_bytes: usize,
    /// ICAP header fields, also applied to each encapsulated HTTP head
    pub max_headers: usize,
    /// Sum of the encapsulated HTTP heads
    pub max_encapsulated_bytes: usize,
    /// Size of a single chunk
    pub max_chunk_size: u64,
    /// Trailer section after the terminal chunk
    pub max_trailer_bytes: usize,
    /// Initial capacity of the read buffer
    pub read_buffer_capacity: usize,
}

impl IcapConfig {
    pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;
    pub const DEFAULT_MAX_HEADERS: usize = 64;
    pub const DEFAULT_MAX_ENCAPSULATED_BYTES: usize = 64 * 1024;
    pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 16 * 1024 * 1024;
    pub const DEFAULT_MAX_TRAILER_BYTES: usize = 8 * 1024;
    pub const DEFAULT_READ_BUFFER_CAPACITY: usize = 8 * 1024;
}

impl Default for IcapConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: Self::DEFAULT_MAX_HEADER_BYTES,
            max_headers: Self::DEFAULT_MAX_HEADERS,
            max_encapsulated_bytes: Self::DEFAULT_MAX_ENCAPSULATED_BYTES,
            max_chunk_size: Self::DEFAULT_MAX_CHUNK_SIZE,
            max_trailer_bytes: Self::DEFAULT_MAX_TRAILER_BYTES,
            read_buffer_capacity: Self::DEFAULT_READ_BUFFER_CAPACITY,
        }
    }
}
