//! Error types for FTCP.
//!
//! A flat, exhaustive enumeration mirroring the `FT_ERR_*` codes carried on
//! the wire in `MSG_ERROR` payloads. Every variant maps to exactly one
//! numeric code via [`Error::code`], so a local error and a peer-reported
//! error can be represented and compared the same way.

use thiserror::Error;

/// A specialized `Result` type for FTCP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The unified error type for FTCP senders and receivers.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic socket error.
    #[error("socket error: {0}")]
    Socket(String),

    /// Outbound connection could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// Listener could not bind its address.
    #[error("bind failed: {0}")]
    Bind(String),

    /// Listener could not enter the listening state.
    #[error("listen failed: {0}")]
    Listen(String),

    /// Incoming connection could not be accepted.
    #[error("accept failed: {0}")]
    Accept(String),

    /// Write to the stream failed.
    #[error("send failed: {0}")]
    Send(#[source] std::io::Error),

    /// Read from the stream failed, or the peer closed the connection.
    #[error("recv failed: {0}")]
    Recv(#[source] std::io::Error),

    /// A blocking operation exceeded its deadline.
    #[error("operation timed out after {0}s")]
    Timeout(u64),

    /// A local file could not be opened.
    #[error("failed to open file: {0}")]
    FileOpen(#[source] std::io::Error),

    /// A local file could not be read.
    #[error("failed to read file: {0}")]
    FileRead(#[source] std::io::Error),

    /// A local file could not be written.
    #[error("failed to write file: {0}")]
    FileWrite(#[source] std::io::Error),

    /// A local file could not be seeked.
    #[error("failed to seek file: {0}")]
    FileSeek(#[source] std::io::Error),

    /// The receiver's target filesystem does not have enough free space.
    #[error("insufficient disk space: need {needed} bytes, have {available} bytes")]
    DiskFull {
        /// Bytes required for the incoming file.
        needed: u64,
        /// Bytes actually free.
        available: u64,
    },

    /// A filesystem operation was denied by the OS.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A chunk's CRC-32 did not match the one carried in its header.
    #[error("checksum mismatch for chunk {chunk_id}")]
    Checksum {
        /// The chunk that failed verification.
        chunk_id: u64,
    },

    /// A header or payload violated the framing rules of the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The peer advertised an unsupported protocol version.
    #[error("unsupported protocol version: expected {expected}, got {actual}")]
    Version {
        /// The version this implementation speaks.
        expected: u8,
        /// The version the peer advertised.
        actual: u8,
    },

    /// A header named a message type this implementation does not know.
    #[error("invalid message type: {0:#04x}")]
    InvalidMsg(u8),

    /// Memory allocation would exceed sane bounds for a declared size.
    #[error("out of memory: requested allocation of {0} bytes refused")]
    OutOfMemory(usize),

    /// A CLI argument or protocol field failed validation.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// The sender's source file does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// A filename exceeded the 256-byte on-wire limit.
    #[error("filename too long: {0} bytes (max 256)")]
    FilenameTooLong(usize),

    /// The peer sent `MSG_ERROR` in response to a request.
    #[error("peer reported error {code}: {message}")]
    PeerError {
        /// The `FT_ERR_*` code the peer embedded.
        code: i32,
        /// The human-readable message the peer embedded.
        message: String,
    },

    /// A chunk exhausted its retry budget without a clean acknowledgment.
    #[error("chunk {chunk_id} exceeded max retries")]
    RetriesExceeded {
        /// The chunk that could not be delivered.
        chunk_id: u64,
    },

}

impl Error {
    /// Returns the `FT_ERR_*` numeric code associated with this error.
    ///
    /// `PeerError` and `RetriesExceeded` have no single fixed code of their
    /// own: the former carries whatever code the peer reported, the latter
    /// reflects whatever the last underlying attempt failed with, so callers
    /// should prefer matching on those variants directly when the
    /// distinction matters.
    #[must_use]
    pub const fn code(&self) -> i32 {
        match self {
            Self::Socket(_) => -1,
            Self::Connect(_) => -2,
            Self::Bind(_) => -3,
            Self::Listen(_) => -4,
            Self::Accept(_) => -5,
            Self::Send(_) => -6,
            Self::Recv(_) => -7,
            Self::Timeout(_) => -8,
            Self::FileOpen(_) => -10,
            Self::FileRead(_) => -11,
            Self::FileWrite(_) => -12,
            Self::FileSeek(_) => -13,
            Self::DiskFull { .. } => -14,
            Self::Permission(_) => -15,
            Self::Checksum { .. } => -20,
            Self::Protocol(_) => -21,
            Self::Version { .. } => -22,
            Self::InvalidMsg(_) => -23,
            Self::OutOfMemory(_) => -30,
            Self::InvalidArg(_) => -31,
            Self::FileNotFound(_) => -32,
            Self::FilenameTooLong(_) => -33,
            Self::PeerError { code, .. } => *code,
            Self::RetriesExceeded { .. } => -6,
        }
    }

    /// Whether this error class is transient and safe to retry within the
    /// current chunk's retry budget, per the fatal/transient split in the
    /// retry policy.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Checksum { .. } | Self::Send(_) | Self::Recv(_)
        )
    }
}
