//! Wire protocol: message framing, header codec, and the payload structures
//! carried inside each frame.
//!
//! Every message on the wire is a fixed 32-byte [`Header`] followed by
//! `payload_size` bytes whose shape depends on `msg_type`. All multi-byte
//! integers are big-endian ("network byte order"), matching the wire layout
//! fixed by the protocol description this crate implements.

mod chunk;
mod control;
mod fileinfo;
mod io;

pub use chunk::{ChunkAck, ChunkAckStatus, ChunkHeader};
pub use control::{ErrorMessage, FileAck, FileAckStatus};
pub use fileinfo::{ChecksumType, FileInfo};
pub use io::{recv_message, send_message};

use crate::crc::crc32;
use crate::error::{Error, Result};

/// Protocol magic number, the ASCII bytes `"FTCP"` read as a big-endian u32.
pub const MAGIC: u32 = 0x4654_4350;

/// Protocol version this implementation speaks and requires from peers.
pub const VERSION: u8 = 0x01;

/// Size in bytes of [`Header`] on the wire.
pub const HEADER_SIZE: usize = 32;

/// Size in bytes of [`FileInfo`] on the wire.
pub const FILE_INFO_SIZE: usize = 1024;

/// Size in bytes of [`ChunkHeader`] on the wire.
pub const CHUNK_HEADER_SIZE: usize = 24;

/// Size in bytes of [`ChunkAck`] on the wire.
pub const CHUNK_ACK_SIZE: usize = 12;

/// Size in bytes of [`FileAck`] on the wire.
pub const FILE_ACK_SIZE: usize = 4;

/// Size in bytes of [`ErrorMessage`] on the wire.
pub const ERROR_MESSAGE_SIZE: usize = 256;

/// Default chunk size in bytes (512 KiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 524_288;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Maximum filename length, including the NUL terminator slack, on the wire.
pub const MAX_FILENAME_LEN: usize = 256;

/// Maximum consecutive retries for a single chunk before the sender aborts.
pub const MAX_RETRIES: u32 = 3;

/// Socket read/write timeout in seconds.
pub const TIMEOUT_SECS: u64 = 60;

/// Connect backoff cap in milliseconds.
pub const BACKOFF_CAP_MS: u64 = 16_000;

/// The one-byte message-type tag carried at header offset 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MessageType {
    /// Sender → Receiver: begin a session.
    HandshakeReq,
    /// Receiver → Sender: session accepted.
    HandshakeAck,
    /// Sender → Receiver: file metadata.
    FileInfo,
    /// Receiver → Sender: ready to receive chunks.
    FileAck,
    /// Sender → Receiver: one chunk of file content.
    ChunkData,
    /// Receiver → Sender: chunk accepted or rejected.
    ChunkAck,
    /// Reserved; never emitted by this implementation.
    TransferComplete,
    /// Reserved; never emitted by this implementation.
    VerifyRequest,
    /// Reserved; never emitted by this implementation.
    VerifyResponse,
    /// Either direction: a fatal, out-of-band error report.
    Error,
}

impl MessageType {
    /// Decodes the one-byte wire tag, or `None` if the byte names no known
    /// message type (including the reserved-but-allocated ones, which decode
    /// fine but must never be constructed by [`MessageType::to_byte`] callers
    /// in this crate).
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::HandshakeReq),
            0x02 => Some(Self::HandshakeAck),
            0x03 => Some(Self::FileInfo),
            0x04 => Some(Self::FileAck),
            0x05 => Some(Self::ChunkData),
            0x06 => Some(Self::ChunkAck),
            0x07 => Some(Self::TransferComplete),
            0x08 => Some(Self::VerifyRequest),
            0x09 => Some(Self::VerifyResponse),
            0xFF => Some(Self::Error),
            _ => None,
        }
    }

    /// Encodes this message type as its one-byte wire tag.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::HandshakeReq => 0x01,
            Self::HandshakeAck => 0x02,
            Self::FileInfo => 0x03,
            Self::FileAck => 0x04,
            Self::ChunkData => 0x05,
            Self::ChunkAck => 0x06,
            Self::TransferComplete => 0x07,
            Self::VerifyRequest => 0x08,
            Self::VerifyResponse => 0x09,
            Self::Error => 0xFF,
        }
    }
}

/// The fixed 32-byte message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol magic, must equal [`MAGIC`].
    pub magic: u32,
    /// Protocol version, must equal [`VERSION`].
    pub version: u8,
    /// The message type this header introduces.
    pub msg_type: MessageType,
    /// Reserved flags; always zero in this protocol revision.
    pub flags: u16,
    /// Monotonically increasing sequence number for the emitting role.
    pub sequence_num: u64,
    /// Number of payload bytes following this header.
    pub payload_size: u64,
}

impl Header {
    /// Builds a header for an outbound message; `checksum` is computed at
    /// encode time, so callers never set it directly.
    #[must_use]
    pub const fn new(msg_type: MessageType, sequence_num: u64, payload_size: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            msg_type,
            flags: 0,
            sequence_num,
            payload_size,
        }
    }

    /// Serializes this header to its 32-byte wire form, computing the CRC-32
    /// over bytes 0..23 with the checksum field itself treated as zero.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4] = self.version;
        buf[5] = self.msg_type.to_byte();
        buf[6..8].copy_from_slice(&self.flags.to_be_bytes());
        buf[8..16].copy_from_slice(&self.sequence_num.to_be_bytes());
        buf[16..24].copy_from_slice(&self.payload_size.to_be_bytes());
        let checksum = crc32(&buf[0..24]);
        buf[24..28].copy_from_slice(&checksum.to_be_bytes());
        // buf[28..32] (reserved) stays zero.
        buf
    }

    /// Parses a 32-byte buffer into a header without validating it. Use
    /// [`validate_header`] to check invariants before trusting the result;
    /// an unknown `msg_type` decodes with `msg_type` left as whatever the
    /// byte was, surfaced only through [`validate_header`].
    fn decode_raw(buf: &[u8; HEADER_SIZE]) -> (u32, u8, u8, u16, u64, u64, u32) {
        let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let version = buf[4];
        let msg_type_byte = buf[5];
        let flags = u16::from_be_bytes(buf[6..8].try_into().unwrap());
        let sequence_num = u64::from_be_bytes(buf[8..16].try_into().unwrap());
        let payload_size = u64::from_be_bytes(buf[16..24].try_into().unwrap());
        let checksum = u32::from_be_bytes(buf[24..28].try_into().unwrap());
        (
            magic,
            version,
            msg_type_byte,
            flags,
            sequence_num,
            payload_size,
            checksum,
        )
    }

    /// Parses a 32-byte buffer into a header. Returns `Err(Error::InvalidMsg)`
    /// if the message-type byte names no known type; every other field is
    /// taken verbatim, and `magic`/`version`/checksum validity is checked
    /// separately by [`validate_header`].
    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let (magic, version, msg_type_byte, flags, sequence_num, payload_size, _checksum) =
            Self::decode_raw(buf);
        let msg_type = MessageType::from_byte(msg_type_byte).ok_or(Error::InvalidMsg(msg_type_byte))?;
        Ok(Self {
            magic,
            version,
            msg_type,
            flags,
            sequence_num,
            payload_size,
        })
    }

    /// Validates a raw header buffer's invariants in wire order: magic,
    /// then version, then `msg_type`, then the stored checksum against a
    /// recomputed CRC-32 over the zeroed-out checksum form of the same
    /// bytes.
    pub fn validate(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let (magic, version, msg_type_byte, flags, sequence_num, payload_size, stored_checksum) =
            Self::decode_raw(buf);
        if magic != MAGIC {
            return Err(Error::Protocol(format!(
                "bad magic: expected {MAGIC:#010x}, got {magic:#010x}"
            )));
        }
        if version != VERSION {
            return Err(Error::Version {
                expected: VERSION,
                actual: version,
            });
        }
        let msg_type = MessageType::from_byte(msg_type_byte).ok_or(Error::InvalidMsg(msg_type_byte))?;
        let mut zeroed = *buf;
        zeroed[24..28].fill(0);
        let expected = crc32(&zeroed[0..24]);
        if expected != stored_checksum {
            return Err(Error::Protocol(format!(
                "header checksum mismatch: expected {expected:#010x}, got {stored_checksum:#010x}"
            )));
        }
        Ok(Self {
            magic,
            version,
            msg_type,
            flags,
            sequence_num,
            payload_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Header, MessageType, MAGIC, VERSION};

    #[test]
    fn round_trips_through_encode_decode() {
        let header = Header::new(MessageType::ChunkData, 42, 1024);
        let encoded = header.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
        assert!(Header::validate(&encoded).is_ok());
    }

    #[test]
    fn encoded_header_carries_magic_version_and_zero_reserved() {
        let encoded = Header::new(MessageType::HandshakeReq, 0, 0).encode();
        assert_eq!(u32::from_be_bytes(encoded[0..4].try_into().unwrap()), MAGIC);
        assert_eq!(encoded[4], VERSION);
        assert_eq!(&encoded[28..32], &[0, 0, 0, 0]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut encoded = Header::new(MessageType::FileAck, 1, 0).encode();
        encoded[0] ^= 0xFF;
        // Checksum is now over stale bytes too, but magic is checked first.
        assert!(matches!(
            Header::validate(&encoded),
            Err(crate::error::Error::Protocol(_))
        ));
    }

    #[test]
    fn rejects_version_mismatch() {
        let mut encoded = Header::new(MessageType::HandshakeAck, 1, 0).encode();
        encoded[4] = 2;
        // Recompute the checksum over the mutated bytes so only version
        // differs, not an incidental checksum failure.
        let mut zeroed = encoded;
        zeroed[24..28].fill(0);
        let recomputed = super::crc32(&zeroed[0..24]);
        encoded[24..28].copy_from_slice(&recomputed.to_be_bytes());
        assert!(matches!(
            Header::validate(&encoded),
            Err(crate::error::Error::Version { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn rejects_unknown_message_type() {
        let mut encoded = Header::new(MessageType::FileInfo, 0, 0).encode();
        encoded[5] = 0x42;
        let mut zeroed = encoded;
        zeroed[24..28].fill(0);
        let recomputed = super::crc32(&zeroed[0..24]);
        encoded[24..28].copy_from_slice(&recomputed.to_be_bytes());
        assert!(matches!(
            Header::validate(&encoded),
            Err(crate::error::Error::InvalidMsg(0x42))
        ));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let mut encoded = Header::new(MessageType::ChunkAck, 5, 0).encode();
        encoded[24] ^= 0xFF;
        assert!(matches!(
            Header::validate(&encoded),
            Err(crate::error::Error::Protocol(_))
        ));
    }
}
