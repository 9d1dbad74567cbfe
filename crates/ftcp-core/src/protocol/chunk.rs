//! `ChunkHeader` (precedes chunk bytes in `MSG_CHUNK_DATA`) and `ChunkAck`.

use super::CHUNK_HEADER_SIZE;

/// 24-byte header prefixed to the chunk bytes inside a `CHUNK_DATA` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Index of this chunk, starting at zero.
    pub chunk_id: u64,
    /// Absolute byte offset of this chunk within the file.
    pub chunk_offset: u64,
    /// Number of chunk bytes following this header (may be less than the
    /// transfer's nominal chunk size for the final chunk).
    pub chunk_size: u32,
    /// CRC-32 of the chunk bytes.
    pub chunk_crc32: u32,
}

impl ChunkHeader {
    /// Serializes this header to its 24-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; CHUNK_HEADER_SIZE] {
        let mut buf = [0u8; CHUNK_HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.chunk_id.to_be_bytes());
        buf[8..16].copy_from_slice(&self.chunk_offset.to_be_bytes());
        buf[16..20].copy_from_slice(&self.chunk_size.to_be_bytes());
        buf[20..24].copy_from_slice(&self.chunk_crc32.to_be_bytes());
        buf
    }

    /// Parses a 24-byte buffer into a `ChunkHeader`.
    #[must_use]
    pub fn decode(buf: &[u8; CHUNK_HEADER_SIZE]) -> Self {
        Self {
            chunk_id: u64::from_be_bytes(buf[0..8].try_into().unwrap()),
            chunk_offset: u64::from_be_bytes(buf[8..16].try_into().unwrap()),
            chunk_size: u32::from_be_bytes(buf[16..20].try_into().unwrap()),
            chunk_crc32: u32::from_be_bytes(buf[20..24].try_into().unwrap()),
        }
    }
}

/// Outcome reported for one chunk by [`ChunkAck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkAckStatus {
    /// Chunk written successfully; sender may advance.
    Ok,
    /// CRC mismatch or other recoverable fault; sender must resend.
    RetryRequested,
}

/// Acknowledgment sent by the receiver after each `MSG_CHUNK_DATA`.
///
/// Twelve bytes on the wire: `chunk_id` (8) + `status` (1) + 3 reserved zero
/// bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAck {
    /// The chunk this acknowledgment refers to.
    pub chunk_id: u64,
    /// Whether the chunk was accepted or must be retransmitted.
    pub status: ChunkAckStatus,
}

impl ChunkAck {
    /// Wire size of this payload.
    pub const WIRE_SIZE: usize = super::CHUNK_ACK_SIZE;

    /// Serializes this acknowledgment to its 12-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        buf[0..8].copy_from_slice(&self.chunk_id.to_be_bytes());
        buf[8] = match self.status {
            ChunkAckStatus::Ok => 0,
            ChunkAckStatus::RetryRequested => 1,
        };
        buf
    }

    /// Parses a 12-byte buffer into a `ChunkAck`. Any nonzero `status` byte
    /// other than 0 is treated as "retry requested", matching the original
    /// protocol's lenient boolean-ish interpretation of the field.
    #[must_use]
    pub fn decode(buf: &[u8; Self::WIRE_SIZE]) -> Self {
        let chunk_id = u64::from_be_bytes(buf[0..8].try_into().unwrap());
        let status = if buf[8] == 0 {
            ChunkAckStatus::Ok
        } else {
            ChunkAckStatus::RetryRequested
        };
        Self { chunk_id, status }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChunkAck, ChunkAckStatus, ChunkHeader};

    #[test]
    fn chunk_header_round_trips() {
        let header = ChunkHeader {
            chunk_id: 7,
            chunk_offset: 7 * 524_288,
            chunk_size: 524_288,
            chunk_crc32: 0xE7A4_1B02,
        };
        assert_eq!(ChunkHeader::decode(&header.encode()), header);
    }

    #[test]
    fn chunk_ack_round_trips_both_statuses() {
        for status in [ChunkAckStatus::Ok, ChunkAckStatus::RetryRequested] {
            let ack = ChunkAck { chunk_id: 3, status };
            assert_eq!(ChunkAck::decode(&ack.encode()), ack);
        }
    }
}
