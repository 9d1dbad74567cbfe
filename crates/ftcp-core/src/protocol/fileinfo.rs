//! The 1024-byte `FileInfo` payload carried by `MSG_FILE_INFO`.

use super::FILE_INFO_SIZE;
use crate::error::{Error, Result};

const FILENAME_FIELD_LEN: usize = 256;
const FILE_CHECKSUM_LEN: usize = 32;
const RESERVED_LEN: usize = 701;

/// How the sender computed (or, currently, did not compute) `file_checksum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChecksumType {
    /// CRC-32, the only checksum this implementation ever populates — and it
    /// currently leaves `file_checksum` zeroed regardless (see
    /// [`FileInfo::file_checksum`]).
    Crc32,
    /// Reserved for a future protocol revision; never emitted.
    Md5,
    /// Reserved for a future protocol revision; never emitted.
    Sha256,
}

impl ChecksumType {
    const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Crc32),
            1 => Some(Self::Md5),
            2 => Some(Self::Sha256),
            _ => None,
        }
    }

    const fn to_byte(self) -> u8 {
        match self {
            Self::Crc32 => 0,
            Self::Md5 => 1,
            Self::Sha256 => 2,
        }
    }
}

/// File metadata exchanged once, right after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Basename of the file being sent, at most 255 bytes plus NUL.
    pub filename: String,
    /// Total size of the file in bytes.
    pub file_size: u64,
    /// `ceil(file_size / chunk_size)`; zero for an empty file.
    pub total_chunks: u64,
    /// Chunk size this transfer uses.
    pub chunk_size: u32,
    /// Which checksum algorithm `file_checksum` claims to use.
    pub checksum_type: ChecksumType,
    /// Whole-file checksum. Always zero: whole-file hash verification is not
    /// implemented by this protocol revision, by design.
    pub file_checksum: [u8; FILE_CHECKSUM_LEN],
    /// POSIX-style permission bits.
    pub file_mode: u32,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
}

impl FileInfo {
    /// Serializes this structure to its fixed 1024-byte wire form.
    ///
    /// # Errors
    /// Returns `Error::FilenameTooLong` if `filename` does not fit in the
    /// 255-byte field (one byte is reserved for the NUL terminator).
    pub fn encode(&self) -> Result<[u8; FILE_INFO_SIZE]> {
        let name_bytes = self.filename.as_bytes();
        if name_bytes.len() > FILENAME_FIELD_LEN {
            return Err(Error::FilenameTooLong(name_bytes.len()));
        }
        let mut buf = [0u8; FILE_INFO_SIZE];
        let mut offset = 0;

        let filename_len = u16::try_from(name_bytes.len()).unwrap_or(u16::MAX);
        buf[offset..offset + 2].copy_from_slice(&filename_len.to_be_bytes());
        offset += 2;

        buf[offset..offset + name_bytes.len()].copy_from_slice(name_bytes);
        offset += FILENAME_FIELD_LEN;

        buf[offset..offset + 8].copy_from_slice(&self.file_size.to_be_bytes());
        offset += 8;

        buf[offset..offset + 8].copy_from_slice(&self.total_chunks.to_be_bytes());
        offset += 8;

        buf[offset..offset + 4].copy_from_slice(&self.chunk_size.to_be_bytes());
        offset += 4;

        buf[offset] = self.checksum_type.to_byte();
        offset += 1;

        buf[offset..offset + FILE_CHECKSUM_LEN].copy_from_slice(&self.file_checksum);
        offset += FILE_CHECKSUM_LEN;

        buf[offset..offset + 4].copy_from_slice(&self.file_mode.to_be_bytes());
        offset += 4;

        buf[offset..offset + 8].copy_from_slice(&self.timestamp.to_be_bytes());
        offset += 8;

        debug_assert_eq!(offset + RESERVED_LEN, FILE_INFO_SIZE);
        Ok(buf)
    }

    /// Parses a 1024-byte buffer into a `FileInfo`.
    ///
    /// # Errors
    /// Returns `Error::Protocol` if `filename_len` exceeds the field's
    /// capacity, the filename bytes are not valid UTF-8, or `checksum_type`
    /// names no known algorithm.
    pub fn decode(buf: &[u8; FILE_INFO_SIZE]) -> Result<Self> {
        let mut offset = 0;

        let filename_len = u16::from_be_bytes(buf[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;
        if filename_len > FILENAME_FIELD_LEN {
            return Err(Error::Protocol(format!(
                "filename_len {filename_len} exceeds field capacity"
            )));
        }

        let filename_field = &buf[offset..offset + FILENAME_FIELD_LEN];
        let name_bytes = &filename_field[..filename_len];
        if filename_field[filename_len..].iter().any(|&b| b != 0) {
            return Err(Error::Protocol(
                "filename field not NUL-padded after declared length".to_string(),
            ));
        }
        let filename = std::str::from_utf8(name_bytes)
            .map_err(|e| Error::Protocol(format!("filename is not valid UTF-8: {e}")))?
            .to_string();
        offset += FILENAME_FIELD_LEN;

        let file_size = u64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap());
        offset += 8;

        let total_chunks = u64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap());
        offset += 8;

        let chunk_size = u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap());
        offset += 4;

        let checksum_type = ChecksumType::from_byte(buf[offset])
            .ok_or_else(|| Error::Protocol(format!("unknown checksum_type {}", buf[offset])))?;
        offset += 1;

        let mut file_checksum = [0u8; FILE_CHECKSUM_LEN];
        file_checksum.copy_from_slice(&buf[offset..offset + FILE_CHECKSUM_LEN]);
        offset += FILE_CHECKSUM_LEN;

        let file_mode = u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap());
        offset += 4;

        let timestamp = u64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap());
        offset += 8;

        debug_assert_eq!(offset + RESERVED_LEN, FILE_INFO_SIZE);

        Ok(Self {
            filename,
            file_size,
            total_chunks,
            chunk_size,
            checksum_type,
            file_checksum,
            file_mode,
            timestamp,
        })
    }
}
