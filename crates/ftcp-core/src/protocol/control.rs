//! `FileAck` and `ErrorMessage`, the small fixed-size control payloads.

use super::{ERROR_MESSAGE_SIZE, FILE_ACK_SIZE};
use crate::error::{Error, Result};

const ERROR_MESSAGE_TEXT_LEN: usize = 247;

/// Outcome reported by the receiver in response to `MSG_FILE_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAckStatus {
    /// Receiver opened the temp file and is ready for chunks.
    Ready,
    /// Receiver rejected the transfer; a `MSG_ERROR` carries the reason.
    Error,
}

/// 4-byte payload: `status`(1) + `error_code`(1) + 2 reserved zero bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAck {
    /// Whether the receiver accepted the incoming file.
    pub status: FileAckStatus,
    /// An `FT_ERR_*` code, meaningful only when `status` is `Error`.
    pub error_code: u8,
}

impl FileAck {
    /// Serializes this acknowledgment to its 4-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; FILE_ACK_SIZE] {
        let mut buf = [0u8; FILE_ACK_SIZE];
        buf[0] = match self.status {
            FileAckStatus::Ready => 0,
            FileAckStatus::Error => 1,
        };
        buf[1] = self.error_code;
        buf
    }

    /// Parses a 4-byte buffer into a `FileAck`.
    #[must_use]
    pub fn decode(buf: &[u8; FILE_ACK_SIZE]) -> Self {
        let status = if buf[0] == 0 {
            FileAckStatus::Ready
        } else {
            FileAckStatus::Error
        };
        Self {
            status,
            error_code: buf[1],
        }
    }
}

/// Out-of-band error report, sent by either role when a request must be
/// rejected without tearing down the connection mid-frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    /// An `FT_ERR_*` code (stored as its unsigned byte representation).
    pub error_code: u8,
    /// The chunk this error pertains to, or 0 if not chunk-specific.
    pub chunk_id: u64,
    /// A short human-readable explanation, at most 246 bytes plus NUL.
    pub message: String,
}

impl ErrorMessage {
    /// Serializes this error to its 256-byte wire form.
    ///
    /// # Errors
    /// Returns `Error::InvalidArg` if `message` does not fit in the 246-byte
    /// text field (one byte is reserved for the NUL terminator).
    pub fn encode(&self) -> Result<[u8; ERROR_MESSAGE_SIZE]> {
        let text = self.message.as_bytes();
        if text.len() >= ERROR_MESSAGE_TEXT_LEN {
            return Err(Error::InvalidArg(format!(
                "error message of {} bytes exceeds the {}-byte field",
                text.len(),
                ERROR_MESSAGE_TEXT_LEN - 1
            )));
        }
        let mut buf = [0u8; ERROR_MESSAGE_SIZE];
        buf[0] = self.error_code;
        buf[1..9].copy_from_slice(&self.chunk_id.to_be_bytes());
        buf[9..9 + text.len()].copy_from_slice(text);
        // Remaining bytes of the 247-byte text field, plus the trailing
        // reserved bytes, stay zero (NUL terminator and padding).
        Ok(buf)
    }

    /// Parses a 256-byte buffer into an `ErrorMessage`.
    ///
    /// # Errors
    /// Returns `Error::Protocol` if the message text is not valid UTF-8.
    pub fn decode(buf: &[u8; ERROR_MESSAGE_SIZE]) -> Result<Self> {
        let error_code = buf[0];
        let chunk_id = u64::from_be_bytes(buf[1..9].try_into().unwrap());
        let text_field = &buf[9..9 + ERROR_MESSAGE_TEXT_LEN];
        let nul_at = text_field.iter().position(|&b| b == 0).unwrap_or(text_field.len());
        let message = std::str::from_utf8(&text_field[..nul_at])
            .map_err(|e| Error::Protocol(format!("error message is not valid UTF-8: {e}")))?
            .to_string();
        Ok(Self {
            error_code,
            chunk_id,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorMessage, FileAck, FileAckStatus};

    #[test]
    fn file_ack_round_trips() {
        let ack = FileAck {
            status: FileAckStatus::Ready,
            error_code: 0,
        };
        assert_eq!(FileAck::decode(&ack.encode()), ack);

        let err_ack = FileAck {
            status: FileAckStatus::Error,
            error_code: 14,
        };
        assert_eq!(FileAck::decode(&err_ack.encode()), err_ack);
    }

    #[test]
    fn error_message_round_trips() {
        let msg = ErrorMessage {
            error_code: 31,
            chunk_id: 0,
            message: "path traversal rejected".to_string(),
        };
        let encoded = msg.encode().unwrap();
        assert_eq!(encoded.len(), 256);
        assert_eq!(ErrorMessage::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn error_message_rejects_oversized_text() {
        let msg = ErrorMessage {
            error_code: 1,
            chunk_id: 0,
            message: "x".repeat(247),
        };
        assert!(msg.encode().is_err());
    }
}
