//! The sender-side state machine: `Init → Handshake → FileInfoSent →
//! AwaitFileAck → Streaming(chunk_id) → Done`, with `Failed` on error.

use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWrite};

use super::RetryBudget;
use crate::config::TransferSettings;
use crate::crc::crc32;
use crate::error::{Error, Result};
use crate::protocol::{
    self, ChecksumType, ChunkAck, ChunkAckStatus, ChunkHeader, FileAck, FileAckStatus, FileInfo,
    MessageType,
};

/// Where the sender is in its lock-step conversation with the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// File opened, nothing sent yet.
    Init,
    /// Handshake request sent, awaiting acknowledgment.
    Handshake,
    /// `FILE_INFO` sent, awaiting `FILE_ACK`/`ERROR`.
    FileInfoSent,
    /// Waiting on the receiver's readiness acknowledgment.
    AwaitFileAck,
    /// Streaming chunk `chunk_id`, awaiting its acknowledgment.
    Streaming(u64),
    /// All chunks acknowledged; transfer complete.
    Done,
    /// Transfer aborted; carries no payload, the error itself is returned to
    /// the caller.
    Failed,
}

/// Drives one outbound file transfer over an already-connected stream.
pub struct Sender<S> {
    stream: S,
    file: File,
    file_size: u64,
    filename: String,
    file_mode: u32,
    timestamp: u64,
    settings: TransferSettings,
    next_seq: u64,
    state: SenderState,
}

impl<S> Sender<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Opens `file_path` and prepares a sender bound to `stream`.
    ///
    /// # Errors
    /// Returns `Error::FileNotFound` if the path does not exist,
    /// `Error::FileOpen` for other open failures, `Error::FilenameTooLong`
    /// if the basename does not fit the wire field.
    pub async fn new(stream: S, file_path: &Path, settings: TransferSettings) -> Result<Self> {
        if !file_path.exists() {
            return Err(Error::FileNotFound(file_path.display().to_string()));
        }
        let file = File::open(file_path).await.map_err(Error::FileOpen)?;
        let metadata = file.metadata().await.map_err(Error::FileOpen)?;

        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::InvalidArg("source path has no filename component".to_string()))?;
        if filename.as_bytes().len() > protocol::MAX_FILENAME_LEN {
            return Err(Error::FilenameTooLong(filename.as_bytes().len()));
        }

        let file_mode = file_mode_bits(&metadata);
        let timestamp = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());

        Ok(Self {
            stream,
            file,
            file_size: metadata.len(),
            filename,
            file_mode,
            timestamp,
            settings,
            next_seq: 0,
            state: SenderState::Init,
        })
    }

    /// Current state machine position.
    #[must_use]
    pub const fn state(&self) -> SenderState {
        self.state
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.settings.timeout)
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Runs the transfer to completion: handshake, file-info exchange, and
    /// the full chunk loop. Returns `Ok(())` only once every chunk has been
    /// acknowledged with `status == Ok`.
    pub async fn run(&mut self) -> Result<()> {
        if let Err(e) = self.handshake().await {
            self.state = SenderState::Failed;
            return Err(e);
        }
        if let Err(e) = self.send_file_info().await {
            self.state = SenderState::Failed;
            return Err(e);
        }
        if let Err(e) = self.stream_chunks().await {
            self.state = SenderState::Failed;
            return Err(e);
        }
        self.state = SenderState::Done;
        tracing::info!(file = %self.filename, "transfer complete");
        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        self.state = SenderState::Handshake;
        let seq = self.take_seq();
        tracing::debug!(seq, "sending handshake request");
        // Capabilities are currently always zero; the field exists for a
        // future protocol revision.
        let payload = [protocol::VERSION, 0];
        let timeout = self.timeout();
        protocol::send_message(&mut self.stream, MessageType::HandshakeReq, seq, &payload, timeout)
            .await?;

        let timeout = self.timeout();
        let (header, payload) =
            protocol::recv_message(&mut self.stream, 64, timeout).await?;
        if header.msg_type != MessageType::HandshakeAck {
            return Err(Error::Protocol(format!(
                "expected HANDSHAKE_ACK, got {:?}",
                header.msg_type
            )));
        }
        let peer_version = payload.first().copied().ok_or_else(|| {
            Error::Protocol("HANDSHAKE_ACK payload missing version byte".to_string())
        })?;
        if peer_version != protocol::VERSION {
            return Err(Error::Version {
                expected: protocol::VERSION,
                actual: peer_version,
            });
        }
        tracing::debug!("handshake acknowledged");
        Ok(())
    }

    async fn send_file_info(&mut self) -> Result<()> {
        self.state = SenderState::FileInfoSent;
        let chunk_size = self.settings.chunk_size;
        let total_chunks = if self.file_size == 0 {
            0
        } else {
            (self.file_size + u64::from(chunk_size) - 1) / u64::from(chunk_size)
        };
        let info = FileInfo {
            filename: self.filename.clone(),
            file_size: self.file_size,
            total_chunks,
            chunk_size,
            checksum_type: ChecksumType::Crc32,
            // Whole-file hash verification is not implemented; this field
            // stays zero by design.
            file_checksum: [0u8; 32],
            file_mode: self.file_mode,
            timestamp: self.timestamp,
        };
        let payload = info.encode()?;
        let seq = self.take_seq();
        tracing::debug!(seq, file_size = self.file_size, total_chunks, "sending file info");
        let timeout = self.timeout();
        protocol::send_message(&mut self.stream, MessageType::FileInfo, seq, &payload, timeout)
            .await?;

        self.state = SenderState::AwaitFileAck;
        let timeout = self.timeout();
        let (header, payload) =
            protocol::recv_message(&mut self.stream, protocol::ERROR_MESSAGE_SIZE, timeout).await?;
        match header.msg_type {
            MessageType::FileAck => {
                let ack_buf: [u8; protocol::FILE_ACK_SIZE] = payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Protocol("FILE_ACK payload has wrong size".to_string()))?;
                let ack = FileAck::decode(&ack_buf);
                match ack.status {
                    FileAckStatus::Ready => {
                        tracing::debug!("receiver ready for chunks");
                        Ok(())
                    }
                    FileAckStatus::Error => Err(Error::PeerError {
                        code: i32::from(ack.error_code),
                        message: "receiver rejected file info".to_string(),
                    }),
                }
            }
            MessageType::Error => Err(decode_peer_error(&payload)),
            other => Err(Error::Protocol(format!("expected FILE_ACK or ERROR, got {other:?}"))),
        }
    }

    async fn stream_chunks(&mut self) -> Result<()> {
        let chunk_size = self.settings.chunk_size;
        let total_chunks = if self.file_size == 0 {
            0
        } else {
            (self.file_size + u64::from(chunk_size) - 1) / u64::from(chunk_size)
        };

        let mut buf = vec![0u8; chunk_size as usize];
        for chunk_id in 0..total_chunks {
            self.state = SenderState::Streaming(chunk_id);
            let offset = chunk_id * u64::from(chunk_size);
            let this_chunk_size = std::cmp::min(u64::from(chunk_size), self.file_size - offset) as usize;

            self.file
                .seek(std::io::SeekFrom::Start(offset))
                .await
                .map_err(Error::FileSeek)?;
            self.file
                .read_exact(&mut buf[..this_chunk_size])
                .await
                .map_err(Error::FileRead)?;
            let bytes = &buf[..this_chunk_size];
            let crc = crc32(bytes);

            let mut budget = RetryBudget::new(self.settings.max_retries);
            loop {
                match self.send_chunk_and_await_ack(chunk_id, offset, bytes, crc).await {
                    Ok(true) => break,
                    Ok(false) => {
                        tracing::warn!(chunk_id, "receiver requested retry");
                        if !budget.record_failure() {
                            return Err(Error::RetriesExceeded { chunk_id });
                        }
                    }
                    Err(e) if e.is_transient() => {
                        tracing::warn!(chunk_id, error = %e, "transient error, retrying chunk");
                        if !budget.record_failure() {
                            return Err(e);
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    /// Sends one chunk attempt and awaits its ACK. Returns `Ok(true)` if the
    /// chunk was accepted, `Ok(false)` if the receiver requested a retry.
    async fn send_chunk_and_await_ack(
        &mut self,
        chunk_id: u64,
        offset: u64,
        bytes: &[u8],
        crc: u32,
    ) -> Result<bool> {
        let chunk_header = ChunkHeader {
            chunk_id,
            chunk_offset: offset,
            chunk_size: u32::try_from(bytes.len()).unwrap_or(u32::MAX),
            chunk_crc32: crc,
        };
        let mut payload = Vec::with_capacity(protocol::CHUNK_HEADER_SIZE + bytes.len());
        payload.extend_from_slice(&chunk_header.encode());
        payload.extend_from_slice(bytes);

        let seq = self.take_seq();
        let timeout = self.timeout();
        protocol::send_message(&mut self.stream, MessageType::ChunkData, seq, &payload, timeout)
            .await?;

        let timeout = self.timeout();
        let (header, ack_payload) =
            protocol::recv_message(&mut self.stream, protocol::ERROR_MESSAGE_SIZE, timeout).await?;
        match header.msg_type {
            MessageType::ChunkAck => {
                let ack_buf: [u8; ChunkAck::WIRE_SIZE] = ack_payload
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Protocol("CHUNK_ACK payload has wrong size".to_string()))?;
                let ack = ChunkAck::decode(&ack_buf);
                if ack.chunk_id != chunk_id {
                    // The protocol is strictly lock-step; a mismatch here is
                    // a bug signal from the peer, not a fatal condition.
                    tracing::warn!(
                        expected = chunk_id,
                        actual = ack.chunk_id,
                        "chunk ack id mismatch, treating as ack for current chunk"
                    );
                }
                Ok(matches!(ack.status, ChunkAckStatus::Ok))
            }
            MessageType::Error => Err(decode_peer_error(&ack_payload)),
            other => Err(Error::Protocol(format!("expected CHUNK_ACK or ERROR, got {other:?}"))),
        }
    }
}

fn decode_peer_error(payload: &[u8]) -> Error {
    payload
        .try_into()
        .ok()
        .and_then(|buf: [u8; protocol::ERROR_MESSAGE_SIZE]| crate::protocol::ErrorMessage::decode(&buf).ok())
        .map_or_else(
            || Error::Protocol("peer sent malformed ERROR payload".to_string()),
            |err| Error::PeerError {
                code: i32::from(err.error_code),
                message: err.message,
            },
        )
}

#[cfg(unix)]
fn file_mode_bits(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode_bits(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use tempfile::NamedTempFile;
    use tokio::io::duplex;

    use super::{Sender, SenderState};
    use crate::config::TransferSettings;
    use crate::protocol::{self, ChunkAck, ChunkAckStatus, ChunkHeader, FileAck, FileAckStatus, MessageType};

    async fn respond_handshake_ack(stream: &mut tokio::io::DuplexStream) {
        let (header, _) = protocol::recv_message(stream, 64, None).await.unwrap();
        assert_eq!(header.msg_type, MessageType::HandshakeReq);
        protocol::send_message(
            stream,
            MessageType::HandshakeAck,
            header.sequence_num + 1,
            &[protocol::VERSION, 0],
            None,
        )
        .await
        .unwrap();
    }

    async fn respond_file_ack(stream: &mut tokio::io::DuplexStream) -> protocol::FileInfo {
        let (header, payload) = protocol::recv_message(stream, protocol::FILE_INFO_SIZE, None)
            .await
            .unwrap();
        assert_eq!(header.msg_type, MessageType::FileInfo);
        let buf: [u8; protocol::FILE_INFO_SIZE] = payload.try_into().unwrap();
        let info = protocol::FileInfo::decode(&buf).unwrap();
        let ack = FileAck {
            status: FileAckStatus::Ready,
            error_code: 0,
        };
        protocol::send_message(
            stream,
            MessageType::FileAck,
            header.sequence_num + 1,
            &ack.encode(),
            None,
        )
        .await
        .unwrap();
        info
    }

    #[tokio::test]
    async fn empty_file_sends_no_chunks() {
        let file = NamedTempFile::new().unwrap();
        let (a, mut b) = duplex(1 << 20);
        let mut sender = Sender::new(a, file.path(), TransferSettings::default()).await.unwrap();

        let run = tokio::spawn(async move {
            sender.run().await.unwrap();
            sender
        });

        respond_handshake_ack(&mut b).await;
        let info = respond_file_ack(&mut b).await;
        assert_eq!(info.file_size, 0);
        assert_eq!(info.total_chunks, 0);

        let sender = run.await.unwrap();
        assert_eq!(sender.state(), SenderState::Done);
    }

    #[tokio::test]
    async fn single_chunk_file_round_trips() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0xABu8; 100]).unwrap();
        let (a, mut b) = duplex(1 << 20);
        let mut sender = Sender::new(a, file.path(), TransferSettings::default()).await.unwrap();

        let run = tokio::spawn(async move {
            sender.run().await.unwrap();
            sender
        });

        respond_handshake_ack(&mut b).await;
        let info = respond_file_ack(&mut b).await;
        assert_eq!(info.total_chunks, 1);

        let (header, payload) = protocol::recv_message(&mut b, 1 << 20, None).await.unwrap();
        assert_eq!(header.msg_type, MessageType::ChunkData);
        let chunk_header_buf: [u8; protocol::CHUNK_HEADER_SIZE] =
            payload[..protocol::CHUNK_HEADER_SIZE].try_into().unwrap();
        let chunk_header = ChunkHeader::decode(&chunk_header_buf);
        assert_eq!(chunk_header.chunk_size, 100);
        assert_eq!(crate::crc::crc32(&payload[protocol::CHUNK_HEADER_SIZE..]), chunk_header.chunk_crc32);

        let ack = ChunkAck {
            chunk_id: 0,
            status: ChunkAckStatus::Ok,
        };
        protocol::send_message(&mut b, MessageType::ChunkAck, header.sequence_num + 1, &ack.encode(), None)
            .await
            .unwrap();

        let sender = run.await.unwrap();
        assert_eq!(sender.state(), SenderState::Done);
    }

    #[tokio::test]
    async fn retry_requested_resends_same_chunk() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0x11u8; 10]).unwrap();
        let (a, mut b) = duplex(1 << 20);
        let mut sender = Sender::new(a, file.path(), TransferSettings::default()).await.unwrap();

        let run = tokio::spawn(async move {
            sender.run().await.unwrap();
            sender
        });

        respond_handshake_ack(&mut b).await;
        respond_file_ack(&mut b).await;

        let (header1, _) = protocol::recv_message(&mut b, 1 << 20, None).await.unwrap();
        let retry_ack = ChunkAck {
            chunk_id: 0,
            status: ChunkAckStatus::RetryRequested,
        };
        protocol::send_message(&mut b, MessageType::ChunkAck, header1.sequence_num + 1, &retry_ack.encode(), None)
            .await
            .unwrap();

        let (header2, _) = protocol::recv_message(&mut b, 1 << 20, None).await.unwrap();
        assert_ne!(header2.sequence_num, header1.sequence_num);
        let ok_ack = ChunkAck {
            chunk_id: 0,
            status: ChunkAckStatus::Ok,
        };
        protocol::send_message(&mut b, MessageType::ChunkAck, header2.sequence_num + 1, &ok_ack.encode(), None)
            .await
            .unwrap();

        let sender = run.await.unwrap();
        assert_eq!(sender.state(), SenderState::Done);
    }
}
