//! The receiver-side state machine: `Listening → Handshake → AwaitFileInfo →
//! Writing(next_expected) → Finalizing → Done`.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::TransferSettings;
use crate::crc::crc32;
use crate::error::{Error, Result};
use crate::file::{self, FileWriter};
use crate::protocol::{
    self, ChunkAck, ChunkAckStatus, ChunkHeader, ErrorMessage, FileAck, FileAckStatus, FileInfo,
    MessageType,
};

/// Where the receiver is in its lock-step conversation with the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Connection accepted, nothing read yet.
    Listening,
    /// Handshake request received; acknowledgment sent.
    Handshake,
    /// Waiting for `MSG_FILE_INFO`.
    AwaitFileInfo,
    /// Writing chunks; `next_expected` is the receiver's own chunk counter
    /// (the authoritative offset for each write still comes from the
    /// sender's `ChunkHeader.chunk_offset`).
    Writing(u64),
    /// All chunks received; renaming temp file to its final path.
    Finalizing,
    /// Transfer complete and durable.
    Done,
}

/// Drives one inbound file transfer over an already-accepted connection.
pub struct Receiver<S> {
    stream: S,
    output_dir: PathBuf,
    settings: TransferSettings,
    next_seq: u64,
    state: ReceiverState,
}

/// The final resting place of a successfully received file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Where the file was written.
    pub path: PathBuf,
    /// Size of the file in bytes.
    pub size: u64,
}

impl<S> Receiver<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Prepares a receiver bound to `stream`, writing accepted files under
    /// `output_dir`.
    #[must_use]
    pub fn new(stream: S, output_dir: PathBuf, settings: TransferSettings) -> Self {
        Self {
            stream,
            output_dir,
            settings,
            next_seq: 0,
            state: ReceiverState::Listening,
        }
    }

    /// Current state machine position.
    #[must_use]
    pub const fn state(&self) -> ReceiverState {
        self.state
    }

    fn timeout(&self) -> Option<std::time::Duration> {
        Some(self.settings.timeout)
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Runs the receiver to completion: handshake, file-info exchange
    /// (including sanitization and disk-space checks), the chunk loop, and
    /// finalization. Returns the destination path and size on success.
    pub async fn run(&mut self) -> Result<ReceivedFile> {
        self.handshake().await?;
        let (info, mut writer) = self.accept_file_info().await?;
        let received = self.receive_chunks(&info, &mut writer).await;

        match received {
            Ok(()) => {
                self.state = ReceiverState::Finalizing;
                let path = writer.finalize().await?;
                self.state = ReceiverState::Done;
                tracing::info!(path = %path.display(), "transfer complete");
                Ok(ReceivedFile {
                    path,
                    size: info.file_size,
                })
            }
            Err(e) => {
                writer.abort().await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        self.state = ReceiverState::Handshake;
        let timeout = self.timeout();
        let (header, payload) = protocol::recv_message(&mut self.stream, 64, timeout).await?;
        if header.msg_type != MessageType::HandshakeReq {
            return Err(Error::Protocol(format!(
                "expected HANDSHAKE_REQ, got {:?}",
                header.msg_type
            )));
        }
        let peer_version = payload.first().copied().ok_or_else(|| {
            Error::Protocol("HANDSHAKE_REQ payload missing version byte".to_string())
        })?;
        if peer_version != protocol::VERSION {
            return Err(Error::Version {
                expected: protocol::VERSION,
                actual: peer_version,
            });
        }

        let seq = header.sequence_num + 1;
        self.next_seq = seq + 1;
        let timeout = self.timeout();
        protocol::send_message(
            &mut self.stream,
            MessageType::HandshakeAck,
            seq,
            &[protocol::VERSION, 0],
            timeout,
        )
        .await?;
        tracing::debug!("handshake accepted");
        Ok(())
    }

    async fn accept_file_info(&mut self) -> Result<(FileInfo, FileWriter)> {
        self.state = ReceiverState::AwaitFileInfo;
        let timeout = self.timeout();
        let (header, payload) =
            protocol::recv_message(&mut self.stream, protocol::FILE_INFO_SIZE, timeout).await?;
        if header.msg_type != MessageType::FileInfo {
            return Err(Error::Protocol(format!(
                "expected FILE_INFO, got {:?}",
                header.msg_type
            )));
        }
        let buf: [u8; protocol::FILE_INFO_SIZE] = payload
            .try_into()
            .map_err(|_| Error::Protocol("FILE_INFO payload has wrong size".to_string()))?;
        let info = FileInfo::decode(&buf)?;

        let Some(sanitized) = file::sanitize_filename(&info.filename) else {
            self.reject_file_info(Error::InvalidArg("unsafe filename rejected".to_string()))
                .await?;
            return Err(Error::InvalidArg(format!(
                "rejected unsafe filename {:?}",
                info.filename
            )));
        };

        if let Some(free) = file::free_space(&self.output_dir).await {
            if free < info.file_size {
                let err = Error::DiskFull {
                    needed: info.file_size,
                    available: free,
                };
                self.reject_file_info(err).await?;
                return Err(Error::DiskFull {
                    needed: info.file_size,
                    available: free,
                });
            }
        }

        let writer = match FileWriter::create(&self.output_dir, &sanitized).await {
            Ok(w) => w,
            Err(e) => {
                self.reject_file_info(Error::FileOpen(std::io::Error::other(e.to_string())))
                    .await?;
                return Err(e);
            }
        };

        let seq = self.take_seq();
        let ack = FileAck {
            status: FileAckStatus::Ready,
            error_code: 0,
        };
        let timeout = self.timeout();
        protocol::send_message(&mut self.stream, MessageType::FileAck, seq, &ack.encode(), timeout)
            .await?;
        tracing::debug!(filename = %sanitized, file_size = info.file_size, "accepted file info");
        Ok((info, writer))
    }

    async fn reject_file_info(&mut self, error: Error) -> Result<()> {
        let seq = self.take_seq();
        let err_msg = ErrorMessage {
            error_code: u8::try_from(error.code().unsigned_abs()).unwrap_or(0xFF),
            chunk_id: 0,
            message: error.to_string(),
        };
        let timeout = self.timeout();
        protocol::send_message(
            &mut self.stream,
            MessageType::Error,
            seq,
            &err_msg.encode()?,
            timeout,
        )
        .await
    }

    async fn receive_chunks(&mut self, info: &FileInfo, writer: &mut FileWriter) -> Result<()> {
        let mut received_chunks = 0u64;
        while received_chunks < info.total_chunks {
            self.state = ReceiverState::Writing(received_chunks);
            let timeout = self.timeout();
            let (header, payload) =
                protocol::recv_message(&mut self.stream, protocol::CHUNK_HEADER_SIZE + info.chunk_size as usize, timeout)
                    .await?;
            if header.msg_type != MessageType::ChunkData {
                return Err(Error::Protocol(format!(
                    "expected CHUNK_DATA, got {:?}",
                    header.msg_type
                )));
            }
            if payload.len() < protocol::CHUNK_HEADER_SIZE {
                return Err(Error::Protocol("CHUNK_DATA payload shorter than its header".to_string()));
            }
            let chunk_header_buf: [u8; protocol::CHUNK_HEADER_SIZE] =
                payload[..protocol::CHUNK_HEADER_SIZE].try_into().unwrap();
            let chunk_header = ChunkHeader::decode(&chunk_header_buf);
            let bytes = &payload[protocol::CHUNK_HEADER_SIZE..];
            if bytes.len() != chunk_header.chunk_size as usize {
                return Err(Error::Protocol("chunk payload length disagrees with its header".to_string()));
            }

            if info.chunk_size == 0
                || chunk_header.chunk_offset > info.file_size
                || chunk_header.chunk_offset % u64::from(info.chunk_size) != 0
                || chunk_header.chunk_offset + u64::from(chunk_header.chunk_size) > info.file_size
            {
                return Err(Error::Protocol(format!(
                    "chunk offset {} is out of range for a {}-byte file",
                    chunk_header.chunk_offset, info.file_size
                )));
            }

            if crc32(bytes) != chunk_header.chunk_crc32 {
                tracing::warn!(chunk_id = chunk_header.chunk_id, "chunk CRC mismatch, requesting retry");
                self.send_chunk_ack(chunk_header.chunk_id, ChunkAckStatus::RetryRequested).await?;
                continue;
            }

            writer.write_at(chunk_header.chunk_offset, bytes).await?;
            self.send_chunk_ack(chunk_header.chunk_id, ChunkAckStatus::Ok).await?;
            received_chunks += 1;
        }
        Ok(())
    }

    async fn send_chunk_ack(&mut self, chunk_id: u64, status: ChunkAckStatus) -> Result<()> {
        let seq = self.take_seq();
        let ack = ChunkAck { chunk_id, status };
        let timeout = self.timeout();
        protocol::send_message(&mut self.stream, MessageType::ChunkAck, seq, &ack.encode(), timeout)
            .await
    }
}

/// Convenience wrapper mirroring the CLI's need for a ready-made output
/// directory check before a `Receiver` is constructed.
pub async fn ensure_output_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir).await.map_err(Error::FileOpen)
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::{Receiver, ReceiverState};
    use crate::config::TransferSettings;
    use crate::protocol::{self, ChecksumType, ChunkAck, ChunkHeader, FileAck, FileInfo, MessageType};

    async fn send_handshake(stream: &mut tokio::io::DuplexStream) -> u64 {
        protocol::send_message(stream, MessageType::HandshakeReq, 0, &[protocol::VERSION, 0], None)
            .await
            .unwrap();
        let (header, payload) = protocol::recv_message(stream, 64, None).await.unwrap();
        assert_eq!(header.msg_type, MessageType::HandshakeAck);
        assert_eq!(payload[0], protocol::VERSION);
        header.sequence_num
    }

    #[tokio::test]
    async fn empty_file_produces_empty_output_with_no_chunk_traffic() {
        let dir = tempfile::tempdir().unwrap();
        let (a, mut b) = duplex(1 << 20);
        let mut receiver = Receiver::new(a, dir.path().to_path_buf(), TransferSettings::default());

        let run = tokio::spawn(async move { receiver.run().await });

        let mut seq = send_handshake(&mut b).await;
        seq += 1;
        let info = FileInfo {
            filename: "empty.txt".to_string(),
            file_size: 0,
            total_chunks: 0,
            chunk_size: 524_288,
            checksum_type: ChecksumType::Crc32,
            file_checksum: [0u8; 32],
            file_mode: 0o644,
            timestamp: 0,
        };
        protocol::send_message(&mut b, MessageType::FileInfo, seq, &info.encode().unwrap(), None)
            .await
            .unwrap();
        let (header, payload) = protocol::recv_message(&mut b, protocol::FILE_ACK_SIZE, None).await.unwrap();
        assert_eq!(header.msg_type, MessageType::FileAck);
        let ack_buf: [u8; protocol::FILE_ACK_SIZE] = payload.try_into().unwrap();
        let _ = FileAck::decode(&ack_buf);

        let result = run.await.unwrap().unwrap();
        assert_eq!(result.size, 0);
        assert!(tokio::fs::try_exists(dir.path().join("empty.txt")).await.unwrap());
        let contents = tokio::fs::read(dir.path().join("empty.txt")).await.unwrap();
        assert!(contents.is_empty());
    }

    #[tokio::test]
    async fn rejects_path_traversal_filename() {
        let dir = tempfile::tempdir().unwrap();
        let (a, mut b) = duplex(1 << 20);
        let mut receiver = Receiver::new(a, dir.path().to_path_buf(), TransferSettings::default());

        let run = tokio::spawn(async move { receiver.run().await });

        let mut seq = send_handshake(&mut b).await;
        seq += 1;
        let info = FileInfo {
            filename: "../etc/passwd".to_string(),
            file_size: 10,
            total_chunks: 1,
            chunk_size: 524_288,
            checksum_type: ChecksumType::Crc32,
            file_checksum: [0u8; 32],
            file_mode: 0o644,
            timestamp: 0,
        };
        protocol::send_message(&mut b, MessageType::FileInfo, seq, &info.encode().unwrap(), None)
            .await
            .unwrap();
        let (header, _) = protocol::recv_message(&mut b, protocol::ERROR_MESSAGE_SIZE, None).await.unwrap();
        assert_eq!(header.msg_type, MessageType::Error);

        assert!(run.await.unwrap().is_err());
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn single_chunk_with_crc_mismatch_then_good_retry_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let (a, mut b) = duplex(1 << 20);
        let mut receiver = Receiver::new(a, dir.path().to_path_buf(), TransferSettings::default());

        let run = tokio::spawn(async move { receiver.run().await });

        let mut seq = send_handshake(&mut b).await;
        seq += 1;
        let payload_bytes = vec![0xABu8; 10];
        let info = FileInfo {
            filename: "data.bin".to_string(),
            file_size: payload_bytes.len() as u64,
            total_chunks: 1,
            chunk_size: 524_288,
            checksum_type: ChecksumType::Crc32,
            file_checksum: [0u8; 32],
            file_mode: 0o644,
            timestamp: 0,
        };
        protocol::send_message(&mut b, MessageType::FileInfo, seq, &info.encode().unwrap(), None)
            .await
            .unwrap();
        let (ack_header, _) = protocol::recv_message(&mut b, protocol::FILE_ACK_SIZE, None).await.unwrap();
        assert_eq!(ack_header.msg_type, MessageType::FileAck);

        let chunk_header = ChunkHeader {
            chunk_id: 0,
            chunk_offset: 0,
            chunk_size: payload_bytes.len() as u32,
            chunk_crc32: 0xDEAD_BEEF, // deliberately wrong
        };
        let mut bad_payload = chunk_header.encode().to_vec();
        bad_payload.extend_from_slice(&payload_bytes);
        protocol::send_message(&mut b, MessageType::ChunkData, ack_header.sequence_num + 1, &bad_payload, None)
            .await
            .unwrap();
        let (retry_header, retry_payload) = protocol::recv_message(&mut b, protocol::CHUNK_ACK_SIZE, None)
            .await
            .unwrap();
        assert_eq!(retry_header.msg_type, MessageType::ChunkAck);
        let retry_ack_buf: [u8; protocol::CHUNK_ACK_SIZE] = retry_payload.try_into().unwrap();
        let retry_ack = ChunkAck::decode(&retry_ack_buf);
        assert_eq!(retry_ack.status, crate::protocol::ChunkAckStatus::RetryRequested);

        let good_crc = crate::crc::crc32(&payload_bytes);
        let good_header = ChunkHeader {
            chunk_id: 0,
            chunk_offset: 0,
            chunk_size: payload_bytes.len() as u32,
            chunk_crc32: good_crc,
        };
        let mut good_payload = good_header.encode().to_vec();
        good_payload.extend_from_slice(&payload_bytes);
        protocol::send_message(&mut b, MessageType::ChunkData, retry_header.sequence_num + 1, &good_payload, None)
            .await
            .unwrap();
        let (ok_header, ok_payload) = protocol::recv_message(&mut b, protocol::CHUNK_ACK_SIZE, None).await.unwrap();
        assert_eq!(ok_header.msg_type, MessageType::ChunkAck);
        let ok_ack_buf: [u8; protocol::CHUNK_ACK_SIZE] = ok_payload.try_into().unwrap();
        assert_eq!(ChunkAck::decode(&ok_ack_buf).status, crate::protocol::ChunkAckStatus::Ok);

        let result = run.await.unwrap().unwrap();
        assert_eq!(result.size, 10);
        let contents = tokio::fs::read(dir.path().join("data.bin")).await.unwrap();
        assert_eq!(contents, payload_bytes);
    }
}
