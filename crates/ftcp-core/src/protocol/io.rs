//! Framed I/O: reads and writes whole messages (header + payload) over any
//! async byte stream, with an optional deadline on each operation.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{Header, MessageType, HEADER_SIZE};
use crate::error::{Error, Result};

/// Writes every byte of `bytes` to `stream`, looping through partial writes.
async fn send_all<S>(stream: &mut S, bytes: &[u8]) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await.map_err(Error::Send)
}

/// Reads exactly `buf.len()` bytes from `stream`. A clean EOF before `buf` is
/// full is reported as [`Error::Recv`], matching the "zero-length read is
/// peer-closed" rule.
async fn recv_all<S>(stream: &mut S, buf: &mut [u8]) -> Result<()>
where
    S: AsyncRead + Unpin,
{
    stream.read_exact(buf).await.map_err(Error::Recv).map(|_| ())
}

async fn with_timeout<F, T>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match timeout {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| Error::Timeout(d.as_secs()))?,
        None => fut.await,
    }
}

/// Writes a complete message (header + payload) to `stream`.
///
/// `timeout`, when set, bounds the whole write (header and payload
/// together), mirroring the single FT_TIMEOUT_SECONDS deadline applied to
/// each blocking socket call.
pub async fn send_message<S>(
    stream: &mut S,
    msg_type: MessageType,
    sequence_num: u64,
    payload: &[u8],
    timeout: Option<Duration>,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let header = Header::new(msg_type, sequence_num, payload.len() as u64);
    let encoded_header = header.encode();
    with_timeout(timeout, async {
        send_all(stream, &encoded_header).await?;
        if !payload.is_empty() {
            send_all(stream, payload).await?;
        }
        Ok(())
    })
    .await
}

/// Reads one complete message from `stream`: a header, validated, followed
/// by its payload.
///
/// # Errors
/// Returns `Error::Protocol` if the declared `payload_size` exceeds
/// `max_payload`; returns whatever [`Header::validate`] reports for a
/// malformed header; returns `Error::Timeout` if `timeout` elapses first.
pub async fn recv_message<S>(
    stream: &mut S,
    max_payload: usize,
    timeout: Option<Duration>,
) -> Result<(Header, Vec<u8>)>
where
    S: AsyncRead + Unpin,
{
    with_timeout(timeout, async {
        let mut header_buf = [0u8; HEADER_SIZE];
        recv_all(stream, &mut header_buf).await?;
        let header = Header::validate(&header_buf)?;

        let payload_size = usize::try_from(header.payload_size)
            .map_err(|_| Error::Protocol("payload_size overflowed usize".to_string()))?;
        if payload_size > max_payload {
            return Err(Error::Protocol(format!(
                "payload_size {payload_size} exceeds max {max_payload} for {:?}",
                header.msg_type
            )));
        }

        let mut payload = vec![0u8; payload_size];
        if payload_size > 0 {
            recv_all(stream, &mut payload).await?;
        }
        Ok((header, payload))
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::duplex;

    use super::{recv_message, send_message};
    use crate::protocol::MessageType;

    #[tokio::test]
    async fn sends_and_receives_a_message_with_payload() {
        let (mut a, mut b) = duplex(4096);
        let payload = b"hello chunk".to_vec();
        send_message(&mut a, MessageType::FileInfo, 5, &payload, None)
            .await
            .unwrap();
        let (header, received) = recv_message(&mut b, 4096, Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert_eq!(header.msg_type, MessageType::FileInfo);
        assert_eq!(header.sequence_num, 5);
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn rejects_payload_larger_than_max() {
        let (mut a, mut b) = duplex(4096);
        send_message(&mut a, MessageType::ChunkData, 0, &[0u8; 100], None)
            .await
            .unwrap();
        let result = recv_message(&mut b, 10, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn times_out_when_peer_never_writes() {
        let (_a, mut b) = duplex(4096);
        let result = recv_message::<tokio::io::DuplexStream>(&mut b, 4096, Some(Duration::from_millis(20))).await;
        assert!(matches!(result, Err(crate::error::Error::Timeout(_))));
    }
}
