//! `ftcp send` — connect to a receiver and stream one file to it.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use ftcp_core::config::TransferSettings;
use ftcp_core::protocol::DEFAULT_PORT;
use ftcp_core::transfer::Sender;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

/// Number of connect attempts before giving up, per the exponential-backoff
/// retry policy (outside the protocol core).
const MAX_CONNECT_ATTEMPTS: u32 = 5;

#[derive(Args)]
pub struct SendArgs {
    /// Receiver host (IP address or DNS name).
    #[arg(short = 'h', long)]
    pub host: String,

    /// Path to the file to send.
    #[arg(short = 'f', long)]
    pub file: PathBuf,

    /// Receiver port.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Enable debug-level logging.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Write logs to this file in addition to stderr.
    #[arg(short = 'l', long)]
    pub log: Option<PathBuf>,
}

/// Connects to the receiver and streams `args.file` to completion.
pub async fn run(args: SendArgs) -> Result<()> {
    let settings = TransferSettings {
        port: args.port,
        ..TransferSettings::default()
    };

    let stream = connect_with_backoff(&args.host, args.port).await?;
    configure_tcp_nodelay(&stream)?;

    let mut sender = Sender::new(stream, &args.file, settings)
        .await
        .with_context(|| format!("failed to open {}", args.file.display()))?;
    sender.run().await.context("transfer failed")?;

    tracing::info!(file = %args.file.display(), host = %args.host, "file sent");
    Ok(())
}

/// Resolves `host:port` and connects, retrying with exponential backoff
/// (1000 ms doubling, capped at 16000 ms) up to `MAX_CONNECT_ATTEMPTS`
/// times.
async fn connect_with_backoff(host: &str, port: u16) -> Result<TcpStream> {
    let addr = format!("{host}:{port}");
    let mut delay = Duration::from_millis(1000);
    let cap = Duration::from_millis(16_000);

    let mut last_err = None;
    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        match TcpStream::connect(&addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::warn!(attempt, max = MAX_CONNECT_ATTEMPTS, error = %e, "connect failed, retrying");
                last_err = Some(e);
                if attempt < MAX_CONNECT_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, cap);
                }
            }
        }
    }
    Err(anyhow::anyhow!(
        "failed to connect to {addr} after {MAX_CONNECT_ATTEMPTS} attempts: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// Disables Nagle's algorithm on the sender's socket, per the protocol's
/// wire requirements.
fn configure_tcp_nodelay(stream: &TcpStream) -> Result<()> {
    let sock = SockRef::from(stream);
    sock.set_nodelay(true).context("failed to set TCP_NODELAY")?;
    // A keepalive matching the protocol's read/write deadline keeps a dead
    // peer from hanging the connection indefinitely between chunks.
    let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(60));
    sock.set_tcp_keepalive(&keepalive).context("failed to set keepalive")?;
    Ok(())
}
