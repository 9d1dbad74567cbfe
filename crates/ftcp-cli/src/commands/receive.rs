//! `ftcp receive` — listen for one incoming connection and receive one file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ftcp_core::config::TransferSettings;
use ftcp_core::protocol::DEFAULT_PORT;
use ftcp_core::transfer::{self, Receiver};
use socket2::{Domain, SockRef, Socket, Type};
use tokio::net::TcpListener;

#[derive(Args)]
pub struct ReceiveArgs {
    /// Port to listen on.
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory to write the received file into.
    #[arg(short = 'd', long, default_value = ".")]
    pub dir: PathBuf,

    /// Enable debug-level logging.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Write logs to this file in addition to stderr.
    #[arg(short = 'l', long)]
    pub log: Option<PathBuf>,
}

/// Accepts exactly one connection and drives it to completion.
pub async fn run(args: ReceiveArgs) -> Result<()> {
    transfer::ensure_output_dir(&args.dir)
        .await
        .with_context(|| format!("failed to create output directory {}", args.dir.display()))?;

    let listener = bind_with_reuseaddr(args.port)?;
    tracing::info!(port = args.port, dir = %args.dir.display(), "listening for one connection");

    let (stream, peer) = listener.accept().await.context("accept failed")?;
    configure_accepted_stream(&stream)?;
    tracing::info!(%peer, "connection accepted");

    let settings = TransferSettings {
        port: args.port,
        ..TransferSettings::default()
    };
    let mut receiver = Receiver::new(stream, args.dir.clone(), settings);
    let received = receiver.run().await.context("transfer failed")?;

    tracing::info!(path = %received.path.display(), size = received.size, "file received");
    Ok(())
}

/// Binds a TCP listener with `SO_REUSEADDR` set, matching the protocol's
/// socket-setup requirements for the receiver's listening socket.
fn bind_with_reuseaddr(port: u16) -> Result<TcpListener> {
    let addr: std::net::SocketAddr = ([0, 0, 0, 0], port).into();
    let socket = Socket::new(Domain::IPV4, Type::STREAM, None).context("failed to create socket")?;
    socket.set_reuse_address(true).context("failed to set SO_REUSEADDR")?;
    socket.bind(&addr.into()).with_context(|| format!("failed to bind port {port}"))?;
    socket.listen(1).context("failed to listen")?;
    socket.set_nonblocking(true).context("failed to set nonblocking")?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener).context("failed to hand listener to the async runtime")
}

fn configure_accepted_stream(stream: &tokio::net::TcpStream) -> Result<()> {
    let sock = SockRef::from(stream);
    sock.set_nodelay(true).context("failed to set TCP_NODELAY on accepted stream")?;
    Ok(())
}
