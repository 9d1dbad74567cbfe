//! Wire protocol and transfer engine for sending a single regular file
//! between two processes over a TCP byte stream.
//!
//! This crate has no knowledge of sockets, CLI flags, or logging sinks: it
//! works over any type implementing [`tokio::io::AsyncRead`] +
//! [`tokio::io::AsyncWrite`], so the binary crate is free to wire it up to a
//! real `TcpStream`, a `tokio::io::duplex` pair in tests, or anything else
//! that speaks the same traits.
//!
//! - [`crc`] — the IEEE CRC-32 used by every header and chunk.
//! - [`protocol`] — message framing, the header codec, and the fixed-size
//!   payload structures.
//! - [`file`] — filename sanitization and the receiver's temp-file/rename
//!   write path.
//! - [`transfer`] — the [`transfer::Sender`] and [`transfer::Receiver`]
//!   state machines that drive one transfer end to end.
//! - [`config`] — shared tunables ([`config::TransferSettings`]).
//! - [`error`] — the unified [`error::Error`] type and its wire error codes.

pub mod config;
pub mod crc;
pub mod error;
pub mod file;
pub mod protocol;
pub mod transfer;

pub use error::{Error, Result};

/// Crate version, re-exported for diagnostics and handshake logging.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
