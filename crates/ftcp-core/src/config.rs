//! Transfer-wide settings shared by both roles.
//!
//! Unlike the teacher's `config::Config`, this carries no persistence layer:
//! the protocol names no configuration file, so values come from CLI flags
//! layered over these defaults.

use std::time::Duration;

use crate::protocol::{BACKOFF_CAP_MS, DEFAULT_CHUNK_SIZE, DEFAULT_PORT, MAX_RETRIES, TIMEOUT_SECS};

/// Tunables for one transfer, shared by sender and receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSettings {
    /// Chunk size in bytes used to split the file.
    pub chunk_size: u32,
    /// TCP port to connect to or listen on.
    pub port: u16,
    /// Socket read/write deadline.
    pub timeout: Duration,
    /// Maximum consecutive retries for one chunk before aborting.
    pub max_retries: u32,
    /// Initial connect-retry backoff delay.
    pub backoff_base: Duration,
    /// Upper bound the connect-retry backoff doubles toward.
    pub backoff_cap: Duration,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            port: DEFAULT_PORT,
            timeout: Duration::from_secs(TIMEOUT_SECS),
            max_retries: MAX_RETRIES,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_millis(BACKOFF_CAP_MS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TransferSettings;

    #[test]
    fn defaults_match_protocol_constants() {
        let settings = TransferSettings::default();
        assert_eq!(settings.chunk_size, 524_288);
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.timeout.as_secs(), 60);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.backoff_cap.as_millis(), 16_000);
    }
}
