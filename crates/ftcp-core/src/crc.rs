//! IEEE CRC-32, the checksum used for every header and chunk on the wire.

use crc::Crc;

/// IEEE 802.3 CRC-32 (poly 0xEDB88320 reflected, init/xorout 0xFFFFFFFF) —
/// the same table zlib and Ethernet use. Exposed as a `const` the way the
/// pack's VEX serial driver exposes its own wire-protocol CRCs.
pub const FTCP_CRC32: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

/// Computes the CRC-32 of `bytes`.
///
/// ```
/// assert_eq!(ftcp_core::crc::crc32(b""), 0);
/// assert_eq!(ftcp_core::crc::crc32(b"123456789"), 0xCBF4_3926);
/// ```
#[must_use]
pub fn crc32(bytes: &[u8]) -> u32 {
    FTCP_CRC32.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::crc32;

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn standard_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn thirty_two_zero_bytes() {
        assert_eq!(crc32(&[0u8; 32]), 0x190A_55AD);
    }

    #[test]
    fn exact_chunk_of_0xab_bytes() {
        let buf = vec![0xABu8; 524_288];
        assert_eq!(crc32(&buf), 0xE7A4_1B02);
    }
}
