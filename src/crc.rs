//! CRC-32 checksum
//!
//! FFV1 version 3 protects the configuration record and, when error
//! correction is enabled, each slice with a CRC-32 parity (MPEG-2
//! polynomial, initial register 0). The checked data includes the stored
//! CRC, so a valid buffer hashes to zero.

/// CRC-32 polynomial (MSB-first, not reflected)
const POLY: u32 = 0x04C1_1DB7;

/// Compute the CRC-32 of a buffer.
///
/// Initial value 0, no reflection, no final xor.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0;

    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            if (crc & 0x8000_0000) != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
