//! # Frame Checksums
//!
//! CRC-16 as used by EN 13757 (ELL payload CRC and compact-frame format
//! signatures) plus the xor checksum used by dongle serial framing.

/// wM-Bus CRC polynomial as specified in EN 13757-4
const CRC_POLY: u16 = 0x3D65;

/// Calculate the EN 13757 CRC-16 over a byte slice.
///
/// Polynomial 0x3D65, init 0x0000, no reflection, no final xor. The link
/// layer's over-the-air CRC additionally complements this value, but the
/// ELL payload CRC and the compact-frame format signature use it raw.
pub fn crc16_en13757(data: &[u8]) -> u16 {
    let mut crc = 0u16;

    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// Simple xor checksum over a byte range, used by dongle serial framing.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        // CRC-16/EN-13757 catalogue check value for "123456789" is 0xC2B7
        // after the final complement; raw (no final xor) it is 0x3D48.
        assert_eq!(crc16_en13757(b"123456789"), 0x3D48);
        assert_eq!(!crc16_en13757(b"123456789"), 0xC2B7);
    }

    #[test]
    fn test_crc16_empty() {
        assert_eq!(crc16_en13757(&[]), 0);
    }

    #[test]
    fn test_crc16_detects_bit_flip() {
        let a = crc16_en13757(&[0x2F, 0x2F, 0x04, 0x04]);
        let b = crc16_en13757(&[0x2F, 0x2F, 0x04, 0x05]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_xor_checksum() {
        assert_eq!(xor_checksum(&[]), 0);
        assert_eq!(xor_checksum(&[0xFF, 0xFF]), 0);
        assert_eq!(xor_checksum(&[0x12, 0x34, 0x56]), 0x12 ^ 0x34 ^ 0x56);
    }
}
