//! # Utility Modules
//!
//! Common helpers used throughout the wmbus-rs crate: hex encoding and
//! decoding plus the EN 13757 checksums.

pub mod checksum;
pub mod hex;

// Re-export commonly used types and functions
pub use checksum::{crc16_en13757, xor_checksum};
pub use hex::{decode_hex, encode_hex, encode_hex_upper, format_hex_compact, hex_to_bytes};
