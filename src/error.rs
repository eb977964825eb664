//! # wM-Bus Error Handling
//!
//! This module defines the WMBusError enum, which represents the different
//! error types that can occur while decoding a telegram. Protocol-level
//! failures are additionally captured on the [`Telegram`](crate::Telegram)
//! as a [`ParseOutcome`](crate::ParseOutcome) so diagnostics (explanation
//! trail, partial records) survive the failure.

use thiserror::Error;

/// Represents the different error types that can occur in the wM-Bus crate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WMBusError {
    /// The parser ran past the end of the frame.
    #[error("Telegram truncated at offset {offset}")]
    Truncated { offset: usize },

    /// The ELL payload CRC did not match the stored CRC.
    #[error("Payload CRC mismatch at offset {offset}: stored {stored:04X}, calculated {calculated:04X}")]
    BadCrc {
        stored: u16,
        calculated: u16,
        offset: usize,
    },

    /// The AFL CMAC did not prefix-match the stored MAC.
    #[error("AFL MAC verification failed")]
    BadMac,

    /// Decryption produced data without the 0x2F 0x2F sentinel bytes.
    #[error("Decrypted payload failed the 2F 2F check at offset {offset}: wrong key?")]
    WrongKey { offset: usize },

    /// An encrypted telegram arrived but no confidentiality key is known.
    #[error("No decryption key available for encrypted telegram")]
    MissingKey,

    /// An unsupported CI field was found at a known slot.
    #[error("Unknown CI field 0x{0:02X}")]
    UnknownCi(u8),

    /// A compact frame referenced a format signature not yet in the
    /// cache. Informational, not a defect: a future long frame with the
    /// same format populates the entry.
    #[error("Compact frame format signature 0x{0:04X} not yet known")]
    UnknownFormat(u16),

    /// The DV record stream is inconsistent; records parsed before the
    /// inconsistency remain valid.
    #[error("Malformed DV stream at offset {offset}: {reason}")]
    MalformedDv { offset: usize, reason: String },

    /// A bad AFL MAC length was declared (must be 2, 4, 8, 12 or 16).
    #[error("Bad AFL MAC length {0}")]
    BadMacLength(usize),

    /// Indicates an invalid manufacturer triplet.
    #[error("Invalid manufacturer code")]
    InvalidManufacturer,

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string: {0}")]
    InvalidHexString(#[from] crate::util::hex::HexError),

    /// A cryptographic primitive failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::wmbus::crypto::CryptoError),
}
