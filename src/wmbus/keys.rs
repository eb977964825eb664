//! # Meter Keys
//!
//! The key material a caller supplies per meter. The confidentiality key
//! is zeroized when the value is dropped.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Key input for one parse: an optional 128-bit confidentiality key and
/// the simulation flag.
///
/// In simulation mode (replay fixtures) encrypted payloads are assumed to
/// already be plaintext when no key is present, and are accepted without
/// decryption.
#[derive(Debug, Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct MeterKeys {
    pub confidentiality_key: Option<[u8; 16]>,
    #[zeroize(skip)]
    pub is_simulation: bool,
}

impl MeterKeys {
    /// No key, live mode. Encrypted telegrams will fail with
    /// `MissingKey`/`WrongKey` outcomes.
    pub fn none() -> Self {
        MeterKeys {
            confidentiality_key: None,
            is_simulation: false,
        }
    }

    /// A confidentiality key for live decryption.
    pub fn with_key(key: [u8; 16]) -> Self {
        MeterKeys {
            confidentiality_key: Some(key),
            is_simulation: false,
        }
    }

    /// Simulation/replay mode without a key: sentinel bytes are assumed
    /// to already be plaintext.
    pub fn simulation() -> Self {
        MeterKeys {
            confidentiality_key: None,
            is_simulation: true,
        }
    }

    pub fn has_key(&self) -> bool {
        self.confidentiality_key.is_some()
    }
}

impl Default for MeterKeys {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert!(!MeterKeys::none().has_key());
        assert!(!MeterKeys::none().is_simulation);
        assert!(MeterKeys::with_key([7; 16]).has_key());
        assert!(MeterKeys::simulation().is_simulation);
        assert!(!MeterKeys::simulation().has_key());
    }
}
