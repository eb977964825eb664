//! # wM-Bus Crypto Primitives
//!
//! AES-128 operations for the ELL and TPL security modes per OMS 7.2.4:
//! CTR mode for ELL session encryption, CBC (with and without IV) for TPL
//! security modes 5 and 7, AES-CMAC (NIST SP 800-38B) for the AFL MAC,
//! and the CMAC-based key derivation function for the ephemeral session
//! keys.
//!
//! Decryption happens in place inside the frame buffer so later layers
//! read plaintext at unchanged offsets. Encryption counterparts exist for
//! the round-trip tests.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use thiserror::Error;

/// Errors from the cryptographic primitives
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CryptoError {
    #[error("Invalid key length: expected 16, got {0}")]
    InvalidKeyLength(usize),

    #[error("Invalid data length: must be a multiple of 16, got {0}")]
    InvalidDataLength(usize),
}

/// Derivation constants for the OMS KDF (selector 1).
const KDF_DC_ENCRYPTION: u8 = 0x00;
const KDF_DC_MAC: u8 = 0x01;

/// AES-128 CTR processing in place (encryption and decryption are the
/// same operation).
///
/// The block counter is the last byte of the initial counter block and is
/// incremented once per 16-byte block, as the ELL defines it.
pub fn aes_ctr_in_place(key: &[u8; 16], iv: &[u8; 16], data: &mut [u8]) {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut counter = *iv;

    for chunk in data.chunks_mut(16) {
        let mut keystream = GenericArray::clone_from_slice(&counter);
        cipher.encrypt_block(&mut keystream);
        for (byte, ks) in chunk.iter_mut().zip(keystream.iter()) {
            *byte ^= ks;
        }
        counter[15] = counter[15].wrapping_add(1);
    }
}

/// AES-128 CBC decryption in place. `data` must be a whole number of
/// blocks; callers floor the range themselves so trailing unencrypted
/// bytes stay untouched.
pub fn aes_cbc_decrypt_in_place(
    key: &[u8; 16],
    iv: &[u8; 16],
    data: &mut [u8],
) -> Result<(), CryptoError> {
    if data.len() % 16 != 0 {
        return Err(CryptoError::InvalidDataLength(data.len()));
    }

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut prev = *iv;

    for chunk in data.chunks_mut(16) {
        let mut block = [0u8; 16];
        block.copy_from_slice(chunk);

        let mut decrypted = GenericArray::clone_from_slice(chunk);
        cipher.decrypt_block(&mut decrypted);

        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = decrypted[i] ^ prev[i];
        }
        prev = block;
    }

    Ok(())
}

/// AES-128 CBC encryption in place, the inverse of
/// [`aes_cbc_decrypt_in_place`].
pub fn aes_cbc_encrypt_in_place(
    key: &[u8; 16],
    iv: &[u8; 16],
    data: &mut [u8],
) -> Result<(), CryptoError> {
    if data.len() % 16 != 0 {
        return Err(CryptoError::InvalidDataLength(data.len()));
    }

    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut prev = *iv;

    for chunk in data.chunks_mut(16) {
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte ^= prev[i];
        }
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.encrypt_block(&mut block);
        chunk.copy_from_slice(&block);
        prev.copy_from_slice(chunk);
    }

    Ok(())
}

/// AES-CMAC over arbitrary-length input (NIST SP 800-38B).
pub fn aes_cmac(key: &[u8; 16], data: &[u8]) -> [u8; 16] {
    let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key)
        .expect("AES-CMAC accepts any 16-byte key");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

fn kdf(key: &[u8; 16], dc: u8, counter: &[u8; 4], id: &[u8; 4]) -> [u8; 16] {
    let mut input = [0u8; 16];
    input[0] = dc;
    input[1..5].copy_from_slice(counter);
    input[5..9].copy_from_slice(id);
    input[9..16].fill(0x07);
    aes_cmac(key, &input)
}

/// Derives the ephemeral session keys `(Kenc, Kmac)` from the persistent
/// confidentiality key (OMS KDF, selector 1 "CMAC-based").
///
/// `counter` is the AFL message counter and `id` the TPL id if present,
/// else the DLL id — both in wire byte order.
pub fn derive_session_keys(
    key: &[u8; 16],
    counter: &[u8; 4],
    id: &[u8; 4],
) -> ([u8; 16], [u8; 16]) {
    let kenc = kdf(key, KDF_DC_ENCRYPTION, counter, id);
    let kmac = kdf(key, KDF_DC_MAC, counter, id);
    (kenc, kmac)
}

/// Builds the ELL CTR counter block:
/// `{mfct(2) ‖ id(4) ‖ version ‖ type ‖ CC ‖ SN(4) ‖ FN(2)=0 ‖ BC=0}`,
/// all address fields in wire byte order.
pub fn ell_ctr_iv(
    mfct: [u8; 2],
    id: [u8; 4],
    version: u8,
    device_type: u8,
    cc: u8,
    sn: [u8; 4],
) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[0..2].copy_from_slice(&mfct);
    iv[2..6].copy_from_slice(&id);
    iv[6] = version;
    iv[7] = device_type;
    iv[8] = cc;
    iv[9..13].copy_from_slice(&sn);
    // FN (2 bytes) and BC stay zero.
    iv
}

/// Builds the TPL CBC IV for security mode 5:
/// `{mfct(2) ‖ id(4) ‖ version ‖ type ‖ acc × 8}`.
pub fn tpl_cbc_iv(mfct: [u8; 2], id: [u8; 4], version: u8, device_type: u8, acc: u8) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[0..2].copy_from_slice(&mfct);
    iv[2..6].copy_from_slice(&id);
    iv[6] = version;
    iv[7] = device_type;
    iv[8..16].fill(acc);
    iv
}
