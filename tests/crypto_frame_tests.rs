//! End-to-end tests for the encrypted paths: TPL security modes 5 and 7,
//! ELL AES-CTR, AFL MAC verification and the simulation shortcut.

use wmbus_rs::util::crc16_en13757;
use wmbus_rs::wmbus::crypto::{
    aes_cbc_encrypt_in_place, aes_cmac, aes_ctr_in_place, derive_session_keys, ell_ctr_iv,
    tpl_cbc_iv,
};
use wmbus_rs::wmbus::{MeterKeys, ParseOutcome, SignatureCache, Telegram};

const KEY: [u8; 16] = [
    0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE,
    0xFF,
];

const MFCT: [u8; 2] = [0x2D, 0x2C]; // KAM
const ID: [u8; 4] = [0x78, 0x56, 0x34, 0x12];
const VERSION: u8 = 0x30;
const DEV_TYPE: u8 = 0x03;

fn dll(body: &[u8]) -> Vec<u8> {
    let mut frame = vec![(body.len() + 9) as u8, 0x44];
    frame.extend_from_slice(&MFCT);
    frame.extend_from_slice(&ID);
    frame.push(VERSION);
    frame.push(DEV_TYPE);
    frame.extend_from_slice(body);
    frame
}

/// One encrypted block: sentinel + energy + power + trailing pad.
const PLAIN_BLOCK: [u8; 16] = [
    0x2F, 0x2F, 0x04, 0x04, 0x39, 0x30, 0x00, 0x00, 0x04, 0x2B, 0x1A, 0x00, 0x00, 0x00, 0x2F,
    0x2F,
];

fn mode5_frame(key: &[u8; 16], acc: u8) -> Vec<u8> {
    let mut block = PLAIN_BLOCK;
    let iv = tpl_cbc_iv(MFCT, ID, VERSION, DEV_TYPE, acc);
    aes_cbc_encrypt_in_place(key, &iv, &mut block).unwrap();

    // Short TPL header, security mode 5 in the configuration word.
    let mut body = vec![0x7A, acc, 0x00, 0x00, 0x05];
    body.extend_from_slice(&block);
    dll(&body)
}

#[test]
fn test_mode5_decryption_round_trip() {
    let cache = SignatureCache::new();
    let frame = mode5_frame(&KEY, 0x42);
    let t = Telegram::parse(&frame, &MeterKeys::with_key(KEY), &cache);

    assert_eq!(t.outcome, ParseOutcome::Ok);
    assert_eq!(t.records.len(), 2);
    assert!((t.extract_double("0404").unwrap() - 123.45).abs() < 1e-9);
    assert!((t.extract_double("042B").unwrap() - 0.026).abs() < 1e-12);

    // The frame buffer holds plaintext at the payload offsets.
    assert_eq!(&t.frame()[t.frame().len() - 16..], &PLAIN_BLOCK);
}

#[test]
fn test_mode5_wrong_key() {
    let cache = SignatureCache::new();
    let frame = mode5_frame(&KEY, 0x42);

    let mut bad_key = KEY;
    bad_key[7] ^= 0x01;
    let t = Telegram::parse(&frame, &MeterKeys::with_key(bad_key), &cache);

    assert_eq!(t.outcome, ParseOutcome::WrongKey);
    assert!(t.records.is_empty());
    // The trail stops at the sentinel offset: nothing after the TPL
    // config word is explained.
    let last = t.explanations.iter().map(|e| e.offset + e.len).max().unwrap();
    assert_eq!(last, frame.len() - 16);
}

#[test]
fn test_mode5_missing_key() {
    let cache = SignatureCache::new();
    let frame = mode5_frame(&KEY, 0x42);
    let t = Telegram::parse(&frame, &MeterKeys::none(), &cache);
    assert_eq!(t.outcome, ParseOutcome::WrongKey);
}

#[test]
fn test_simulation_accepts_plaintext_payload() {
    // Same frame shape, but the "encrypted" region is already plaintext
    // and no key is supplied: replay-fixture mode.
    let mut body = vec![0x7A, 0x42, 0x00, 0x00, 0x05];
    body.extend_from_slice(&PLAIN_BLOCK);
    let frame = dll(&body);

    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame, &MeterKeys::simulation(), &cache);
    assert_eq!(t.outcome, ParseOutcome::Ok);
    assert_eq!(t.records.len(), 2);
}

// ---------------------------------------------------------------------
// Security mode 7 with AFL
// ---------------------------------------------------------------------

const COUNTER: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Builds a mode-7 frame: AFL (mcl + counter + CMAC) followed by a short
/// TPL whose payload is encrypted with the derived Kenc.
fn mode7_frame(key: &[u8; 16], auth_type: u8) -> Vec<u8> {
    let (kenc, kmac) = derive_session_keys(key, &COUNTER, &ID);

    let mut block = PLAIN_BLOCK;
    aes_cbc_encrypt_in_place(&kenc, &[0u8; 16], &mut block).unwrap();

    // cfg: security mode 7, one encrypted block; cfg-ext selects KDF 1.
    let mut tpl = vec![0x7A, 0x00, 0x00, 0x10, 0x07, 0x10];
    tpl.extend_from_slice(&block);

    let mcl = 0x20 | auth_type;
    let mut mac_input = vec![mcl];
    mac_input.extend_from_slice(&COUNTER);
    mac_input.extend_from_slice(&tpl);
    let mac_len = match auth_type {
        3 => 2,
        4 => 4,
        5 => 8,
        6 => 12,
        _ => 16,
    };
    let mac = aes_cmac(&kmac, &mac_input)[..mac_len].to_vec();

    // AFL: fc = control + counter + mac present, fragment id 0.
    let afl_len = (3 + 4 + mac_len) as u8;
    let mut body = vec![0x90, afl_len, 0x00, 0x2E, mcl];
    body.extend_from_slice(&COUNTER);
    body.extend_from_slice(&mac);
    body.extend_from_slice(&tpl);
    dll(&body)
}

#[test]
fn test_mode7_full_chain() {
    let cache = SignatureCache::new();
    let frame = mode7_frame(&KEY, 5);
    let t = Telegram::parse(&frame, &MeterKeys::with_key(KEY), &cache);

    assert_eq!(t.outcome, ParseOutcome::Ok);
    assert_eq!(t.records.len(), 2);
    assert!((t.extract_double("0404").unwrap() - 123.45).abs() < 1e-9);

    let afl = t.afl.as_ref().unwrap();
    assert_eq!(afl.counter, Some(1));
    assert_eq!(afl.mac.len(), 8);

    let tpl = t.tpl.as_ref().unwrap();
    assert_eq!(tpl.num_encrypted_blocks, 1);
    assert_eq!(tpl.kdf_selection, 1);
}

#[test]
fn test_mode7_mac_lengths() {
    // Both the shortest and the longest declared MAC lengths verify via
    // prefix comparison.
    for auth_type in [3u8, 7u8] {
        let cache = SignatureCache::new();
        let frame = mode7_frame(&KEY, auth_type);
        let t = Telegram::parse(&frame, &MeterKeys::with_key(KEY), &cache);
        assert_eq!(t.outcome, ParseOutcome::Ok, "auth type {auth_type}");
    }
}

#[test]
fn test_mode7_flipped_mac_byte() {
    let cache = SignatureCache::new();
    let mut frame = mode7_frame(&KEY, 5);
    // The MAC starts after DLL(10) + afl ci/len/fc/mcl(5) + counter(4).
    frame[19] ^= 0x80;
    let t = Telegram::parse(&frame, &MeterKeys::with_key(KEY), &cache);
    assert_eq!(t.outcome, ParseOutcome::BadMac);
    assert!(t.records.is_empty());
}

#[test]
fn test_mode7_flipped_payload_byte() {
    let cache = SignatureCache::new();
    let mut frame = mode7_frame(&KEY, 5);
    // Any bit flip in the MAC-covered range must also fail; decryption
    // is never attempted.
    let last = frame.len() - 1;
    frame[last] ^= 0x01;
    let t = Telegram::parse(&frame, &MeterKeys::with_key(KEY), &cache);
    assert_eq!(t.outcome, ParseOutcome::BadMac);
}

#[test]
fn test_mode7_simulation_without_key() {
    // Plaintext payload, full AFL/TPL framing, no key: accepted.
    let mut tpl = vec![0x7A, 0x00, 0x00, 0x10, 0x07, 0x10];
    tpl.extend_from_slice(&PLAIN_BLOCK);
    let mut body = vec![0x90, 0x0F, 0x00, 0x2E, 0x25];
    body.extend_from_slice(&COUNTER);
    body.extend_from_slice(&[0u8; 8]); // placeholder mac
    body.extend_from_slice(&tpl);
    let frame = dll(&body);

    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame, &MeterKeys::simulation(), &cache);
    assert_eq!(t.outcome, ParseOutcome::Ok);
    assert_eq!(t.records.len(), 2);
}

// ---------------------------------------------------------------------
// ELL AES-CTR
// ---------------------------------------------------------------------

fn ell_ctr_frame(key: &[u8; 16]) -> Vec<u8> {
    let cc = 0x20;
    let acc = 0x01;
    // Security mode 1 (AES-CTR) in the top 3 bits of the session number.
    let sn: u32 = 1 << 29;
    let sn_bytes = sn.to_le_bytes();

    // Plaintext: TPL with no header and one energy record.
    let payload = [0x78, 0x04, 0x04, 0x39, 0x30, 0x00, 0x00];
    let crc = crc16_en13757(&payload);

    let mut region = Vec::new();
    region.extend_from_slice(&crc.to_le_bytes());
    region.extend_from_slice(&payload);

    let iv = ell_ctr_iv(MFCT, ID, VERSION, DEV_TYPE, cc, sn_bytes);
    aes_ctr_in_place(key, &iv, &mut region);

    let mut body = vec![0x8D, cc, acc];
    body.extend_from_slice(&sn_bytes);
    body.extend_from_slice(&region);
    dll(&body)
}

#[test]
fn test_ell_ctr_decryption() {
    let cache = SignatureCache::new();
    let frame = ell_ctr_frame(&KEY);
    let t = Telegram::parse(&frame, &MeterKeys::with_key(KEY), &cache);

    assert_eq!(t.outcome, ParseOutcome::Ok);
    let ell = t.ell.as_ref().unwrap();
    assert_eq!(ell.ci, 0x8D);
    assert!((t.extract_double("0404").unwrap() - 123.45).abs() < 1e-9);
}

#[test]
fn test_ell_ctr_corrupted_payload() {
    let cache = SignatureCache::new();
    let mut frame = ell_ctr_frame(&KEY);
    let last = frame.len() - 1;
    frame[last] ^= 0x10;
    let t = Telegram::parse(&frame, &MeterKeys::with_key(KEY), &cache);
    assert_eq!(t.outcome, ParseOutcome::BadCrc);
    assert!(t.records.is_empty());
}

#[test]
fn test_ell_ctr_wrong_key_fails_crc() {
    let cache = SignatureCache::new();
    let frame = ell_ctr_frame(&KEY);
    let mut bad_key = KEY;
    bad_key[0] ^= 0x01;
    let t = Telegram::parse(&frame, &MeterKeys::with_key(bad_key), &cache);
    assert_eq!(t.outcome, ParseOutcome::BadCrc);
}
