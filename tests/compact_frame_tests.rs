//! Compact frame (CI 0x79) replay: format-signature learning from long
//! frames, cache misses, and the prewired bootstrap signatures.

use wmbus_rs::util::crc16_en13757;
use wmbus_rs::wmbus::{MeterKeys, ParseOutcome, SignatureCache, Telegram};

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}

fn frame_from(body_hex: &str) -> Vec<u8> {
    let body = hex_to_bytes(body_hex);
    let mut frame = vec![body.len() as u8];
    frame.extend_from_slice(&body);
    frame
}

fn compact_frame(signature: u16, data_hex: &str) -> Vec<u8> {
    let data = hex_to_bytes(data_hex);
    let mut body = hex_to_bytes("442d2c78563412300379");
    body.extend_from_slice(&signature.to_le_bytes());
    body.extend_from_slice(&crc16_en13757(&data).to_le_bytes());
    body.extend_from_slice(&data);
    let mut frame = vec![body.len() as u8];
    frame.extend_from_slice(&body);
    frame
}

// Long frame (short TPL, no security) with records 0404 and 042B.
const LONG_BODY: &str = "442d2c7856341230037a00000000040439300000042b1a000000";
const FORMAT: &str = "0404042b";

#[test]
fn test_long_frame_populates_cache() {
    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame_from(LONG_BODY), &MeterKeys::none(), &cache);

    assert_eq!(t.outcome, ParseOutcome::Ok);
    let sig = crc16_en13757(&hex_to_bytes(FORMAT));
    assert_eq!(t.format_signature, Some(sig));
    assert_eq!(cache.lookup(sig), Some(hex_to_bytes(FORMAT)));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_compact_replay_after_long_twin() {
    let cache = SignatureCache::new();
    let long = Telegram::parse(&frame_from(LONG_BODY), &MeterKeys::none(), &cache);
    assert_eq!(long.outcome, ParseOutcome::Ok);

    let sig = long.format_signature.unwrap();
    let compact = Telegram::parse(
        &compact_frame(sig, "393000001a000000"),
        &MeterKeys::none(),
        &cache,
    );

    assert_eq!(compact.outcome, ParseOutcome::Ok);
    assert_eq!(compact.format_signature, Some(sig));

    // Same record key-set in the same order as the long twin.
    let long_keys: Vec<&str> = long.records.iter().map(|r| r.dv_key.as_str()).collect();
    let compact_keys: Vec<&str> = compact.records.iter().map(|r| r.dv_key.as_str()).collect();
    assert_eq!(long_keys, compact_keys);

    assert!((compact.extract_double("0404").unwrap() - 123.45).abs() < 1e-9);
    assert!((compact.extract_double("042B").unwrap() - 0.026).abs() < 1e-12);
}

#[test]
fn test_unknown_signature_is_informational() {
    let cache = SignatureCache::new();
    let t = Telegram::parse(
        &compact_frame(0xBEEF, "393000001a000000"),
        &MeterKeys::none(),
        &cache,
    );

    assert_eq!(t.outcome, ParseOutcome::UnknownFormat(0xBEEF));
    assert!(t.records.is_empty());
    // The cache stays unchanged; a later long frame may still teach us.
    assert!(cache.is_empty());
}

#[test]
fn test_prewired_signature_dd34() {
    // 0xDD34 maps to 02FF2004134413: a mfct-specific u16, a volume in
    // litres and a storage-1 volume in litres.
    let cache = SignatureCache::new();
    let t = Telegram::parse(
        &compact_frame(0xDD34, "11113930000078563412"),
        &MeterKeys::none(),
        &cache,
    );

    assert_eq!(t.outcome, ParseOutcome::Ok);
    let keys: Vec<&str> = t.records.iter().map(|r| r.dv_key.as_str()).collect();
    assert_eq!(keys, vec!["02FF20", "0413", "4413"]);

    assert!((t.extract_double("0413").unwrap() - 12.345).abs() < 1e-9);
    assert_eq!(t.find_record("4413").unwrap().storage_nr, 1);
    assert_eq!(t.find_record("0413").unwrap().semantic_key, "volume");
}

#[test]
fn test_learned_signature_survives_for_other_meters() {
    // The cache is shared across telegrams: a second compact frame from
    // a different device id replays the same format.
    let cache = SignatureCache::new();
    Telegram::parse(&frame_from(LONG_BODY), &MeterKeys::none(), &cache);
    let sig = crc16_en13757(&hex_to_bytes(FORMAT));

    // The cache lookup keys on the signature only, not the sender.
    let compact = Telegram::parse(
        &compact_frame(sig, "e80300000d000000"),
        &MeterKeys::none(),
        &cache,
    );
    assert_eq!(compact.outcome, ParseOutcome::Ok);
    assert_eq!(compact.records.len(), 2);
    assert!((compact.extract_double("0404").unwrap() - 10.0).abs() < 1e-9);
}
