//! Golden-frame tests for the plaintext parsing paths: layer chain,
//! record extraction, queries, explanation coverage and failure
//! outcomes.

use wmbus_rs::wmbus::{MeterKeys, ParseOutcome, SignatureCache, Telegram};

fn hex_to_bytes(hex: &str) -> Vec<u8> {
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).unwrap())
        .collect()
}

/// Builds a frame from the bytes after the L field, prepending L.
fn frame_from(body_hex: &str) -> Vec<u8> {
    let body = hex_to_bytes(body_hex);
    let mut frame = vec![body.len() as u8];
    frame.extend_from_slice(&body);
    frame
}

/// Every byte of a successfully parsed frame is explained exactly once.
fn assert_full_coverage(t: &Telegram) {
    let mut ranges: Vec<(usize, usize)> = t
        .explanations
        .iter()
        .map(|e| (e.offset, e.len))
        .collect();
    ranges.sort();
    let mut pos = 0;
    for (offset, len) in ranges {
        assert_eq!(offset, pos, "explanation gap/overlap at offset {pos}");
        pos += len;
    }
    assert_eq!(pos, t.frame().len(), "explanation does not reach frame end");
}

// DLL(44, KAM, id 12345678, v 0x30, electricity) + TPL long header with
// no security + padded DV stream: energy 10^1 Wh = 12345, power W = 26.
const PLAIN_LONG_BODY: &str =
    "442d2c78563412300372785634122d2c300300000000002f2f040439300000042b1a000000";

#[test]
fn test_plain_long_tpl_energy_and_power() {
    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame_from(PLAIN_LONG_BODY), &MeterKeys::none(), &cache);

    assert_eq!(t.outcome, ParseOutcome::Ok);
    assert_eq!(t.dll.c_field, 0x44);
    assert_eq!(t.dll.manufacturer(), "KAM (Kamstrup)");
    assert_eq!(t.dll.id_display(), "12345678");
    assert_eq!(t.dll.version, 0x30);
    assert_eq!(t.dll.device_type, 0x03);

    let tpl = t.tpl.as_ref().unwrap();
    assert_eq!(tpl.ci, 0x72);
    assert_eq!(tpl.id_bytes, Some([0x78, 0x56, 0x34, 0x12]));

    assert_eq!(t.records.len(), 2);
    let energy = t.find_record("0404").unwrap();
    assert_eq!(energy.semantic_key, "energy");
    assert!((energy.scaled.unwrap() - 123.45).abs() < 1e-9);

    let power = t.find_record("042B").unwrap();
    assert_eq!(power.semantic_key, "power");
    assert!((power.scaled.unwrap() - 0.026).abs() < 1e-12);

    assert_full_coverage(&t);
}

#[test]
fn test_prefix_matching() {
    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame_from(PLAIN_LONG_BODY), &MeterKeys::none(), &cache);

    // "04" matches any 32-bit integer record; first wins.
    assert_eq!(t.find_record("04").unwrap().dv_key, "0404");
    // Lowercase patterns are accepted.
    assert_eq!(t.find_record("042b").unwrap().dv_key, "042B");
    assert!(t.find_record("0413").is_none());
}

#[test]
fn test_omnipower_record_shape() {
    // A+/A-/P+/P- as the Kamstrup OmniPower broadcasts them:
    // 0404 energy, 04843C backward energy, 042B power, 04AB3C backward
    // power (all 32-bit, 10 Wh / 10 Wh / 1 W / 1 W).
    let body = concat!(
        "442d2c78563412300378",
        "0404e8030000",
        "04843c64000000",
        "042b1a000000",
        "04ab3c0d000000",
    );
    let cache = SignatureCache::new();
    let mut t = Telegram::parse(&frame_from(body), &MeterKeys::none(), &cache);

    assert_eq!(t.outcome, ParseOutcome::Ok);
    let keys: Vec<&str> = t.records.iter().map(|r| r.dv_key.as_str()).collect();
    assert_eq!(keys, vec!["0404", "04843C", "042B", "04AB3C"]);

    // Backward energy in kWh via the query shortcut.
    let backward = t.extract_double("04843C").unwrap();
    assert!((backward - 1.0).abs() < 1e-9); // 100 * 0.01 kWh

    let forward = t.extract_double("0404").unwrap();
    assert!((forward - 10.0).abs() < 1e-9); // 1000 * 0.01 kWh

    assert_eq!(
        t.find_record("04843C").unwrap().modifiers,
        vec!["backward flow".to_string()]
    );

    // Meter modules enrich the explanation at the record offset.
    let offset = t.find_record("0404").unwrap().offset;
    t.add_more_explanation(offset, "(10 kwh)");
    assert!(t.explain().contains("(10 kwh)"));

    // A second enrichment at the same offset replaces the first.
    t.add_more_explanation(offset, "(10.0 kwh)");
    let rendered = t.explain();
    assert!(rendered.contains("(10.0 kwh)"));
    assert!(!rendered.contains("(10 kwh)\n"));

    assert_full_coverage(&t);
}

#[test]
fn test_truncated_frame() {
    let cache = SignatureCache::new();
    // L field larger than the actual frame.
    let mut frame = frame_from(PLAIN_LONG_BODY);
    frame[0] += 10;
    let t = Telegram::parse(&frame, &MeterKeys::none(), &cache);
    assert_eq!(t.outcome, ParseOutcome::Truncated);
    assert!(t.records.is_empty());

    let t = Telegram::parse(&[0x05, 0x44, 0x2d], &MeterKeys::none(), &cache);
    assert_eq!(t.outcome, ParseOutcome::Truncated);
}

#[test]
fn test_unknown_tpl_ci() {
    // CI 0x55 is not a layer this decoder dispatches on.
    let body = "442d2c78563412300355aabb";
    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame_from(body), &MeterKeys::none(), &cache);
    assert_eq!(t.outcome, ParseOutcome::UnknownCi(0x55));
    // The DLL part survives for diagnostics.
    assert_eq!(t.dll.id_display(), "12345678");
}

#[test]
fn test_nwl_ci_is_surfaced() {
    let body = "442d2c78563412300381aabbcc";
    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame_from(body), &MeterKeys::none(), &cache);
    assert_eq!(t.outcome, ParseOutcome::UnknownCi(0x81));
}

#[test]
fn test_mfct_specific_tpl() {
    let body = "442d2c785634123003a2deadbeef";
    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame_from(body), &MeterKeys::none(), &cache);
    assert_eq!(t.outcome, ParseOutcome::Ok);
    assert!(t.records.is_empty());
    assert_eq!(t.extract_payload(), &hex_to_bytes("deadbeef")[..]);
    assert_full_coverage(&t);
}

#[test]
fn test_malformed_dv_keeps_prefix() {
    // Second record data cut short.
    let body = "442d2c78563412300378040439300000042b1a";
    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame_from(body), &MeterKeys::none(), &cache);
    assert_eq!(t.outcome, ParseOutcome::MalformedDv);
    assert_eq!(t.records.len(), 1);
    assert_eq!(t.records[0].dv_key, "0404");
}

#[test]
fn test_dv_stream_ending_on_boundary() {
    let body = "442d2c785634123003780404393000002f";
    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame_from(body), &MeterKeys::none(), &cache);
    assert_eq!(t.outcome, ParseOutcome::Ok);
    assert_eq!(t.records.len(), 1);
    assert_full_coverage(&t);
}

#[test]
fn test_serde_record_export() {
    let cache = SignatureCache::new();
    let t = Telegram::parse(&frame_from(PLAIN_LONG_BODY), &MeterKeys::none(), &cache);
    let json = serde_json::to_value(&t.records).unwrap();
    assert_eq!(json[0]["dv_key"], "0404");
    assert_eq!(json[0]["semantic_key"], "energy");
    assert_eq!(json[0]["unit"], "kWh");
}
