//! # DV Stream Walker
//!
//! Walks the (decrypted) application payload and assembles typed records
//! from the DIB/VIB stream. Two modes: the normal mode reads record
//! headers and data from the frame; the compact mode reads headers from a
//! cached format template while data bytes come from the frame.

use crate::constants::*;
use crate::error::WMBusError;
use crate::payload::data_encoding::{
    decode_bcd, decode_f32_le, decode_le_uint, decode_reversed_string, decode_type_f_datetime,
    decode_type_g_date,
};
use crate::payload::record::{
    dif_data_length, parse_record_header, DvRecord, DvValue, MeasurementType, RecordHeader,
};
use crate::payload::vif::{is_date_vif, lookup_primary_vif, Unit};
use crate::payload::vif_maps::{combinable_vife_name, lookup_vife_fb, lookup_vife_fd};
use crate::util::encode_hex;
use log::debug;

/// Output of one DV stream walk.
#[derive(Debug, Default)]
pub struct DvParse {
    pub records: Vec<DvRecord>,
    /// `(offset, len, text)` annotations for the explanation trail.
    /// Compact mode only annotates data bytes (the headers are not in the
    /// frame).
    pub annotations: Vec<(usize, usize, String)>,
    /// Concatenated DRH bytes of all records, in order. Hashing these
    /// with the EN 13757 CRC yields the compact-frame format signature.
    pub format_bytes: Vec<u8>,
    /// First inconsistency found, if any; records parsed before it remain
    /// valid.
    pub error: Option<WMBusError>,
}

/// Walks the DV stream of `frame` starting at `start`.
///
/// With `format` present the record headers are taken from the template
/// (compact frame replay) and only the data bytes are consumed from the
/// frame.
pub fn parse_dv_stream(frame: &[u8], start: usize, format: Option<&[u8]>) -> DvParse {
    let mut out = DvParse::default();
    let mut pos = start;
    let mut fmt_pos = 0usize;

    debug!(
        "(dv) parsing {} payload bytes @{start}{}",
        frame.len().saturating_sub(start),
        if format.is_some() { " (compact)" } else { "" }
    );

    loop {
        // Locate the next record header, from the template or the frame.
        let header_src: &[u8] = match format {
            Some(fmt) => {
                if fmt_pos >= fmt.len() {
                    break;
                }
                &fmt[fmt_pos..]
            }
            None => {
                if pos >= frame.len() {
                    break;
                }
                &frame[pos..]
            }
        };

        let lead = header_src[0];

        if lead == DIF_IDLE_FILLER {
            // Pad byte, no record.
            match format {
                Some(_) => fmt_pos += 1,
                None => {
                    out.annotations
                        .push((pos, 1, format!("{lead:02x} skip/padding byte")));
                    pos += 1;
                }
            }
            continue;
        }

        if lead == DIF_MANUFACTURER_SPECIFIC || lead == DIF_MORE_RECORDS_FOLLOW {
            // Everything from here to the end of the frame belongs to the
            // manufacturer; emit one synthetic record and stop.
            let header_offset = pos;
            match format {
                Some(_) => fmt_pos += 1,
                None => pos += 1,
            }
            let rest = frame[pos..].to_vec();
            out.annotations.push((
                header_offset,
                (pos - header_offset) + rest.len(),
                format!(
                    "{lead:02x} manufacturer specific data {}({} bytes)",
                    if lead == DIF_MORE_RECORDS_FOLLOW {
                        "(more records follow) "
                    } else {
                        ""
                    },
                    rest.len()
                ),
            ));
            out.records.push(DvRecord {
                dv_key: format!("{lead:02X}"),
                semantic_key: "manufacturer_specific".to_string(),
                unit: Unit::None,
                value: DvValue::None,
                scaled: None,
                measurement_type: MeasurementType::Instantaneous,
                storage_nr: 0,
                tariff: 0,
                sub_unit: 0,
                modifiers: Vec::new(),
                raw: rest,
                offset: header_offset,
            });
            break;
        }

        if lead & DIF_MASK_DATA == 0x0F {
            // Reserved special-function DIF.
            out.error = Some(WMBusError::MalformedDv {
                offset: pos,
                reason: format!("reserved special-function dif 0x{lead:02x}"),
            });
            break;
        }

        // Parse the header.
        let (rest, header) = match parse_record_header(header_src) {
            Ok(v) => v,
            Err(_) => {
                out.error = Some(WMBusError::MalformedDv {
                    offset: pos,
                    reason: "truncated record header".to_string(),
                });
                break;
            }
        };
        let header_len = header_src.len() - rest.len();
        let header_offset = pos;

        match format {
            Some(_) => fmt_pos += header_len,
            None => {
                out.annotations.push((
                    pos,
                    header_len,
                    format!(
                        "{} record header ({})",
                        encode_hex(&header.raw),
                        describe_header(&header)
                    ),
                ));
                pos += header_len;
            }
        }
        out.format_bytes.extend_from_slice(&header.raw);

        // Resolve the data length; variable-length fields carry it in the
        // first data byte.
        let mut lvar: Option<u8> = None;
        let data_len = match dif_data_length(header.dib.dif) {
            Some(len) => len,
            None => {
                if pos >= frame.len() {
                    out.error = Some(WMBusError::MalformedDv {
                        offset: pos,
                        reason: "missing variable length byte".to_string(),
                    });
                    break;
                }
                let l = frame[pos];
                out.annotations
                    .push((pos, 1, format!("{l:02x} variable length")));
                pos += 1;
                lvar = Some(l);
                match l {
                    0x00..=0xBF => l as usize,
                    0xC0..=0xCF => (l - 0xC0) as usize,
                    0xD0..=0xDF => (l - 0xD0) as usize,
                    0xE0..=0xEF => (l - 0xE0) as usize,
                    _ => {
                        out.error = Some(WMBusError::MalformedDv {
                            offset: pos - 1,
                            reason: format!("reserved variable length code 0x{l:02x}"),
                        });
                        break;
                    }
                }
            }
        };

        if pos + data_len > frame.len() {
            out.error = Some(WMBusError::MalformedDv {
                offset: pos,
                reason: format!(
                    "record data needs {data_len} bytes, {} remain",
                    frame.len() - pos
                ),
            });
            break;
        }

        let raw = frame[pos..pos + data_len].to_vec();
        let data_offset = pos;
        pos += data_len;

        let record = build_record(
            &header,
            raw,
            lvar,
            if format.is_some() {
                data_offset
            } else {
                header_offset
            },
        );
        out.annotations.push((
            data_offset,
            data_len,
            format!(
                "{} record data ({})",
                encode_hex(&record.raw),
                record.dv_key
            ),
        ));
        out.records.push(record);
    }

    out
}

fn describe_header(header: &RecordHeader) -> String {
    let (semantic, _, _, _) = resolve_vib(header);
    semantic
}

/// Resolves the VIB into (semantic key, unit, scale, modifier names).
fn resolve_vib(header: &RecordHeader) -> (String, Unit, Option<f64>, Vec<String>) {
    let vif = header.vib.vif;
    let vifes = &header.vib.vifes;

    match vif {
        0xFB | 0xFD => {
            let Some((&first, combinable)) = vifes.split_first() else {
                return ("unknown".to_string(), Unit::None, None, Vec::new());
            };
            let resolved = if vif == 0xFD {
                lookup_vife_fd(first)
            } else {
                lookup_vife_fb(first)
            };
            let modifiers = combinable.iter().map(|&v| combinable_vife_name(v)).collect();
            (resolved.key.to_string(), resolved.unit, resolved.scale, modifiers)
        }
        _ if vif & 0x7F == VIF_STRING_FOLLOWS => {
            ("user_defined".to_string(), Unit::None, None, Vec::new())
        }
        _ if vif & 0x7F == 0x7F => {
            ("manufacturer_specific".to_string(), Unit::None, None, Vec::new())
        }
        _ => {
            let modifiers: Vec<String> =
                vifes.iter().map(|&v| combinable_vife_name(v)).collect();
            match lookup_primary_vif(vif) {
                Some(info) => (info.key.to_string(), info.unit, info.scale, modifiers),
                None => ("unknown".to_string(), Unit::None, None, modifiers),
            }
        }
    }
}

fn build_record(header: &RecordHeader, raw: Vec<u8>, lvar: Option<u8>, offset: usize) -> DvRecord {
    let (semantic_key, unit, scale, modifiers) = resolve_vib(header);

    let value = decode_value(header, &raw, lvar);

    let scaled = match (&value, scale) {
        (DvValue::Numeric(v), Some(s)) => Some(v * s),
        _ => None,
    };

    DvRecord {
        dv_key: header.dv_key(),
        semantic_key,
        unit,
        value,
        scaled,
        measurement_type: MeasurementType::from_dif(header.dib.dif),
        storage_nr: header.dib.storage_number(),
        tariff: header.dib.tariff(),
        sub_unit: header.dib.sub_unit(),
        modifiers,
        raw,
        offset,
    }
}

fn decode_value(header: &RecordHeader, raw: &[u8], lvar: Option<u8>) -> DvValue {
    // Date-typed VIFs decode to a date structure, never to a scaled number.
    if header.vib.vif & 0x80 == 0 && is_date_vif(header.vib.vif) {
        return match raw.len() {
            2 => decode_type_g_date(raw).map(DvValue::Date).unwrap_or(DvValue::None),
            4 => decode_type_f_datetime(raw)
                .map(DvValue::DateTime)
                .unwrap_or(DvValue::None),
            _ => DvValue::None,
        };
    }

    if let Some(l) = lvar {
        return match l {
            0x00..=0xBF => DvValue::Text(decode_reversed_string(raw)),
            0xC0..=0xCF => DvValue::Numeric(decode_bcd(raw)),
            0xD0..=0xDF => DvValue::Numeric(-decode_bcd(raw)),
            0xE0..=0xEF => {
                let reversed: Vec<u8> = raw.iter().rev().copied().collect();
                DvValue::Numeric(decode_bcd(&reversed))
            }
            _ => DvValue::None,
        };
    }

    match header.dib.dif & DIF_MASK_DATA {
        0x0 | 0x8 => DvValue::None,
        0x1 | 0x2 | 0x3 | 0x4 | 0x6 | 0x7 => DvValue::Numeric(decode_le_uint(raw) as f64),
        0x5 => decode_f32_le(raw)
            .map(|f| DvValue::Numeric(f as f64))
            .unwrap_or(DvValue::None),
        0x9 | 0xA | 0xB | 0xC | 0xE => DvValue::Numeric(decode_bcd(raw)),
        _ => DvValue::None,
    }
}

/// Renders a scaled record value for enriched explanations, e.g.
/// `"(123.45 kWh)"`.
pub fn format_scaled(record: &DvRecord) -> Option<String> {
    let scaled = record.scaled?;
    Some(format!("({} {})", scaled, record.unit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::hex_to_bytes;

    fn walk(hex: &str) -> DvParse {
        let frame = hex_to_bytes(hex);
        parse_dv_stream(&frame, 0, None)
    }

    #[test]
    fn test_two_record_stream() {
        // 32-bit energy 10^1 Wh = 12345, then 32-bit power W = 26.
        let out = walk("040439300000042B1A000000");
        assert!(out.error.is_none());
        assert_eq!(out.records.len(), 2);

        let energy = &out.records[0];
        assert_eq!(energy.dv_key, "0404");
        assert_eq!(energy.semantic_key, "energy");
        assert_eq!(energy.unit, Unit::KiloWattHour);
        assert!((energy.scaled.unwrap() - 123.45).abs() < 1e-9);

        let power = &out.records[1];
        assert_eq!(power.dv_key, "042B");
        assert_eq!(power.semantic_key, "power");
        assert_eq!(power.unit, Unit::KiloWatt);
        assert!((power.scaled.unwrap() - 0.026).abs() < 1e-12);

        assert_eq!(out.format_bytes, hex_to_bytes("0404042B"));
    }

    #[test]
    fn test_combinable_vife_backward_flow() {
        let out = walk("04843C10270000");
        assert_eq!(out.records.len(), 1);
        let r = &out.records[0];
        assert_eq!(r.dv_key, "04843C");
        assert_eq!(r.semantic_key, "energy");
        assert_eq!(r.modifiers, vec!["backward flow".to_string()]);
        // 10000 * 0.01 kWh
        assert!((r.scaled.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_pad_produces_no_record() {
        let out = walk("0404393000002F");
        assert!(out.error.is_none());
        assert_eq!(out.records.len(), 1);
        assert!(out
            .annotations
            .iter()
            .any(|(_, _, t)| t.contains("skip/padding")));
    }

    #[test]
    fn test_bcd_record() {
        // DIF 0x0C: 8-digit BCD, volume in litres.
        let out = walk("0C1378563412");
        let r = &out.records[0];
        assert_eq!(r.value, DvValue::Numeric(12345678.0));
        assert!((r.scaled.unwrap() - 12345.678).abs() < 1e-9);
    }

    #[test]
    fn test_date_record_not_scaled() {
        // 426C = storage-1 16-bit date type G.
        let b0 = 30 | ((19 & 0x07) << 5);
        let b1 = 4 | ((19 >> 3) << 4);
        let frame = [0x42, 0x6C, b0, b1];
        let out = parse_dv_stream(&frame, 0, None);
        let r = &out.records[0];
        assert_eq!(r.semantic_key, "date");
        assert_eq!(r.scaled, None);
        assert!(matches!(r.value, DvValue::Date(_)));
        assert_eq!(r.storage_nr, 1);
    }

    #[test]
    fn test_variable_length_text() {
        // DIF 0x0D, VIF 0x78 fabrication no, 3 chars "ABC" reversed.
        let out = walk("0D7803434241");
        let r = &out.records[0];
        assert_eq!(r.value, DvValue::Text("ABC".to_string()));
        assert_eq!(r.scaled, None);
    }

    #[test]
    fn test_truncated_data_keeps_prior_records() {
        let out = walk("040439300000042B1A00");
        assert_eq!(out.records.len(), 1);
        assert!(matches!(out.error, Some(WMBusError::MalformedDv { .. })));
    }

    #[test]
    fn test_manufacturer_specific_rest() {
        // 0x0F consumes the rest of the frame.
        let out = walk("0404393000000F0DDEADBEEF");
        assert_eq!(out.records.len(), 2);
        let mfct = &out.records[1];
        assert_eq!(mfct.dv_key, "0F");
        assert_eq!(mfct.semantic_key, "manufacturer_specific");
        assert_eq!(mfct.raw, hex_to_bytes("0DDEADBEEF"));
    }

    #[test]
    fn test_compact_template_walk() {
        // Template 02FF2004134413, data: u16 + u32 + u32.
        let template = hex_to_bytes("02FF2004134413");
        let frame = hex_to_bytes("11223344556677889900");
        let out = parse_dv_stream(&frame, 0, Some(&template));
        assert!(out.error.is_none());
        assert_eq!(out.records.len(), 3);
        assert_eq!(out.records[0].dv_key, "02FF20");
        assert_eq!(out.records[1].dv_key, "0413");
        assert_eq!(out.records[2].dv_key, "4413");
        assert_eq!(out.records[1].raw, hex_to_bytes("33445566"));
        assert_eq!(out.records[2].storage_nr, 1);
    }

    #[test]
    fn test_stream_ends_on_record_boundary() {
        let out = walk("02FD170000");
        assert!(out.error.is_none());
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].semantic_key, "error_flags");
    }
}
