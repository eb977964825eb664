//! # DV Records
//!
//! The data record header (DIB + VIB) parser and the decoded record type
//! published by the telegram orchestrator. Header parsing is nom-based;
//! the surrounding stream walk lives in [`crate::payload::dv`].

use crate::constants::*;
use crate::payload::vif::Unit;
use crate::util::encode_hex_upper;
use chrono::{NaiveDate, NaiveDateTime};
use nom::{bytes::complete::take, number::complete::u8 as nom_u8, IResult};
use serde::Serialize;

/// Function field of the DIF: what kind of value the record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementType {
    Instantaneous,
    Maximum,
    Minimum,
    AtError,
}

impl MeasurementType {
    /// Extracts the measurement type from DIF bits 4..5.
    pub fn from_dif(dif: u8) -> Self {
        match dif & DIF_MASK_FUNCTION {
            0x00 => MeasurementType::Instantaneous,
            0x10 => MeasurementType::Maximum,
            0x20 => MeasurementType::Minimum,
            _ => MeasurementType::AtError,
        }
    }
}

/// Data information block: DIF plus its extension chain.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataInformationBlock {
    pub dif: u8,
    pub difes: Vec<u8>,
}

impl DataInformationBlock {
    /// Storage number assembled from DIF bit 6 and DIFE bits 0..3.
    pub fn storage_number(&self) -> u32 {
        let mut nr = ((self.dif & DIF_MASK_STORAGE_LSB) >> 6) as u32;
        for (i, dife) in self.difes.iter().enumerate() {
            nr |= ((dife & DIFE_MASK_STORAGE) as u32) << (1 + 4 * i);
        }
        nr
    }

    /// Tariff assembled from DIFE bits 4..5.
    pub fn tariff(&self) -> u32 {
        let mut tariff = 0u32;
        for (i, dife) in self.difes.iter().enumerate() {
            tariff |= (((dife & DIFE_MASK_TARIFF) >> 4) as u32) << (2 * i);
        }
        tariff
    }

    /// Device/sub-unit assembled from DIFE bit 6.
    pub fn sub_unit(&self) -> u32 {
        let mut sub = 0u32;
        for (i, dife) in self.difes.iter().enumerate() {
            sub |= (((dife & DIFE_MASK_DEVICE) >> 6) as u32) << i;
        }
        sub
    }
}

/// Value information block: VIF plus its extension chain.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValueInformationBlock {
    pub vif: u8,
    pub vifes: Vec<u8>,
    /// User-defined VIF string (VIF 0x7C), decoded from its reversed wire
    /// representation; empty otherwise.
    pub custom_vif: String,
}

/// The parsed record header (DRH): DIB + VIB and the raw header bytes.
#[derive(Debug, Clone, Default)]
pub struct RecordHeader {
    pub dib: DataInformationBlock,
    pub vib: ValueInformationBlock,
    /// Raw DRH bytes as they appeared on the wire; these feed the
    /// compact-frame format signature.
    pub raw: Vec<u8>,
}

impl RecordHeader {
    /// The DV key: uppercase hex of DIF ‖ DIFEs ‖ VIF ‖ VIFEs. Meter
    /// collaborators match records by prefix of this string.
    pub fn dv_key(&self) -> String {
        encode_hex_upper(&self.raw)
    }
}

/// Decoded value of a record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DvValue {
    Numeric(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// No data (DIF length code 0 or 8) or undecodable payload kept raw.
    None,
}

/// One decoded data record from the DV stream.
#[derive(Debug, Clone, Serialize)]
pub struct DvRecord {
    /// Uppercase hex of the record header, e.g. `"0404"` or `"04843C"`.
    pub dv_key: String,
    /// Semantic key shared across meters (`"energy"`, `"power"`, ...).
    pub semantic_key: String,
    /// Canonical unit the scaled value is expressed in.
    pub unit: Unit,
    /// Decoded value before VIF scaling.
    pub value: DvValue,
    /// Value scaled to the canonical unit, when the VIF row is scalable.
    pub scaled: Option<f64>,
    pub measurement_type: MeasurementType,
    pub storage_nr: u32,
    pub tariff: u32,
    pub sub_unit: u32,
    /// Combinable-VIFE modifier names (per-second, backward flow, ...).
    pub modifiers: Vec<String>,
    /// Raw data bytes of the record.
    pub raw: Vec<u8>,
    /// Byte offset of the data within the frame, for explanation
    /// enrichment by meter modules.
    pub offset: usize,
}

/// Byte length of the record data for a DIF length code.
///
/// `None` means variable length (code 0xD): the first data byte carries
/// the length. Special-function DIFs (code 0xF) are handled by the
/// stream walker before this lookup.
pub fn dif_data_length(dif: u8) -> Option<usize> {
    match dif & DIF_MASK_DATA {
        0x0 => Some(0),
        0x1 => Some(1),
        0x2 => Some(2),
        0x3 => Some(3),
        0x4 => Some(4),
        0x5 => Some(4), // 32-bit real
        0x6 => Some(6),
        0x7 => Some(8),
        0x8 => Some(0), // selection for readout
        0x9 => Some(1),
        0xA => Some(2),
        0xB => Some(3),
        0xC => Some(4),
        0xD => None, // variable length
        0xE => Some(6), // 12-digit BCD
        _ => Some(0),
    }
}

/// Parses a record header (DIF, DIFEs, VIF, VIFEs, optional custom VIF
/// string) from the input. The caller derives the consumed byte count
/// from the remaining input length.
pub fn parse_record_header(input: &[u8]) -> IResult<&[u8], RecordHeader> {
    let mut header = RecordHeader::default();

    let (mut i, dif) = nom_u8(input)?;
    header.dib.dif = dif;
    header.raw.push(dif);

    if dif & EXTENSION_BIT != 0 {
        loop {
            let (rest, dife) = nom_u8(i)?;
            i = rest;
            header.dib.difes.push(dife);
            header.raw.push(dife);
            if dife & EXTENSION_BIT == 0 || header.dib.difes.len() >= 10 {
                break;
            }
        }
    }

    let (mut i, vif) = nom_u8(i)?;
    header.vib.vif = vif;
    header.raw.push(vif);

    if vif & 0x7F == VIF_STRING_FOLLOWS {
        let (rest, len) = nom_u8(i)?;
        if len > CUSTOM_VIF_MAX_LEN {
            return Err(nom::Err::Error(nom::error::Error::new(
                rest,
                nom::error::ErrorKind::Tag,
            )));
        }
        let (rest, chars) = take(len as usize)(rest)?;
        header.vib.custom_vif = crate::payload::data_encoding::decode_reversed_string(chars);
        header.raw.push(len);
        header.raw.extend_from_slice(chars);
        i = rest;
    }

    if vif & EXTENSION_BIT != 0 {
        loop {
            let (rest, vife) = nom_u8(i)?;
            i = rest;
            header.vib.vifes.push(vife);
            header.raw.push(vife);
            if vife & EXTENSION_BIT == 0 || header.vib.vifes.len() >= 10 {
                break;
            }
        }
    }

    Ok((i, header))
}
