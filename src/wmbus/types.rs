//! # Protocol Enumerations
//!
//! Security modes, AFL authentication types, link modes, media types and
//! the C/CC field describers of EN 13757-3/-4. Each catalogue is a single
//! const table (or enum with a table-driven conversion); all lookup
//! helpers derive from it.

use bitflags::bitflags;
use serde::Serialize;

// ----------------------------------------------------------------------------
// ELL security modes (3-bit field in the session number)
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EllSecurityMode {
    NoSecurity,
    AesCtr,
    Reserved,
}

impl EllSecurityMode {
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0 => EllSecurityMode::NoSecurity,
            1 => EllSecurityMode::AesCtr,
            _ => EllSecurityMode::Reserved,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EllSecurityMode::NoSecurity => "NoSecurity",
            EllSecurityMode::AesCtr => "AES_CTR",
            EllSecurityMode::Reserved => "Reserved",
        }
    }
}

// ----------------------------------------------------------------------------
// TPL security modes (5-bit field in the configuration word)
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TplSecurityMode {
    NoSecurity,
    MfctSpecific,
    DesCbcNoIv,
    DesCbcIv,
    AesCbcIv,
    AesCbcNoIv,
    AesGcm,
    AesCcm,
    Reserved(u8),
}

impl TplSecurityMode {
    pub fn from_bits(bits: u8) -> Self {
        match bits {
            0 => TplSecurityMode::NoSecurity,
            1 => TplSecurityMode::MfctSpecific,
            2 => TplSecurityMode::DesCbcNoIv,
            3 => TplSecurityMode::DesCbcIv,
            5 => TplSecurityMode::AesCbcIv,
            7 => TplSecurityMode::AesCbcNoIv,
            8 => TplSecurityMode::AesGcm,
            9 => TplSecurityMode::AesCcm,
            other => TplSecurityMode::Reserved(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TplSecurityMode::NoSecurity => "NoSecurity",
            TplSecurityMode::MfctSpecific => "MfctSpecific",
            TplSecurityMode::DesCbcNoIv => "DES_CBC_NO_IV",
            TplSecurityMode::DesCbcIv => "DES_CBC_IV",
            TplSecurityMode::AesCbcIv => "AES_CBC_IV",
            TplSecurityMode::AesCbcNoIv => "AES_CBC_NO_IV",
            TplSecurityMode::AesGcm => "AES_GCM",
            TplSecurityMode::AesCcm => "AES_CCM",
            TplSecurityMode::Reserved(_) => "Reserved",
        }
    }
}

// ----------------------------------------------------------------------------
// AFL authentication types
// ----------------------------------------------------------------------------

/// AFL authentication type table: {code, name, MAC length}.
const AFL_AUTH_TYPES: &[(u8, &str, usize)] = &[
    (0, "NoAuth", 0),
    (1, "Reserved1", 0),
    (2, "Reserved2", 0),
    (3, "AES_CMAC_128_2", 2),
    (4, "AES_CMAC_128_4", 4),
    (5, "AES_CMAC_128_8", 8),
    (6, "AES_CMAC_128_12", 12),
    (7, "AES_CMAC_128_16", 16),
    (8, "AES_GMAC_128_12", 12),
];

/// AFL authentication type (low 4 bits of the message control byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AflAuthenticationType(pub u8);

impl AflAuthenticationType {
    /// MAC length in bytes declared by this authentication type.
    pub fn mac_len(&self) -> usize {
        AFL_AUTH_TYPES
            .iter()
            .find(|(code, _, _)| *code == self.0)
            .map(|(_, _, len)| *len)
            .unwrap_or(0)
    }

    pub fn name(&self) -> &'static str {
        AFL_AUTH_TYPES
            .iter()
            .find(|(code, _, _)| *code == self.0)
            .map(|(_, name, _)| *name)
            .unwrap_or("Reserved")
    }
}

// ----------------------------------------------------------------------------
// Link modes
// ----------------------------------------------------------------------------

bitflags! {
    /// Set of wM-Bus link modes a device or listener supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LinkModeSet: u16 {
        const S1  = 1 << 0;
        const S1M = 1 << 1;
        const T1  = 1 << 2;
        const C1  = 1 << 3;
        const N1A = 1 << 4;
        const N1B = 1 << 5;
        const N1C = 1 << 6;
        const N1D = 1 << 7;
        const N1E = 1 << 8;
        const N1F = 1 << 9;
    }
}

const LINK_MODE_NAMES: &[(LinkModeSet, &str)] = &[
    (LinkModeSet::S1, "s1"),
    (LinkModeSet::S1M, "s1m"),
    (LinkModeSet::T1, "t1"),
    (LinkModeSet::C1, "c1"),
    (LinkModeSet::N1A, "n1a"),
    (LinkModeSet::N1B, "n1b"),
    (LinkModeSet::N1C, "n1c"),
    (LinkModeSet::N1D, "n1d"),
    (LinkModeSet::N1E, "n1e"),
    (LinkModeSet::N1F, "n1f"),
];

impl LinkModeSet {
    /// Parses a comma-separated list such as `"c1,t1"`.
    pub fn parse(input: &str) -> Option<LinkModeSet> {
        let mut set = LinkModeSet::empty();
        for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (mode, _) = LINK_MODE_NAMES
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(token))?;
            set |= *mode;
        }
        Some(set)
    }

    /// Human-readable comma-separated list of contained modes.
    pub fn hr(&self) -> String {
        let names: Vec<&str> = LINK_MODE_NAMES
            .iter()
            .filter(|(mode, _)| self.contains(*mode))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(",")
        }
    }
}

// ----------------------------------------------------------------------------
// Media types (DLL/TPL device type byte)
// ----------------------------------------------------------------------------

/// Media type table per EN 13757-3, including the de-facto vendor rows
/// (0x62/0x72 MKRadio3 water, 0x80 FHKV heat cost allocator).
const MEDIA_TYPES: &[(u8, &str)] = &[
    (0x00, "Other"),
    (0x01, "Oil meter"),
    (0x02, "Electricity meter"),
    (0x03, "Gas meter"),
    (0x04, "Heat meter"),
    (0x05, "Steam meter"),
    (0x06, "Warm water (30-90°C) meter"),
    (0x07, "Water meter"),
    (0x08, "Heat cost allocator"),
    (0x09, "Compressed air meter"),
    (0x0A, "Cooling load volume at outlet meter"),
    (0x0B, "Cooling load volume at inlet meter"),
    (0x0C, "Heat volume at inlet meter"),
    (0x0D, "Heat/Cooling load meter"),
    (0x0E, "Bus/System component"),
    (0x0F, "Unknown"),
    (0x15, "Hot water (>=90°C) meter"),
    (0x16, "Cold water meter"),
    (0x17, "Hot/Cold water meter"),
    (0x18, "Pressure meter"),
    (0x19, "A/D converter"),
    (0x1A, "Smoke detector"),
    (0x1B, "Room sensor"),
    (0x1C, "Gas detector"),
    (0x20, "Breaker (electricity)"),
    (0x21, "Valve (gas or water)"),
    (0x25, "Customer unit (display device)"),
    (0x28, "Waste water"),
    (0x29, "Garbage"),
    (0x31, "Communication controller"),
    (0x32, "Unidirectional repeater"),
    (0x33, "Bidirectional repeater"),
    (0x36, "Radio converter (system side)"),
    (0x37, "Radio converter (meter side)"),
    (0x62, "Warm water"),
    (0x72, "Cold water"),
    (0x80, "Heat cost allocator"),
    (0xC3, "Heat meter"),
];

/// Human-readable media type for a device type byte.
pub fn media_type_name(device_type: u8) -> &'static str {
    MEDIA_TYPES
        .iter()
        .find(|(code, _)| *code == device_type)
        .map(|(_, name)| *name)
        .unwrap_or("Reserved")
}

// ----------------------------------------------------------------------------
// C-field and CC-field describers, used in explanations
// ----------------------------------------------------------------------------

/// Describes the DLL control field, e.g. `"from meter SND_NR"`.
pub fn c_field_name(c_field: u8) -> String {
    let mut s = String::new();
    if c_field & 0x80 != 0 {
        s.push_str("relayed ");
    }
    if c_field & 0x40 != 0 {
        s.push_str("from meter ");
    } else {
        s.push_str("to meter ");
    }

    let code = match c_field & 0x0F {
        0x0 => "SND_NKE",
        0x3 => "SND_UD2",
        0x4 => "SND_NR",
        0x5 => "SND_UD3",
        0x6 => "SND_IR",
        0x7 => "ACC_NR",
        0x8 => "ACC_DMD",
        0xA => "REQ_UD1",
        0xB => "REQ_UD2",
        _ => "?",
    };
    s.push_str(code);
    s
}

/// Describes the ELL communication control field.
pub fn cc_field_name(cc_field: u8) -> String {
    use crate::constants::*;

    let mut s = String::new();
    if cc_field & CC_B_BIDIRECTIONAL_BIT != 0 {
        s.push_str("bidir ");
    }
    if cc_field & CC_RD_RESPONSE_DELAY_BIT != 0 {
        s.push_str("fast_resp ");
    } else {
        s.push_str("slow_resp ");
    }
    if cc_field & CC_S_SYNCH_FRAME_BIT != 0 {
        s.push_str("sync ");
    }
    if cc_field & CC_R_RELAYED_BIT != 0 {
        s.push_str("relayed ");
    }
    if cc_field & CC_P_HIGH_PRIO_BIT != 0 {
        s.push_str("prio ");
    }
    s.trim_end().to_string()
}
