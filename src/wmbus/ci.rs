//! # CI Field Catalogue
//!
//! The Control Information byte decides which sub-header follows at each
//! slot of the layer chain `DLL → {ELL?} → {NWL?} → {AFL?} → TPL`. One
//! table holds the codes the parser acts on; `ci_type_name` covers the
//! full EN 13757-3 CI space for explanation text.

/// Which layer a CI field introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiKind {
    Ell,
    Nwl,
    Afl,
    Tpl,
}

/// One row of the CI catalogue: {code, layer, fixed header length}.
///
/// The header length counts the bytes after the CI byte itself; `None`
/// marks variable-length headers (ELL V, AFL).
#[derive(Debug, Clone, Copy)]
pub struct CiEntry {
    pub code: u8,
    pub kind: CiKind,
    pub header_len: Option<usize>,
}

/// CI codes the layer state machine dispatches on.
pub const CI_FIELDS: &[CiEntry] = &[
    CiEntry { code: 0x72, kind: CiKind::Tpl, header_len: Some(12) },
    CiEntry { code: 0x78, kind: CiKind::Tpl, header_len: Some(0) },
    CiEntry { code: 0x79, kind: CiKind::Tpl, header_len: Some(4) },
    CiEntry { code: 0x7A, kind: CiKind::Tpl, header_len: Some(4) },
    CiEntry { code: 0xA2, kind: CiKind::Tpl, header_len: Some(0) },
    CiEntry { code: 0x8C, kind: CiKind::Ell, header_len: Some(2) },
    CiEntry { code: 0x8D, kind: CiKind::Ell, header_len: Some(8) },
    CiEntry { code: 0x8E, kind: CiKind::Ell, header_len: Some(10) },
    CiEntry { code: 0x8F, kind: CiKind::Ell, header_len: Some(16) },
    CiEntry { code: 0x86, kind: CiKind::Ell, header_len: None },
    CiEntry { code: 0x90, kind: CiKind::Afl, header_len: None },
    CiEntry { code: 0x81, kind: CiKind::Nwl, header_len: None },
    CiEntry { code: 0x83, kind: CiKind::Nwl, header_len: None },
    CiEntry { code: 0x87, kind: CiKind::Nwl, header_len: None },
    CiEntry { code: 0x88, kind: CiKind::Nwl, header_len: None },
    CiEntry { code: 0x89, kind: CiKind::Nwl, header_len: None },
];

/// Looks up the layer a CI byte belongs to, if the parser knows it.
pub fn ci_kind(ci: u8) -> Option<CiKind> {
    CI_FIELDS.iter().find(|e| e.code == ci).map(|e| e.kind)
}

/// True when the CI byte at the current slot introduces the given layer.
pub fn is_ci_of_kind(ci: u8, kind: CiKind) -> bool {
    ci_kind(ci) == Some(kind)
}

/// Human-readable CI description for the full EN 13757-3 CI space.
pub fn ci_type_name(ci: u8) -> &'static str {
    match ci {
        0x00..=0x1F => "Reserved for DLMS",
        0x20..=0x4F => "Reserved",
        0x50 => "Application reset or select to device (no tplh)",
        0x51 => "Command to device (no tplh)",
        0x52 => "Selection of device (no tplh)",
        0x53 => "Application reset or select to device (long tplh)",
        0x54 => "Request of selected application to device (no tplh)",
        0x55 => "Request of selected application to device (long tplh)",
        0x5A => "Command to device (short tplh)",
        0x5B => "Command to device (long tplh)",
        0x5C => "Sync action (no tplh)",
        0x5F => "Specific usage",
        0x60 => "COSEM data sent by the readout device to the meter (long tplh)",
        0x61 => "COSEM data sent by the readout device to the meter (short tplh)",
        0x64 => "Reserved for OBIS-based data sent to the meter (long tplh)",
        0x65 => "Reserved for OBIS-based data sent to the meter (short tplh)",
        0x66 => "Response of selected application from device (no tplh)",
        0x67 => "Response of selected application from device (short tplh)",
        0x68 => "Response of selected application from device (long tplh)",
        0x69 => "EN 13757-3 application layer with format frame (no tplh)",
        0x6A => "EN 13757-3 application layer with format frame (short tplh)",
        0x6B => "EN 13757-3 application layer with format frame (long tplh)",
        0x6C => "Clock synchronisation (absolute) (long tplh)",
        0x6D => "Clock synchronisation (relative) (long tplh)",
        0x6E => "Application error from device (short tplh)",
        0x6F => "Application error from device (long tplh)",
        0x70 => "Application error from device without transport layer",
        0x71 => "Reserved for alarm report",
        0x72 => "EN 13757-3 application layer (long tplh)",
        0x73 => "EN 13757-3 application layer with compact frame and long transport layer",
        0x74 => "Alarm from device (short tplh)",
        0x75 => "Alarm from device (long tplh)",
        0x78 => "EN 13757-3 application layer (no tplh)",
        0x79 => "EN 13757-3 application layer with compact frame (no tplh)",
        0x7A => "EN 13757-3 application layer (short tplh)",
        0x7B => "EN 13757-3 application layer with compact frame (short tplh)",
        0x7C => "COSEM application layer (long tplh)",
        0x7D => "COSEM application layer (short tplh)",
        0x7E => "Reserved for OBIS-based application layer (long tplh)",
        0x7F => "Reserved for OBIS-based application layer (short tplh)",
        0x80 => "EN 13757-3 transport layer (long tplh) from other device to the meter",
        0x81 => "Network layer data",
        0x82 => "Network management data to device (short tplh)",
        0x83 => "Network management data to device (no tplh)",
        0x84 => "Transport layer to device (compact frame) (long tplh)",
        0x85 => "Transport layer to device (format frame) (long tplh)",
        0x86 => "Extended link layer V (variable length)",
        0x87 => "Network management data from device (long tplh)",
        0x88 => "Network management data from device (short tplh)",
        0x89 => "Network management data from device (no tplh)",
        0x8A => "EN 13757-3 transport layer (short tplh) from the meter to the other device",
        0x8B => "EN 13757-3 transport layer (long tplh) from the meter to the other device",
        0x8C => "ELL: extended link layer I (2 bytes)",
        0x8D => "ELL: extended link layer II (8 bytes)",
        0x8E => "ELL: extended link layer III (10 bytes)",
        0x8F => "ELL: extended link layer IV (16 bytes)",
        0x90 => "AFL: authentication and fragmentation sublayer",
        0x91..=0x97 => "Reserved",
        0xA0..=0xB7 => "Mfct specific",
        0xB8 => "Set baud rate to 300",
        0xB9 => "Set baud rate to 600",
        0xBA => "Set baud rate to 1200",
        0xBB => "Set baud rate to 2400",
        0xBC => "Set baud rate to 4800",
        0xBD => "Set baud rate to 9600",
        0xBE => "Set baud rate to 19200",
        0xBF => "Set baud rate to 38400",
        0xC0 => "Image transfer to device (long tplh)",
        0xC1 => "Image transfer from device (short tplh)",
        0xC2 => "Image transfer from device (long tplh)",
        0xC3 => "Security info transfer to device (long tplh)",
        0xC4 => "Security info transfer from device (short tplh)",
        0xC5 => "Security info transfer from device (long tplh)",
        _ => "?",
    }
}
