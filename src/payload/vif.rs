//! # Primary VIF Table
//!
//! The primary Value Information Field codes 0x00..=0x7A from EN 13757-3,
//! as one declarative table. Each row carries the semantic key used by
//! meter collaborators, the canonical unit the scaled value is expressed
//! in, and the exact decimal multiplier from the raw value to that unit.
//!
//! Canonical units: energy → kWh (or MJ for the Joule bank), volume → m³,
//! mass → kg, time → h, power → kW (or MJ/h), flow → m³/h, mass flow →
//! kg/h, temperatures → °C (differences → K), pressure → bar.
//!
//! Codes 0x6C/0x6D are date types and carry no scale; 0x6F is reserved.

use serde::Serialize;

/// Physical unit of a scaled record value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    #[serde(rename = "kWh")]
    KiloWattHour,
    #[serde(rename = "MJ")]
    MegaJoule,
    #[serde(rename = "MJ/h")]
    MegaJoulePerHour,
    #[serde(rename = "m3")]
    CubicMeter,
    #[serde(rename = "kg")]
    Kilogram,
    #[serde(rename = "h")]
    Hour,
    #[serde(rename = "kW")]
    KiloWatt,
    #[serde(rename = "m3/h")]
    CubicMeterPerHour,
    #[serde(rename = "kg/h")]
    KilogramPerHour,
    #[serde(rename = "c")]
    Celsius,
    #[serde(rename = "k")]
    Kelvin,
    #[serde(rename = "bar")]
    Bar,
    #[serde(rename = "f")]
    Fahrenheit,
    #[serde(rename = "v")]
    Volt,
    #[serde(rename = "a")]
    Ampere,
    #[serde(rename = "hca")]
    HcaUnit,
    #[serde(rename = "feet3")]
    CubicFeet,
    #[serde(rename = "gallon")]
    Gallon,
    #[serde(rename = "gallon/min")]
    GallonPerMinute,
    #[serde(rename = "gallon/h")]
    GallonPerHour,
    #[serde(rename = "")]
    None,
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Unit::KiloWattHour => "kWh",
            Unit::MegaJoule => "MJ",
            Unit::MegaJoulePerHour => "MJ/h",
            Unit::CubicMeter => "m3",
            Unit::Kilogram => "kg",
            Unit::Hour => "h",
            Unit::KiloWatt => "kW",
            Unit::CubicMeterPerHour => "m3/h",
            Unit::KilogramPerHour => "kg/h",
            Unit::Celsius => "°C",
            Unit::Kelvin => "K",
            Unit::Bar => "bar",
            Unit::Fahrenheit => "°F",
            Unit::Volt => "V",
            Unit::Ampere => "A",
            Unit::HcaUnit => "HCA",
            Unit::CubicFeet => "feet³",
            Unit::Gallon => "gallon",
            Unit::GallonPerMinute => "gallon/min",
            Unit::GallonPerHour => "gallon/h",
            Unit::None => "",
        };
        f.write_str(s)
    }
}

/// One row of the primary VIF table.
#[derive(Debug, Clone, Copy)]
pub struct VifInfo {
    pub vif: u8,
    /// Semantic key shared across meters ("energy", "volume", ...)
    pub key: &'static str,
    /// Canonical unit the scaled value is expressed in
    pub unit: Unit,
    /// Multiplier from raw value to canonical unit; `None` for date types
    /// and reserved codes, which must not be scaled
    pub scale: Option<f64>,
    /// Human-readable row name used in explanations
    pub name: &'static str,
}

const fn row(vif: u8, key: &'static str, unit: Unit, scale: f64, name: &'static str) -> VifInfo {
    VifInfo {
        vif,
        key,
        unit,
        scale: Some(scale),
        name,
    }
}

const fn unscaled(vif: u8, key: &'static str, name: &'static str) -> VifInfo {
    VifInfo {
        vif,
        key,
        unit: Unit::None,
        scale: None,
        name,
    }
}

/// Primary VIF codes 0x00..=0x7A (EN 13757-3 table 10).
pub const PRIMARY_VIF_TABLE: &[VifInfo] = &[
    row(0x00, "energy", Unit::KiloWattHour, 1e-6, "Energy mWh"),
    row(0x01, "energy", Unit::KiloWattHour, 1e-5, "Energy 10⁻² Wh"),
    row(0x02, "energy", Unit::KiloWattHour, 1e-4, "Energy 10⁻¹ Wh"),
    row(0x03, "energy", Unit::KiloWattHour, 1e-3, "Energy Wh"),
    row(0x04, "energy", Unit::KiloWattHour, 1e-2, "Energy 10¹ Wh"),
    row(0x05, "energy", Unit::KiloWattHour, 1e-1, "Energy 10² Wh"),
    row(0x06, "energy", Unit::KiloWattHour, 1.0, "Energy kWh"),
    row(0x07, "energy", Unit::KiloWattHour, 10.0, "Energy 10⁴ Wh"),
    row(0x08, "energy", Unit::MegaJoule, 1e-6, "Energy J"),
    row(0x09, "energy", Unit::MegaJoule, 1e-5, "Energy 10¹ J"),
    row(0x0A, "energy", Unit::MegaJoule, 1e-4, "Energy 10² J"),
    row(0x0B, "energy", Unit::MegaJoule, 1e-3, "Energy kJ"),
    row(0x0C, "energy", Unit::MegaJoule, 1e-2, "Energy 10⁴ J"),
    row(0x0D, "energy", Unit::MegaJoule, 1e-1, "Energy 10⁵ J"),
    row(0x0E, "energy", Unit::MegaJoule, 1.0, "Energy MJ"),
    row(0x0F, "energy", Unit::MegaJoule, 10.0, "Energy 10⁷ J"),
    row(0x10, "volume", Unit::CubicMeter, 1e-6, "Volume cm³"),
    row(0x11, "volume", Unit::CubicMeter, 1e-5, "Volume 10⁻⁵ m³"),
    row(0x12, "volume", Unit::CubicMeter, 1e-4, "Volume 10⁻⁴ m³"),
    row(0x13, "volume", Unit::CubicMeter, 1e-3, "Volume l"),
    row(0x14, "volume", Unit::CubicMeter, 1e-2, "Volume 10⁻² m³"),
    row(0x15, "volume", Unit::CubicMeter, 1e-1, "Volume 10⁻¹ m³"),
    row(0x16, "volume", Unit::CubicMeter, 1.0, "Volume m³"),
    row(0x17, "volume", Unit::CubicMeter, 10.0, "Volume 10¹ m³"),
    row(0x18, "mass", Unit::Kilogram, 1e-3, "Mass g"),
    row(0x19, "mass", Unit::Kilogram, 1e-2, "Mass 10⁻² kg"),
    row(0x1A, "mass", Unit::Kilogram, 1e-1, "Mass 10⁻¹ kg"),
    row(0x1B, "mass", Unit::Kilogram, 1.0, "Mass kg"),
    row(0x1C, "mass", Unit::Kilogram, 10.0, "Mass 10¹ kg"),
    row(0x1D, "mass", Unit::Kilogram, 100.0, "Mass 10² kg"),
    row(0x1E, "mass", Unit::Kilogram, 1000.0, "Mass t"),
    row(0x1F, "mass", Unit::Kilogram, 10000.0, "Mass 10⁴ kg"),
    row(0x20, "on_time", Unit::Hour, 1.0 / 3600.0, "On time seconds"),
    row(0x21, "on_time", Unit::Hour, 1.0 / 60.0, "On time minutes"),
    row(0x22, "on_time", Unit::Hour, 1.0, "On time hours"),
    row(0x23, "on_time", Unit::Hour, 24.0, "On time days"),
    row(0x24, "operating_time", Unit::Hour, 1.0 / 3600.0, "Operating time seconds"),
    row(0x25, "operating_time", Unit::Hour, 1.0 / 60.0, "Operating time minutes"),
    row(0x26, "operating_time", Unit::Hour, 1.0, "Operating time hours"),
    row(0x27, "operating_time", Unit::Hour, 24.0, "Operating time days"),
    row(0x28, "power", Unit::KiloWatt, 1e-6, "Power mW"),
    row(0x29, "power", Unit::KiloWatt, 1e-5, "Power 10⁻² W"),
    row(0x2A, "power", Unit::KiloWatt, 1e-4, "Power 10⁻¹ W"),
    row(0x2B, "power", Unit::KiloWatt, 1e-3, "Power W"),
    row(0x2C, "power", Unit::KiloWatt, 1e-2, "Power 10¹ W"),
    row(0x2D, "power", Unit::KiloWatt, 1e-1, "Power 10² W"),
    row(0x2E, "power", Unit::KiloWatt, 1.0, "Power kW"),
    row(0x2F, "power", Unit::KiloWatt, 10.0, "Power 10⁴ W"),
    row(0x30, "power", Unit::MegaJoulePerHour, 1e-6, "Power J/h"),
    row(0x31, "power", Unit::MegaJoulePerHour, 1e-5, "Power 10¹ J/h"),
    row(0x32, "power", Unit::MegaJoulePerHour, 1e-4, "Power 10² J/h"),
    row(0x33, "power", Unit::MegaJoulePerHour, 1e-3, "Power kJ/h"),
    row(0x34, "power", Unit::MegaJoulePerHour, 1e-2, "Power 10⁴ J/h"),
    row(0x35, "power", Unit::MegaJoulePerHour, 1e-1, "Power 10⁵ J/h"),
    row(0x36, "power", Unit::MegaJoulePerHour, 1.0, "Power MJ/h"),
    row(0x37, "power", Unit::MegaJoulePerHour, 10.0, "Power 10⁷ J/h"),
    row(0x38, "volume_flow", Unit::CubicMeterPerHour, 1e-6, "Volume flow cm³/h"),
    row(0x39, "volume_flow", Unit::CubicMeterPerHour, 1e-5, "Volume flow 10⁻⁵ m³/h"),
    row(0x3A, "volume_flow", Unit::CubicMeterPerHour, 1e-4, "Volume flow 10⁻⁴ m³/h"),
    row(0x3B, "volume_flow", Unit::CubicMeterPerHour, 1e-3, "Volume flow l/h"),
    row(0x3C, "volume_flow", Unit::CubicMeterPerHour, 1e-2, "Volume flow 10⁻² m³/h"),
    row(0x3D, "volume_flow", Unit::CubicMeterPerHour, 1e-1, "Volume flow 10⁻¹ m³/h"),
    row(0x3E, "volume_flow", Unit::CubicMeterPerHour, 1.0, "Volume flow m³/h"),
    row(0x3F, "volume_flow", Unit::CubicMeterPerHour, 10.0, "Volume flow 10¹ m³/h"),
    row(0x40, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / 600_000_000.0, "Volume flow ext. 10⁻⁷ m³/min"),
    row(0x41, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / 60_000_000.0, "Volume flow ext. cm³/min"),
    row(0x42, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / 6_000_000.0, "Volume flow ext. 10⁻⁵ m³/min"),
    row(0x43, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / 600_000.0, "Volume flow ext. 10⁻⁴ m³/min"),
    row(0x44, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / 60_000.0, "Volume flow ext. l/min"),
    row(0x45, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / 6_000.0, "Volume flow ext. 10⁻² m³/min"),
    row(0x46, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / 600.0, "Volume flow ext. 10⁻¹ m³/min"),
    row(0x47, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / 60.0, "Volume flow ext. m³/min"),
    row(0x48, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / (1_000_000_000.0 * 3600.0), "Volume flow ext. mm³/s"),
    row(0x49, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / (100_000_000.0 * 3600.0), "Volume flow ext. 10⁻⁸ m³/s"),
    row(0x4A, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / (10_000_000.0 * 3600.0), "Volume flow ext. 10⁻⁷ m³/s"),
    row(0x4B, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / (1_000_000.0 * 3600.0), "Volume flow ext. cm³/s"),
    row(0x4C, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / (100_000.0 * 3600.0), "Volume flow ext. 10⁻⁵ m³/s"),
    row(0x4D, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / (10_000.0 * 3600.0), "Volume flow ext. 10⁻⁴ m³/s"),
    row(0x4E, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / (1_000.0 * 3600.0), "Volume flow ext. l/s"),
    row(0x4F, "volume_flow_ext", Unit::CubicMeterPerHour, 1.0 / (100.0 * 3600.0), "Volume flow ext. 10⁻² m³/s"),
    row(0x50, "mass_flow", Unit::KilogramPerHour, 1e-3, "Mass flow g/h"),
    row(0x51, "mass_flow", Unit::KilogramPerHour, 1e-2, "Mass flow 10⁻² kg/h"),
    row(0x52, "mass_flow", Unit::KilogramPerHour, 1e-1, "Mass flow 10⁻¹ kg/h"),
    row(0x53, "mass_flow", Unit::KilogramPerHour, 1.0, "Mass flow kg/h"),
    row(0x54, "mass_flow", Unit::KilogramPerHour, 10.0, "Mass flow 10¹ kg/h"),
    row(0x55, "mass_flow", Unit::KilogramPerHour, 100.0, "Mass flow 10² kg/h"),
    row(0x56, "mass_flow", Unit::KilogramPerHour, 1000.0, "Mass flow t/h"),
    row(0x57, "mass_flow", Unit::KilogramPerHour, 10000.0, "Mass flow 10⁴ kg/h"),
    row(0x58, "flow_temperature", Unit::Celsius, 1e-3, "Flow temperature 10⁻³ °C"),
    row(0x59, "flow_temperature", Unit::Celsius, 1e-2, "Flow temperature 10⁻² °C"),
    row(0x5A, "flow_temperature", Unit::Celsius, 1e-1, "Flow temperature 10⁻¹ °C"),
    row(0x5B, "flow_temperature", Unit::Celsius, 1.0, "Flow temperature °C"),
    row(0x5C, "return_temperature", Unit::Celsius, 1e-3, "Return temperature 10⁻³ °C"),
    row(0x5D, "return_temperature", Unit::Celsius, 1e-2, "Return temperature 10⁻² °C"),
    row(0x5E, "return_temperature", Unit::Celsius, 1e-1, "Return temperature 10⁻¹ °C"),
    row(0x5F, "return_temperature", Unit::Celsius, 1.0, "Return temperature °C"),
    row(0x60, "temperature_difference", Unit::Kelvin, 1e-3, "Temperature difference mK"),
    row(0x61, "temperature_difference", Unit::Kelvin, 1e-2, "Temperature difference 10⁻² K"),
    row(0x62, "temperature_difference", Unit::Kelvin, 1e-1, "Temperature difference 10⁻¹ K"),
    row(0x63, "temperature_difference", Unit::Kelvin, 1.0, "Temperature difference K"),
    row(0x64, "external_temperature", Unit::Celsius, 1e-3, "External temperature 10⁻³ °C"),
    row(0x65, "external_temperature", Unit::Celsius, 1e-2, "External temperature 10⁻² °C"),
    row(0x66, "external_temperature", Unit::Celsius, 1e-1, "External temperature 10⁻¹ °C"),
    row(0x67, "external_temperature", Unit::Celsius, 1.0, "External temperature °C"),
    row(0x68, "pressure", Unit::Bar, 1e-3, "Pressure mbar"),
    row(0x69, "pressure", Unit::Bar, 1e-2, "Pressure 10⁻² bar"),
    row(0x6A, "pressure", Unit::Bar, 1e-1, "Pressure 10⁻¹ bar"),
    row(0x6B, "pressure", Unit::Bar, 1.0, "Pressure bar"),
    unscaled(0x6C, "date", "Date type G"),
    unscaled(0x6D, "date_time", "Date and time type F"),
    row(0x6E, "hca", Unit::HcaUnit, 1.0, "Units for H.C.A."),
    unscaled(0x6F, "reserved", "Reserved"),
    row(0x70, "average_duration", Unit::Hour, 1.0 / 3600.0, "Averaging duration seconds"),
    row(0x71, "average_duration", Unit::Hour, 1.0 / 60.0, "Averaging duration minutes"),
    row(0x72, "average_duration", Unit::Hour, 1.0, "Averaging duration hours"),
    row(0x73, "average_duration", Unit::Hour, 24.0, "Averaging duration days"),
    row(0x74, "actual_duration", Unit::Hour, 1.0 / 3600.0, "Actuality duration seconds"),
    row(0x75, "actual_duration", Unit::Hour, 1.0 / 60.0, "Actuality duration minutes"),
    row(0x76, "actual_duration", Unit::Hour, 1.0, "Actuality duration hours"),
    row(0x77, "actual_duration", Unit::Hour, 24.0, "Actuality duration days"),
    row(0x78, "fabrication_no", Unit::None, 1.0, "Fabrication no"),
    row(0x79, "enhanced_identification", Unit::None, 1.0, "Enhanced identification"),
    row(0x7A, "bus_address", Unit::None, 1.0, "Bus address"),
];

/// Looks up a primary VIF code (extension bit must already be stripped).
pub fn lookup_primary_vif(vif: u8) -> Option<&'static VifInfo> {
    PRIMARY_VIF_TABLE.iter().find(|info| info.vif == (vif & 0x7F))
}

/// The scale multiplier for a primary VIF code, if the code is scalable.
pub fn vif_scale(vif: u8) -> Option<f64> {
    lookup_primary_vif(vif).and_then(|info| info.scale)
}

/// True for the date-typed VIF codes that decode to a date structure
/// instead of a scaled number.
pub fn is_date_vif(vif: u8) -> bool {
    matches!(vif & 0x7F, 0x6C | 0x6D)
}
