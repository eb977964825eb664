//! # VIF Extension Banks and Combinable VIFEs
//!
//! Decision trees for the 0xFD and 0xFB VIF extension banks of EN 13757-3
//! and the combinable VIFE codes (0x20..=0x7F) that modify a preceding
//! scaled VIF. Unlisted codes resolve to `unknown`; the raw bytes stay on
//! the record either way.

use crate::payload::vif::Unit;

/// Resolution of a VIFE byte from one of the extension banks.
#[derive(Debug, Clone)]
pub struct VifeResolved {
    pub key: &'static str,
    pub unit: Unit,
    /// Multiplier to the canonical unit; `None` when the row is not a
    /// scalable quantity (identifiers, dates, flags, reserved rows).
    pub scale: Option<f64>,
    pub name: String,
}

impl VifeResolved {
    fn plain(key: &'static str, name: &str) -> Self {
        VifeResolved {
            key,
            unit: Unit::None,
            scale: Some(1.0),
            name: name.to_string(),
        }
    }

    fn scaled(key: &'static str, unit: Unit, scale: f64, name: String) -> Self {
        VifeResolved {
            key,
            unit,
            scale: Some(scale),
            name,
        }
    }

    fn reserved() -> Self {
        VifeResolved {
            key: "reserved",
            unit: Unit::None,
            scale: None,
            name: "Reserved".to_string(),
        }
    }

    fn unknown(vife: u8) -> Self {
        VifeResolved {
            key: "unknown",
            unit: Unit::None,
            scale: None,
            name: format!("Unknown VIFE 0x{vife:02X}"),
        }
    }
}

fn pow10(e: i32) -> f64 {
    10f64.powi(e)
}

fn time_nn(nn: u8) -> &'static str {
    match nn {
        0 => "second(s)",
        1 => "minute(s)",
        2 => "hour(s)",
        _ => "day(s)",
    }
}

fn time_pp(pp: u8) -> &'static str {
    match pp {
        0 => "hour(s)",
        1 => "day(s)",
        2 => "month(s)",
        _ => "year(s)",
    }
}

/// Resolves a VIFE byte from the 0xFD ("second") extension bank.
pub fn lookup_vife_fd(vife: u8) -> VifeResolved {
    let t = vife & 0x7F;

    if t & 0x7C == 0x00 {
        let nn = (t & 0x03) as i32;
        return VifeResolved::scaled(
            "credit",
            Unit::None,
            pow10(nn - 3),
            format!("Credit of 10^{} of the nominal local legal currency units", nn - 3),
        );
    }
    if t & 0x7C == 0x04 {
        let nn = (t & 0x03) as i32;
        return VifeResolved::scaled(
            "debit",
            Unit::None,
            pow10(nn - 3),
            format!("Debit of 10^{} of the nominal local legal currency units", nn - 3),
        );
    }

    match t {
        0x08 => return VifeResolved::plain("access_number", "Access number (transmission count)"),
        0x09 => return VifeResolved::plain("medium", "Medium (as in fixed header)"),
        0x0A => return VifeResolved::plain("manufacturer", "Manufacturer (as in fixed header)"),
        0x0B => return VifeResolved::plain("parameter_set_id", "Parameter set identification"),
        0x0C => return VifeResolved::plain("model_version", "Model/Version"),
        0x0D => return VifeResolved::plain("hardware_version", "Hardware version"),
        0x0E => return VifeResolved::plain("firmware_version", "Firmware version"),
        0x0F => return VifeResolved::plain("software_version", "Software version"),
        0x10 => return VifeResolved::plain("customer_location", "Customer location"),
        0x11 => return VifeResolved::plain("customer", "Customer"),
        0x12 => return VifeResolved::plain("access_code_user", "Access code user"),
        0x13 => return VifeResolved::plain("access_code_operator", "Access code operator"),
        0x14 => {
            return VifeResolved::plain("access_code_system_operator", "Access code system operator")
        }
        0x15 => return VifeResolved::plain("access_code_developer", "Access code developer"),
        0x16 => return VifeResolved::plain("password", "Password"),
        0x17 => return VifeResolved::plain("error_flags", "Error flags (binary)"),
        0x18 => return VifeResolved::plain("error_mask", "Error mask"),
        0x1A => return VifeResolved::plain("digital_output", "Digital output (binary)"),
        0x1B => return VifeResolved::plain("digital_input", "Digital input (binary)"),
        0x1C => return VifeResolved::plain("baudrate", "Baudrate [Baud]"),
        0x1D => return VifeResolved::plain("response_delay", "Response delay time [bittimes]"),
        0x1E => return VifeResolved::plain("retry", "Retry"),
        0x20 => return VifeResolved::plain("first_storage_nr", "First storage # for cyclic storage"),
        0x21 => return VifeResolved::plain("last_storage_nr", "Last storage # for cyclic storage"),
        0x22 => return VifeResolved::plain("storage_block_size", "Size of storage block"),
        0x28 => return VifeResolved::plain("storage_interval", "Storage interval month(s)"),
        0x29 => return VifeResolved::plain("storage_interval", "Storage interval year(s)"),
        0x30 => return VifeResolved::plain("tariff_start", "Start (date/time) of tariff"),
        0x38 => return VifeResolved::plain("tariff_period", "Period of tariff month(s)"),
        0x39 => return VifeResolved::plain("tariff_period", "Period of tariff year(s)"),
        0x3A => return VifeResolved::plain("dimensionless", "Dimensionless / no VIF"),
        0x60 => return VifeResolved::plain("reset_counter", "Reset counter"),
        0x61 => return VifeResolved::plain("cumulation_counter", "Cumulation counter"),
        0x62 => return VifeResolved::plain("control_signal", "Control signal"),
        0x63 => return VifeResolved::plain("day_of_week", "Day of week"),
        0x64 => return VifeResolved::plain("week_number", "Week number"),
        0x65 => return VifeResolved::plain("time_point_of_day_change", "Time point of day change"),
        0x66 => {
            return VifeResolved::plain("parameter_activation_state", "State of parameter activation")
        }
        0x67 => {
            return VifeResolved::plain("special_supplier_information", "Special supplier information")
        }
        0x70 => {
            return VifeResolved {
                key: "battery_change_date",
                unit: Unit::None,
                scale: None,
                name: "Date and time of battery change".to_string(),
            }
        }
        _ => {}
    }

    if t & 0x7C == 0x24 {
        let nn = t & 0x03;
        return VifeResolved {
            key: "storage_interval",
            unit: Unit::None,
            scale: Some(1.0),
            name: format!("Storage interval [{}]", time_nn(nn)),
        };
    }
    if t & 0x7C == 0x2C {
        let nn = t & 0x03;
        return VifeResolved {
            key: "duration_since_readout",
            unit: Unit::None,
            scale: Some(1.0),
            name: format!("Duration since last readout [{}]", time_nn(nn)),
        };
    }
    if t & 0x7C == 0x30 {
        // 0x30 itself handled above; 0x31..0x33 are tariff durations.
        let nn = t & 0x03;
        return VifeResolved {
            key: "tariff_duration",
            unit: Unit::None,
            scale: Some(1.0),
            name: format!("Duration of tariff [{}]", time_nn(nn)),
        };
    }
    if t & 0x7C == 0x34 {
        let nn = t & 0x03;
        return VifeResolved {
            key: "tariff_period",
            unit: Unit::None,
            scale: Some(1.0),
            name: format!("Period of tariff [{}]", time_nn(nn)),
        };
    }
    if t & 0x70 == 0x40 {
        let nnnn = (t & 0x0F) as i32;
        return VifeResolved::scaled(
            "voltage",
            Unit::Volt,
            pow10(nnnn - 9),
            format!("10^{} Volts", nnnn - 9),
        );
    }
    if t & 0x70 == 0x50 {
        let nnnn = (t & 0x0F) as i32;
        return VifeResolved::scaled(
            "amperage",
            Unit::Ampere,
            pow10(nnnn - 12),
            format!("10^{} Ampere", nnnn - 12),
        );
    }
    if t & 0x7C == 0x68 {
        let pp = t & 0x03;
        return VifeResolved {
            key: "duration_since_last_cumulation",
            unit: Unit::None,
            scale: Some(1.0),
            name: format!("Duration since last cumulation [{}]", time_pp(pp)),
        };
    }
    if t & 0x7C == 0x6C {
        let pp = t & 0x03;
        return VifeResolved {
            key: "operating_time_battery",
            unit: Unit::None,
            scale: Some(1.0),
            name: format!("Operating time battery [{}]", time_pp(pp)),
        };
    }
    if matches!(t, 0x19 | 0x1F | 0x23 | 0x2A | 0x2B | 0x3B) || (0x3C..=0x3F).contains(&t) || t >= 0x71 {
        return VifeResolved::reserved();
    }

    VifeResolved::unknown(vife)
}

/// Resolves a VIFE byte from the 0xFB ("first") extension bank.
pub fn lookup_vife_fb(vife: u8) -> VifeResolved {
    let t = vife & 0x7F;

    if t & 0x7E == 0x00 {
        let n = (t & 0x01) as i32;
        // 10^(n-1) MWh, canonically kWh
        return VifeResolved::scaled(
            "energy",
            Unit::KiloWattHour,
            pow10(n - 1) * 1000.0,
            format!("Energy 10^{} MWh", n - 1),
        );
    }
    if t & 0x7E == 0x08 {
        let n = (t & 0x01) as i32;
        // 10^(n-1) GJ, canonically MJ
        return VifeResolved::scaled(
            "energy",
            Unit::MegaJoule,
            pow10(n - 1) * 1000.0,
            format!("Energy 10^{} GJ", n - 1),
        );
    }
    if t & 0x7E == 0x10 {
        let n = (t & 0x01) as i32;
        return VifeResolved::scaled(
            "volume",
            Unit::CubicMeter,
            pow10(n + 2),
            format!("Volume 10^{} m³", n + 2),
        );
    }
    if t & 0x7E == 0x18 {
        let n = (t & 0x01) as i32;
        // 10^(n+2) tons, canonically kg
        return VifeResolved::scaled(
            "mass",
            Unit::Kilogram,
            pow10(n + 5),
            format!("Mass 10^{} t", n + 2),
        );
    }
    match t {
        0x21 => {
            return VifeResolved::scaled(
                "volume",
                Unit::CubicFeet,
                0.1,
                "Volume 0.1 feet³".to_string(),
            )
        }
        0x22 => {
            return VifeResolved::scaled(
                "volume",
                Unit::Gallon,
                0.1,
                "Volume 0.1 american gallon".to_string(),
            )
        }
        0x23 => {
            return VifeResolved::scaled(
                "volume",
                Unit::Gallon,
                1.0,
                "Volume american gallon".to_string(),
            )
        }
        0x24 => {
            return VifeResolved::scaled(
                "volume_flow",
                Unit::GallonPerMinute,
                0.001,
                "Volume flow 0.001 american gallon/min".to_string(),
            )
        }
        0x25 => {
            return VifeResolved::scaled(
                "volume_flow",
                Unit::GallonPerMinute,
                1.0,
                "Volume flow american gallon/min".to_string(),
            )
        }
        0x26 => {
            return VifeResolved::scaled(
                "volume_flow",
                Unit::GallonPerHour,
                1.0,
                "Volume flow american gallon/h".to_string(),
            )
        }
        _ => {}
    }
    if t & 0x7E == 0x28 {
        let n = (t & 0x01) as i32;
        // 10^(n-1) MW, canonically kW
        return VifeResolved::scaled(
            "power",
            Unit::KiloWatt,
            pow10(n - 1) * 1000.0,
            format!("Power 10^{} MW", n - 1),
        );
    }
    if t & 0x7E == 0x30 {
        let n = (t & 0x01) as i32;
        return VifeResolved::scaled(
            "power",
            Unit::MegaJoulePerHour,
            pow10(n - 1) * 1000.0,
            format!("Power 10^{} GJ/h", n - 1),
        );
    }
    if t & 0x7C == 0x58 {
        let nn = (t & 0x03) as i32;
        return VifeResolved::scaled(
            "flow_temperature",
            Unit::Fahrenheit,
            pow10(nn - 3),
            format!("Flow temperature 10^{} °F", nn - 3),
        );
    }
    if t & 0x7C == 0x5C {
        let nn = (t & 0x03) as i32;
        return VifeResolved::scaled(
            "return_temperature",
            Unit::Fahrenheit,
            pow10(nn - 3),
            format!("Return temperature 10^{} °F", nn - 3),
        );
    }
    if t & 0x7C == 0x60 {
        let nn = (t & 0x03) as i32;
        return VifeResolved::scaled(
            "temperature_difference",
            Unit::Fahrenheit,
            pow10(nn - 3),
            format!("Temperature difference 10^{} °F", nn - 3),
        );
    }
    if t & 0x7C == 0x64 {
        let nn = (t & 0x03) as i32;
        return VifeResolved::scaled(
            "external_temperature",
            Unit::Fahrenheit,
            pow10(nn - 3),
            format!("External temperature 10^{} °F", nn - 3),
        );
    }
    if t & 0x7C == 0x70 {
        let nn = (t & 0x03) as i32;
        return VifeResolved::scaled(
            "temperature_limit",
            Unit::Fahrenheit,
            pow10(nn - 3),
            format!("Cold/warm temperature limit 10^{} °F", nn - 3),
        );
    }
    if t & 0x7C == 0x74 {
        let nn = (t & 0x03) as i32;
        return VifeResolved::scaled(
            "temperature_limit",
            Unit::Celsius,
            pow10(nn - 3),
            format!("Cold/warm temperature limit 10^{} °C", nn - 3),
        );
    }
    if t & 0x78 == 0x78 {
        let nnn = (t & 0x07) as i32;
        // 10^(nnn-3) W, canonically kW
        return VifeResolved::scaled(
            "cumulative_max_power",
            Unit::KiloWatt,
            pow10(nnn - 6),
            format!("Cumulative count max power 10^{} W", nnn - 3),
        );
    }
    if matches!(t, 0x02 | 0x03 | 0x0A | 0x0B | 0x12 | 0x13 | 0x1A | 0x1B | 0x20 | 0x27 | 0x29)
        || t & 0x7C == 0x04
        || t & 0x7C == 0x0C
        || t & 0x7C == 0x14
        || t & 0x7C == 0x1C
        || t & 0x7C == 0x2C
        || (0x32..=0x57).contains(&t)
        || t & 0x78 == 0x68
    {
        return VifeResolved::reserved();
    }

    VifeResolved::unknown(vife)
}

/// Name of a combinable VIFE (0x20..=0x7F following a scaled VIF).
///
/// Combinable VIFEs modify the semantics of the preceding VIF (per-second,
/// backward flow, upper limit, ...). They are recorded as modifier flags
/// on the record; they are never folded into the scale.
pub fn combinable_vife_name(vife: u8) -> String {
    let t = vife & 0x7F;

    let fixed = match t {
        0x13 => Some("reverse compact profile without register"),
        0x1E => Some("compact profile with register"),
        0x1F => Some("compact profile without register"),
        0x20 => Some("per second"),
        0x21 => Some("per minute"),
        0x22 => Some("per hour"),
        0x23 => Some("per day"),
        0x24 => Some("per week"),
        0x25 => Some("per month"),
        0x26 => Some("per year"),
        0x27 => Some("per revolution/measurement"),
        0x28 => Some("incr per input pulse on input channel 0"),
        0x29 => Some("incr per input pulse on input channel 1"),
        0x2A => Some("incr per output pulse on output channel 0"),
        0x2B => Some("incr per output pulse on output channel 1"),
        0x2C => Some("per litre"),
        0x2D => Some("per m³"),
        0x2E => Some("per kg"),
        0x2F => Some("per kelvin"),
        0x30 => Some("per kWh"),
        0x31 => Some("per GJ"),
        0x32 => Some("per kW"),
        0x33 => Some("per kelvin*litre"),
        0x34 => Some("per volt"),
        0x35 => Some("per ampere"),
        0x36 => Some("multiplied by s"),
        0x37 => Some("multiplied by s/V"),
        0x38 => Some("multiplied by s/A"),
        0x39 => Some("start date/time of a,b"),
        0x3A => Some("uncorrected meter unit"),
        0x3B => Some("forward flow"),
        0x3C => Some("backward flow"),
        0x3D => Some("reserved for non-metric unit systems"),
        0x3E => Some("value at base conditions"),
        0x3F => Some("obis declaration"),
        0x40 => Some("lower limit"),
        0x48 => Some("upper limit"),
        0x41 => Some("number of exceeds of lower limit"),
        0x49 => Some("number of exceeds of upper limit"),
        0x69 => Some("leakage values"),
        0x6D => Some("overflow values"),
        0x7C => Some("extension of combinable vife"),
        0x7D => Some("multiplicative correction factor for value"),
        0x7E => Some("future value"),
        _ => None,
    };
    if let Some(name) = fixed {
        return name.to_string();
    }

    if t & 0x72 == 0x42 {
        let end = if t & 0x01 != 0 { "end" } else { "beginning" };
        let last = if t & 0x04 != 0 { "last" } else { "first" };
        let upper = if t & 0x08 != 0 { "upper" } else { "lower" };
        return format!("date/time of {end} of {last} {upper} limit exceed");
    }
    if t & 0x70 == 0x50 {
        let last = if t & 0x04 != 0 { "last" } else { "first" };
        let upper = if t & 0x08 != 0 { "upper" } else { "lower" };
        let nn = t & 0x03;
        return format!("duration of {last} {upper} limit exceed [{}]", time_nn(nn));
    }
    if t & 0x78 == 0x60 {
        let last = if t & 0x04 != 0 { "last" } else { "first" };
        let nn = t & 0x03;
        return format!("duration of a,b {last} [{}]", time_nn(nn));
    }
    if t & 0x7B == 0x68 {
        let upper = if t & 0x04 != 0 { "upper" } else { "lower" };
        return format!("value during {upper} limit exceed");
    }
    if t & 0x78 == 0x70 {
        let nnn = (t & 0x07) as i32;
        return format!("multiplicative correction factor 10^{}", nnn - 6);
    }
    if t & 0x78 == 0x78 {
        let nn = (t & 0x03) as i32;
        return format!("additive correction constant, unit of VIF * 10^{}", nn - 3);
    }

    format!("combinable vife 0x{vife:02X}")
}
