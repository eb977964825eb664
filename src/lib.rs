//! # wmbus-rs - A Rust Crate for Wireless M-Bus Telegram Decoding
//!
//! The wmbus-rs crate decodes wireless M-Bus (wM-Bus) telegrams as
//! specified in EN 13757-3/-4: the radio protocol European utility
//! meters (electricity, gas, water, heat) use to broadcast readings.
//!
//! ## Features
//!
//! - Parse the layered DLL → ELL → AFL → TPL header chain of a received
//!   frame
//! - Verify ELL payload CRCs and AFL CMACs (AES-CMAC per NIST SP
//!   800-38B, with the OMS key derivation function)
//! - Decrypt ELL AES-CTR and TPL AES-CBC payloads (OMS security modes 5
//!   and 7) in place
//! - Decode DIB/VIB data records into typed, scaled measurements with
//!   semantic keys shared across meter models
//! - Replay compact frames (CI 0x79) from cached format signatures
//! - Keep a byte-exact explanation trail for diagnostics
//!
//! ## Usage
//!
//! ```no_run
//! use wmbus_rs::{parse, MeterKeys};
//!
//! let frame: Vec<u8> = receive_from_dongle();
//! let telegram = parse(&frame, &MeterKeys::none());
//! if telegram.outcome.is_ok() {
//!     if let Some(kwh) = telegram.extract_double("0404") {
//!         println!("total energy: {kwh} kWh");
//!     }
//! }
//! # fn receive_from_dongle() -> Vec<u8> { Vec::new() }
//! ```
//!
//! Radio dongle I/O, per-meter output formatting and configuration live
//! in the applications consuming this crate; the crate itself owns no
//! files, sockets or threads.

pub mod constants;
pub mod error;
pub mod logging;
pub mod payload;
pub mod util;
pub mod vendors;
pub mod wmbus;

pub use error::WMBusError;
pub use payload::{DvRecord, DvValue, MeasurementType, Unit};
pub use wmbus::{
    global_cache, MeterKeys, ParseOutcome, SignatureCache, Telegram,
};

/// Parses a frame against the process-wide format signature cache.
///
/// Equivalent to [`Telegram::parse`] with [`global_cache`]; use the
/// latter with a local [`SignatureCache`] for isolated parsing (tests,
/// multi-tenant listeners).
pub fn parse(frame: &[u8], keys: &MeterKeys) -> Telegram {
    Telegram::parse(frame, keys, global_cache())
}
