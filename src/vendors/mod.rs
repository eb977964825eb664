//! Vendor-related catalogues: the FLAG manufacturer database.

pub mod manufacturer;

pub use manufacturer::{
    manufacturer_flag, manufacturer_name, manufacturer_to_id, ManufacturerInfo,
    KNOWN_MANUFACTURERS,
};
