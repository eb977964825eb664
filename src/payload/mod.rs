//! The payload module contains the components responsible for decoding the
//! DIB/VIB data record stream of a wM-Bus telegram.

pub mod data_encoding;
pub mod dv;
pub mod record;
pub mod vif;
pub mod vif_maps;

pub use dv::{format_scaled, parse_dv_stream, DvParse};
pub use record::{DvRecord, DvValue, MeasurementType};
pub use vif::{lookup_primary_vif, vif_scale, Unit, VifInfo};
pub use vif_maps::{combinable_vife_name, lookup_vife_fb, lookup_vife_fd, VifeResolved};
