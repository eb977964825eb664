//! # Wireless M-Bus (wM-Bus) Module
//!
//! Telegram decoding for the wireless M-Bus protocol (EN 13757-4): the
//! layered link/authentication/transport headers, the OMS security
//! modes, the compact-frame format cache and the telegram orchestrator.

pub mod ci;
pub mod crypto;
pub mod format_cache;
pub mod keys;
pub mod telegram;
pub mod types;

pub use ci::{ci_kind, ci_type_name, CiKind};
pub use crypto::CryptoError;
pub use format_cache::{format_signature, global_cache, SignatureCache};
pub use keys::MeterKeys;
pub use telegram::{
    AflHeader, DllHeader, EllHeader, Explanation, ParseOutcome, Telegram, TplHeader,
};
pub use types::{
    c_field_name, cc_field_name, media_type_name, AflAuthenticationType, EllSecurityMode,
    LinkModeSet, TplSecurityMode,
};
