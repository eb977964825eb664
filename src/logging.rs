use log::{debug, log_enabled, Level};

use crate::util::format_hex_compact;

/// Initializes the logger with the `env_logger` crate.
///
/// Call once at program start; library code only uses the `log` facade.
pub fn init_logger() {
    env_logger::init();
}

/// Initializes the logger, tolerating repeated calls (useful in tests).
pub fn try_init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Logs a frame as a compact hex dump at debug level.
pub fn log_frame_hex(context: &str, frame: &[u8]) {
    if log_enabled!(Level::Debug) {
        debug!("({context}) {} bytes: {}", frame.len(), format_hex_compact(frame));
    }
}
