#![forbid(unsafe_code)]

use log::LevelFilter;

/// Installs the process logger once. `RUST_LOG` directives still apply on top
/// of `level`. Returns false when a logger was already installed.
pub fn init_logging(level: LevelFilter) -> bool {
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}
