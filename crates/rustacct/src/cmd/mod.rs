//! Command implementations for CLI tools.
//!
//! Each module contains the full implementation for a command,
//! which can be invoked by thin wrapper binaries.

pub mod check;
pub mod report_cmd;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

/// Send debug logs to stderr.
pub(crate) fn init_verbose_logging() {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();
}
