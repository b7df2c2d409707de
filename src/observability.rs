//! Logging setup.

pub use fdw_core::Sensitive;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::settings::{FdwSettings, DEFAULT_LOG_FILTER};

/// Installs the JSON subscriber on stderr. Safe to call more than once; only
/// the first call installs anything.
pub fn init_tracing(settings: &FdwSettings) {
    let env_filter = EnvFilter::try_new(&settings.log_filter).unwrap_or_else(|e| {
        eprintln!("invalid log filter \"{}\": {e}", settings.log_filter);
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .json()
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(filter = %settings.log_filter, "tracing initialized");
    }
}
